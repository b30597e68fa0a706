//! Integration flows across connection, codec, poller and client.

mod flows;
mod reconnect;

#[cfg(test)]
pub(crate) mod support {
    use std::sync::Arc;

    use dl_01_connection::{DevicePeer, MemoryConnector};
    use dl_04_client::{Client, ClientConfig};
    use shared_types::ConnectionStatus;
    use tokio::sync::mpsc::UnboundedReceiver;

    pub fn client() -> (Client, UnboundedReceiver<DevicePeer>) {
        let (connector, peers) = MemoryConnector::new();
        let client = Client::new(Arc::new(connector), ClientConfig::default()).unwrap();
        (client, peers)
    }

    pub async fn wait_for_status(client: &Client, status: ConnectionStatus) {
        let mut changes = client.status_changes();
        while !client.status().is(status) {
            changes.recv().await.expect("status stream ended");
        }
    }
}
