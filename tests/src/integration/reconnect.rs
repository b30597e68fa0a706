//! # Session Loss and Recovery
//!
//! The client does not reconnect by itself and never resends a request.
//! These flows reopen explicitly, the way a supervising caller would.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use dl_04_client::{DeviceApi, RequestOptions};
    use serde_json::{json, Value};
    use shared_types::{ConnectionStatus, StatusChange};

    use crate::device::{self, SimulatedDevice};
    use crate::integration::support::{self, wait_for_status};

    #[tokio::test(start_paused = true)]
    async fn test_status_sequence_over_session_lifecycle() {
        let (client, mut peers) = support::client();
        let mut changes = client.status_changes();

        client.open();
        let device = SimulatedDevice::echo(peers.recv().await.unwrap());
        wait_for_status(&client, ConnectionStatus::Connected).await;
        device.hang_up();
        wait_for_status(&client, ConnectionStatus::Connecting).await;
        client.close();
        wait_for_status(&client, ConnectionStatus::Disconnected).await;

        let seen: Vec<(ConnectionStatus, ConnectionStatus)> = changes
            .drain()
            .into_iter()
            .map(|StatusChange { previous, current, .. }| (previous, current))
            .collect();
        assert_eq!(
            seen,
            vec![
                (ConnectionStatus::Disconnected, ConnectionStatus::Connecting),
                (ConnectionStatus::Connecting, ConnectionStatus::Connected),
                (ConnectionStatus::Connected, ConnectionStatus::Connecting),
                (ConnectionStatus::Connecting, ConnectionStatus::Disconnected),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_while_down_are_sent_after_reopen() {
        let (client, mut peers) = support::client();
        client.open();
        let first = SimulatedDevice::echo(peers.recv().await.unwrap());
        wait_for_status(&client, ConnectionStatus::Connected).await;
        first.hang_up();
        wait_for_status(&client, ConnectionStatus::Connecting).await;

        let pending = client.get_info("wifi");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(client.is_pending(pending.seq()));

        client.open();
        let mut second = SimulatedDevice::echo(peers.recv().await.unwrap());
        assert_eq!(second.session, 2);

        let seq = pending.seq();
        let response = pending.await.unwrap();
        assert_eq!(response.seq, seq);
        assert_eq!(second.next_request().await.unwrap()["seq"], seq);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_request_is_not_resent() {
        let (client, mut peers) = support::client();
        client.open();
        let mut first =
            SimulatedDevice::attach(peers.recv().await.unwrap(), Arc::new(|_: &Value| Vec::<Value>::new()));

        let pending = client.request(
            Some("gpio"),
            "state-set",
            Some(json!({"pin": 2, "level": 1})),
            RequestOptions::with_timeout(Duration::from_secs(3)),
        );
        let seq = pending.seq();
        assert_eq!(first.next_request().await.unwrap()["seq"], seq);
        first.hang_up();
        wait_for_status(&client, ConnectionStatus::Connecting).await;

        client.open();
        let mut second = SimulatedDevice::echo(peers.recv().await.unwrap());

        let err = pending.await.unwrap_err();
        assert!(err.is_timeout());
        assert!(second.drain_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_polling_resumes_on_new_session() {
        let (client, mut peers) = support::client();
        let gpio = client.module("gpio");
        let _registration = gpio.use_state(None).unwrap();

        client.open();
        let mut first = SimulatedDevice::attach(
            peers.recv().await.unwrap(),
            Arc::new(|request: &Value| vec![device::response(request, json!({"level": 0}))]),
        );
        assert_eq!(first.next_request().await.unwrap()["name"], "state-get");
        first.hang_up();
        wait_for_status(&client, ConnectionStatus::Connecting).await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        client.open();
        let mut second = SimulatedDevice::attach(
            peers.recv().await.unwrap(),
            Arc::new(|request: &Value| vec![device::response(request, json!({"level": 1}))]),
        );
        let polled = second.next_request().await.unwrap();
        assert_eq!(polled["target"], "gpio");
        assert_eq!(polled["name"], "state-get");
    }
}
