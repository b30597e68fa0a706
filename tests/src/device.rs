//! Simulated esp32m endpoint.
//!
//! Reads request batches from a [`DevicePeer`] and answers each request
//! through a handler.

use std::sync::Arc;

use dl_01_connection::{ConnectionError, DevicePeer};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Frames sent back for one request. Empty leaves it unanswered.
pub type Handler = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

/// Name the device reports as `source` for untargeted requests.
pub const DEVICE_NAME: &str = "esp32m";

pub struct SimulatedDevice {
    pub session: u64,
    requests: mpsc::UnboundedReceiver<Value>,
    to_client: mpsc::UnboundedSender<Result<String, ConnectionError>>,
    task: JoinHandle<()>,
}

impl SimulatedDevice {
    /// Serve `peer` until the client side goes away.
    pub fn attach(mut peer: DevicePeer, handler: Handler) -> Self {
        let (seen, requests) = mpsc::unbounded_channel();
        let session = peer.session;
        let to_client = peer.sender();
        let task = tokio::spawn(async move {
            while let Some(frame) = peer.recv().await {
                for request in parse_batch(&frame) {
                    for reply in handler(&request) {
                        peer.send(reply.to_string());
                    }
                    let _ = seen.send(request);
                }
            }
        });
        Self {
            session,
            requests,
            to_client,
            task,
        }
    }

    /// Device that answers every request with `{"ok": true}`.
    pub fn echo(peer: DevicePeer) -> Self {
        Self::attach(
            peer,
            Arc::new(|request: &Value| vec![response(request, json!({"ok": true}))]),
        )
    }

    /// Next request the device has handled.
    pub async fn next_request(&mut self) -> Option<Value> {
        self.requests.recv().await
    }

    /// Requests handled so far and not yet taken.
    pub fn drain_requests(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(request) = self.requests.try_recv() {
            out.push(request);
        }
        out
    }

    /// Push an unsolicited frame to the client.
    pub fn push(&self, frame: Value) -> bool {
        self.to_client.send(Ok(frame.to_string())).is_ok()
    }

    /// Drop the session from the device side.
    pub fn hang_up(self) {
        self.task.abort();
    }
}

/// Requests in one client frame.
pub fn parse_batch(frame: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(frame) {
        Ok(Value::Array(items)) => items,
        Ok(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    }
}

fn source_of(request: &Value) -> Value {
    request
        .get("target")
        .cloned()
        .unwrap_or_else(|| Value::from(DEVICE_NAME))
}

/// Final response carrying `data`.
pub fn response(request: &Value, data: Value) -> Value {
    json!({
        "type": "response",
        "name": request["name"],
        "source": source_of(request),
        "seq": request["seq"],
        "data": data,
    })
}

/// Partial response; the request stays pending.
pub fn partial(request: &Value, data: Value) -> Value {
    json!({
        "type": "response",
        "name": request["name"],
        "source": source_of(request),
        "seq": request["seq"],
        "data": data,
        "partial": true,
    })
}

/// Failed response with a wire-format `error`.
pub fn failure(request: &Value, error: Value) -> Value {
    json!({
        "type": "response",
        "name": request["name"],
        "source": source_of(request),
        "seq": request["seq"],
        "error": error,
    })
}

/// Broadcast from `source`.
pub fn broadcast(source: &str, name: &str, data: Value) -> Value {
    json!({
        "type": "broadcast",
        "name": name,
        "source": source,
        "data": data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_shapes() {
        assert_eq!(parse_batch(r#"[{"name":"a"},{"name":"b"}]"#).len(), 2);
        assert_eq!(parse_batch(r#"{"name":"a"}"#).len(), 1);
        assert!(parse_batch("not json").is_empty());
    }

    #[test]
    fn test_untargeted_response_source() {
        let request = json!({"type": "request", "name": "info-get", "seq": 7});
        let reply = response(&request, json!({}));
        assert_eq!(reply["source"], DEVICE_NAME);
        assert_eq!(reply["seq"], 7);
    }
}
