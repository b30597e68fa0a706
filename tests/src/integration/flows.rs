//! # Request Flows
//!
//! Client and simulated device over one healthy session: correlation,
//! deduplication, error decoding, partial responses, timeouts, broadcasts
//! and module state polling.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use dl_02_error_codec::ServerError;
    use dl_04_client::{Client, DeviceApi, RequestError, RequestOptions};
    use serde_json::{json, Value};
    use tokio::time::sleep;

    use crate::device::{self, Handler, SimulatedDevice, DEVICE_NAME};
    use crate::integration::support;

    async fn connected(handler: Handler) -> (Client, SimulatedDevice) {
        let (client, mut peers) = support::client();
        client.open();
        let device = SimulatedDevice::attach(peers.recv().await.unwrap(), handler);
        (client, device)
    }

    #[tokio::test(start_paused = true)]
    async fn test_untargeted_request_round_trip() {
        let handler: Handler = Arc::new(|request: &Value| {
            vec![device::response(request, json!({"idf": "v5.1", "uptime": 42}))]
        });
        let (client, mut device) = connected(handler).await;

        let response = client
            .request(None, "info-get", None, RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(response.source, DEVICE_NAME);
        assert_eq!(response.data, Some(json!({"idf": "v5.1", "uptime": 42})));

        let seen = device.next_request().await.unwrap();
        assert_eq!(seen["type"], "request");
        assert!(seen.get("target").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_equivalent_requests_share_one_round_trip() {
        let (client, mut device) = connected(Arc::new(|request: &Value| {
            vec![device::response(request, json!({"level": 1}))]
        }))
        .await;

        let a = client.get_state("gpio", Some(json!({"pin": 2})));
        let b = client.get_state("gpio", Some(json!({"pin": 2})));
        let other = client.get_state("gpio", Some(json!({"pin": 4})));
        assert_eq!(a.seq(), b.seq());
        assert_ne!(a.seq(), other.seq());

        let (a, b, other) = tokio::join!(a, b, other);
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(other.is_ok());

        device.next_request().await.unwrap();
        device.next_request().await.unwrap();
        assert!(device.drain_requests().is_empty());
        assert_eq!(client.stats().deduplicated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_error_decoded_with_names() {
        let (client, _device) = connected(Arc::new(|request: &Value| {
            vec![device::failure(request, json!([257, "out of memory"]))]
        }))
        .await;

        let err = client.set_config("camera", json!({"fps": 60})).await.unwrap_err();
        let Some(ServerError::Device(error)) = err.server_error() else {
            panic!("expected a device error, got {err:?}");
        };
        assert_eq!(error.code_name.as_deref(), Some("ESP_ERR_NO_MEM"));
        assert_eq!(error.message, "out of memory");
        assert_eq!(error.numeric_code(), Some(257));
    }

    #[tokio::test(start_paused = true)]
    async fn test_composite_error() {
        let (client, _device) = connected(Arc::new(|request: &Value| {
            vec![device::failure(
                request,
                json!([[257, "out of memory"], [259, "not started"]]),
            )]
        }))
        .await;

        let err = client.set_state("wifi", json!({"enabled": true})).await.unwrap_err();
        let server = err.server_error().unwrap();
        assert_eq!(server.errors().len(), 2);
        assert_eq!(
            server.errors()[1].code_name.as_deref(),
            Some("ESP_ERR_INVALID_STATE")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_responses_keep_request_alive() {
        let (client, _device) = connected(Arc::new(|request: &Value| {
            if request["name"] == "scan" {
                vec![
                    device::partial(request, json!({"found": 1})),
                    device::partial(request, json!({"found": 2})),
                    device::response(request, json!({"found": 3, "done": true})),
                ]
            } else {
                Vec::new()
            }
        }))
        .await;
        let mut resolved = client.resolved();

        let response = client
            .request(
                Some("wifi"),
                "scan",
                None,
                RequestOptions::with_timeout(Duration::from_secs(2)),
            )
            .await
            .unwrap();
        assert!(!response.partial);
        assert_eq!(response.data, Some(json!({"found": 3, "done": true})));

        let published = resolved.recv().await.unwrap();
        assert_eq!(published.seq, response.seq);
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_times_out() {
        let (client, mut device) = connected(Arc::new(|_: &Value| Vec::<Value>::new())).await;
        let mut rejected = client.rejected();

        let pending = client.request(
            Some("ota"),
            "state-get",
            None,
            RequestOptions::with_timeout(Duration::from_millis(500)),
        );
        let seq = pending.seq();
        let err = pending.await.unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, RequestError::Timeout { seq: s, .. } if s == seq));

        let rejection = rejected.recv().await.unwrap();
        assert_eq!(rejection.request.seq, seq);
        assert!(rejection.error.is_timeout());
        assert!(!client.is_pending(seq));

        // The device did see it; nothing is resent
        assert_eq!(device.next_request().await.unwrap()["seq"], seq);
        sleep(Duration::from_secs(5)).await;
        assert!(device.drain_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcasts_reach_subscribers() {
        let (client, device) = connected(Arc::new(|_: &Value| Vec::<Value>::new())).await;
        let mut broadcasts = client.broadcasts();
        let mut incoming = client.incoming();

        let frame = device::broadcast("gpio", "state-changed", json!({"pin": 2, "level": 0}));
        assert!(device.push(frame.clone()));

        assert_eq!(broadcasts.recv().await.unwrap(), frame);
        assert_eq!(incoming.recv().await.unwrap(), frame);
    }

    #[tokio::test(start_paused = true)]
    async fn test_module_state_polled_while_registered() {
        let (client, mut device) = connected(Arc::new(|request: &Value| {
            vec![device::response(request, json!({"level": 1}))]
        }))
        .await;
        let gpio = client.module("gpio");
        let registration = gpio.use_state(Some(json!({"pins": [2]}))).unwrap();

        let first = device.next_request().await.unwrap();
        assert_eq!(first["target"], "gpio");
        assert_eq!(first["name"], "state-get");
        assert_eq!(first["data"], json!({"pins": [2]}));

        let second = device.next_request().await.unwrap();
        assert_eq!(second["name"], "state-get");
        assert_ne!(first["seq"], second["seq"]);

        registration.unregister();
        sleep(Duration::from_millis(2500)).await;
        let _ = device.drain_requests();
        sleep(Duration::from_secs(3)).await;
        assert!(device.drain_requests().is_empty());
    }
}
