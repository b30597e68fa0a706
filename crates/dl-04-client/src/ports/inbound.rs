//! # Inbound Port - DeviceApi
//!
//! What callers can ask of a device. Implemented by the client; module
//! handles and UI-side collaborators program against this trait.
//!
//! | Method | Wire name |
//! |--------|-----------|
//! | `get_state` | `state-get` |
//! | `set_state` | `state-set` |
//! | `get_config` | `config-get` |
//! | `set_config` | `config-set` |
//! | `get_info` | `info-get` |

use serde_json::Value;
use shared_types::names;

use crate::domain::{PendingResponse, RequestOptions};

/// Request API of a device connection.
///
/// Every method returns immediately; the request is queued and flushed
/// with the next batch.
pub trait DeviceApi: Send + Sync {
    /// Issue `name` to `target` (or to every module when `None`).
    ///
    /// An equivalent request that is still pending is joined instead of
    /// sent again.
    fn request(
        &self,
        target: Option<&str>,
        name: &str,
        data: Option<Value>,
        options: RequestOptions,
    ) -> PendingResponse;

    fn get_state(&self, target: &str, data: Option<Value>) -> PendingResponse {
        self.request(Some(target), names::STATE_GET, data, RequestOptions::default())
    }

    fn set_state(&self, target: &str, data: Value) -> PendingResponse {
        self.request(Some(target), names::STATE_SET, Some(data), RequestOptions::default())
    }

    fn get_config(&self, target: &str, data: Option<Value>) -> PendingResponse {
        self.request(Some(target), names::CONFIG_GET, data, RequestOptions::default())
    }

    fn set_config(&self, target: &str, data: Value) -> PendingResponse {
        self.request(Some(target), names::CONFIG_SET, Some(data), RequestOptions::default())
    }

    fn get_info(&self, target: &str) -> PendingResponse {
        self.request(Some(target), names::INFO_GET, None, RequestOptions::default())
    }
}
