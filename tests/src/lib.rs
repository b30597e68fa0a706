//! # Device-Link Test Suite
//!
//! Cross-crate flows: a real [`dl_04_client::Client`] over the in-memory
//! connector, answered by a simulated device.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── device.rs        # Simulated esp32m endpoint
//! └── integration/
//!     ├── flows.rs     # Request/response, batching, errors, polling
//!     └── reconnect.rs # Session loss and recovery
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p dl-tests
//! cargo test -p dl-tests integration::reconnect::
//! ```

pub mod device;
pub mod integration;
