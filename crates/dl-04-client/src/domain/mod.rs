//! Domain types for the client: configuration, errors, sequence numbers
//! and the pending request table.

pub mod config;
pub mod error;
pub mod pending;
pub mod request;
pub mod sequence;

pub use config::ClientConfig;
pub use error::{ConfigError, ModuleError, Rejection, RequestError};
pub use pending::{PendingStats, PendingTable, Registration, ResponseFuture, StatsSnapshot};
pub use request::{PendingResponse, RequestOptions};
pub use sequence::SequenceGenerator;
