//! # DL-03 Periodic Poller
//!
//! Runs an async task on an interval, with these guarantees:
//!
//! - Runs never overlap. The next run is scheduled only once the current
//!   one has settled, so a slow task stretches the period instead of piling
//!   up.
//! - A failing or panicking task is logged and scheduling carries on.
//! - The task gets a [`Periodic`] handle and may call
//!   [`Periodic::suspend`] on itself to back off.
//!
//! The poller knows nothing about the device protocol; the client uses it to
//! refresh module state while the connection is up.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod periodic;

pub use error::PollerError;
pub use periodic::{ErrorHandler, Periodic, PeriodicOptions, PeriodicTask};
