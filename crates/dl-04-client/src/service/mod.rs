//! Client services.

pub mod client;
pub mod module;

pub use client::Client;
pub use module::{ModuleHandle, StateRegistration};
