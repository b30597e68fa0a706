//! Module handles.
//!
//! A module handle scopes requests to one device module and tracks whether
//! anyone wants that module's state kept fresh by the client's poller.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{ModuleError, PendingResponse, RequestOptions};
use crate::ports::DeviceApi;
use crate::service::client::Client;

struct PollState {
    registrations: usize,
    parameters: Option<Value>,
}

/// Per-module bookkeeping kept in the client's module map.
pub(crate) struct ModuleState {
    name: String,
    poll: Mutex<PollState>,
}

impl ModuleState {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            poll: Mutex::new(PollState {
                registrations: 0,
                parameters: None,
            }),
        }
    }

    /// Poll parameters if at least one registration is active.
    pub(crate) fn active_parameters(&self) -> Option<Option<Value>> {
        let poll = self.poll.lock();
        (poll.registrations > 0).then(|| poll.parameters.clone())
    }

    fn register(self: &Arc<Self>, data: Option<Value>) -> Result<StateRegistration, ModuleError> {
        let mut poll = self.poll.lock();
        if poll.registrations > 0 && poll.parameters != data {
            return Err(ModuleError::ConflictingPollParameters {
                module: self.name.clone(),
                active: poll.parameters.clone(),
                requested: data,
            });
        }
        if poll.registrations == 0 {
            debug!(module = %self.name, params = ?data, "State polling started");
            poll.parameters = data;
        }
        poll.registrations += 1;
        Ok(StateRegistration {
            state: Some(self.clone()),
        })
    }

    fn release(&self) {
        let mut poll = self.poll.lock();
        poll.registrations = poll.registrations.saturating_sub(1);
        if poll.registrations == 0 {
            debug!(module = %self.name, "State polling stopped");
            poll.parameters = None;
        }
    }
}

/// Keeps a module in the state poll. Dropping it (or calling
/// [`StateRegistration::unregister`]) releases the registration once.
#[must_use = "state polling stops when the registration is dropped"]
pub struct StateRegistration {
    state: Option<Arc<ModuleState>>,
}

impl StateRegistration {
    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(state) = self.state.take() {
            state.release();
        }
    }
}

impl Drop for StateRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for StateRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRegistration")
            .field("module", &self.state.as_ref().map(|s| s.name.as_str()))
            .finish()
    }
}

/// Requests scoped to one module.
#[derive(Clone)]
pub struct ModuleHandle {
    client: Client,
    state: Arc<ModuleState>,
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.state.name)
            .field("polling", &self.is_polling())
            .finish()
    }
}

impl ModuleHandle {
    pub(crate) fn new(client: Client, state: Arc<ModuleState>) -> Self {
        Self { client, state }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Ask the client's poller to fetch this module's state with `data`
    /// while connected.
    ///
    /// Registrations are counted. While any is active, registering with
    /// different `data` fails.
    pub fn use_state(&self, data: Option<Value>) -> Result<StateRegistration, ModuleError> {
        self.state.register(data)
    }

    pub fn is_polling(&self) -> bool {
        self.state.active_parameters().is_some()
    }

    /// Parameters the poller uses, if polling.
    pub fn poll_parameters(&self) -> Option<Value> {
        self.state.active_parameters().flatten()
    }

    pub fn registrations(&self) -> usize {
        self.state.poll.lock().registrations
    }

    pub fn request(&self, name: &str, data: Option<Value>, options: RequestOptions) -> PendingResponse {
        self.client.request(Some(self.name()), name, data, options)
    }

    pub fn get_state(&self, data: Option<Value>) -> PendingResponse {
        self.client.get_state(self.name(), data)
    }

    pub fn set_state(&self, data: Value) -> PendingResponse {
        self.client.set_state(self.name(), data)
    }

    pub fn get_config(&self, data: Option<Value>) -> PendingResponse {
        self.client.get_config(self.name(), data)
    }

    pub fn set_config(&self, data: Value) -> PendingResponse {
        self.client.set_config(self.name(), data)
    }

    pub fn get_info(&self) -> PendingResponse {
        self.client.get_info(self.name())
    }
}
