use log::debug;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::NotStarted => "not started",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Local view of the remote relay, keyed by the client identifier of the
/// control session that launched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayServiceHandle {
    client_identifier: String,
    port: Option<u16>,
    state: ServiceState,
    /// State to fall back to when a stop terminates nothing.
    #[serde(skip)]
    before_stop: ServiceState,
}

impl RelayServiceHandle {
    pub fn new(client_identifier: &str) -> Self {
        Self {
            client_identifier: client_identifier.to_string(),
            port: None,
            state: ServiceState::NotStarted,
            before_stop: ServiceState::NotStarted,
        }
    }

    pub fn client_identifier(&self) -> &str {
        &self.client_identifier
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub(crate) fn begin_start(&mut self, port: u16) {
        self.port = Some(port);
        self.move_to(ServiceState::Starting);
    }

    /// The start procedure returned control; the listener is up.
    pub(crate) fn mark_running(&mut self) {
        self.move_to(ServiceState::Running);
    }

    /// Start aborted before launch.
    pub(crate) fn abort_start(&mut self) {
        self.port = None;
        self.move_to(ServiceState::NotStarted);
    }

    pub(crate) fn begin_stop(&mut self) {
        if self.state != ServiceState::Stopping {
            self.before_stop = self.state;
        }
        self.move_to(ServiceState::Stopping);
    }

    /// Stop verified nothing gone; the relay may still be listening.
    pub(crate) fn abort_stop(&mut self) {
        self.move_to(self.before_stop);
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.move_to(ServiceState::Stopped);
    }

    fn move_to(&mut self, next: ServiceState) {
        debug!(
            "Relay service {}: {} -> {}",
            self.client_identifier, self.state, next
        );
        self.state = next;
    }
}
