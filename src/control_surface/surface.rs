//! The remote operation set the control plane is written against.
//!
//! Every call is blocking: implementations wrap a synchronous database driver
//! and are driven from `spawn_blocking` by the caller-facing controller.

use crate::configuration::types::ConnectionProfile;
use crate::error_handling::types::{ControlError, RemoteError};
use crate::resolver::ConnectDescriptor;
use std::fmt;

/// Location of one live execution context in the remote session registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteSession {
    pub sid: i64,
    pub serial: i64,
}

impl fmt::Display for RemoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.sid, self.serial)
    }
}

/// A single runtime permission statement granted to a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub kind: &'static str,
    pub target: String,
    pub actions: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted,
    /// The principal already held the permission; not an error.
    AlreadyHeld,
}

/// Catalog status of a compiled unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStatus {
    Pending,
    Valid,
    Invalid,
}

/// One compiler message from the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: i64,
    pub column: i64,
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}-{}: {}", self.line, self.column, self.text)
    }
}

/// Top-level callable unit forwarding a port to the relay's start routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub procedure: String,
    pub target: String,
}

pub trait ControlSurface: Send {
    /// Attaches `identifier` to the current remote session.
    fn tag_session(&mut self, identifier: &str) -> Result<(), RemoteError>;

    /// Whether the authenticated principal holds `privilege`.
    fn has_privilege(&mut self, privilege: &str) -> Result<bool, RemoteError>;

    /// Checks that the live-session registry is readable.
    fn check_session_registry(&mut self) -> Result<(), RemoteError>;

    fn version_banner(&mut self) -> Result<Option<String>, RemoteError>;

    fn grant_permission(
        &mut self,
        principal: &str,
        permission: &Permission,
    ) -> Result<GrantOutcome, RemoteError>;

    /// Uploads `chunks`, concatenated in order, as the source unit `name` and
    /// triggers its compilation.
    fn upload_source(&mut self, name: &str, chunks: &[&str]) -> Result<(), RemoteError>;

    /// Aggregate status of every catalog object called `name`, or `None` if
    /// the catalog has no such object.
    fn compile_status(&mut self, name: &str) -> Result<Option<CompileStatus>, RemoteError>;

    /// Compiler diagnostics for `name`, in catalog order.
    fn compile_errors(&mut self, name: &str) -> Result<Vec<Diagnostic>, RemoteError>;

    fn register_entry_point(&mut self, entry: &EntryPoint) -> Result<(), RemoteError>;

    fn invoke_entry_point(&mut self, procedure: &str, port: u16) -> Result<(), RemoteError>;

    fn sessions_by_identifier(&mut self, identifier: &str)
        -> Result<Vec<RemoteSession>, RemoteError>;

    fn force_terminate(&mut self, session: RemoteSession) -> Result<(), RemoteError>;

    fn session_alive(&mut self, session: RemoteSession) -> Result<bool, RemoteError>;

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), RemoteError>;

    fn commit(&mut self) -> Result<(), RemoteError>;

    fn rollback(&mut self) -> Result<(), RemoteError>;

    fn close(&mut self) -> Result<(), RemoteError>;

    fn is_closed(&self) -> bool;
}

/// Opens control connections.
pub trait Connector: Send + Sync {
    /// Fails with [`ControlError::Network`] when the host cannot be reached
    /// and [`ControlError::Auth`] when the credentials are rejected.
    fn connect(
        &self,
        descriptor: &ConnectDescriptor,
        profile: &ConnectionProfile,
    ) -> Result<Box<dyn ControlSurface>, ControlError>;
}
