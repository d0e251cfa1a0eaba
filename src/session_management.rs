//! Privileged session controller.
//!
//! Owns the single control connection to the remote host and the client
//! identifier used to find the relay's execution context later.

/// Submodule for the control session itself.
pub mod control_session;

pub use control_session::{ControlSession, ELEVATED_PRIVILEGE, IDENTIFIER_PREFIX};
