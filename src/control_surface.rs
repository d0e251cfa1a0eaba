//! Control-plane interface to the privileged remote host.
//!
//! - `surface`: the [`ControlSurface`] and [`Connector`] traits and the values
//!   they exchange.
//! - `oracle`: SQL/PL-SQL rendering of the surface for Oracle hosts.

pub mod oracle;
#[cfg(test)]
pub mod simulated;
pub mod surface;

pub use oracle::{default_connector, OracleConnector, OracleSurface, SqlExecutor, SqlValue};
pub use surface::{
    CompileStatus, ControlSurface, Connector, Diagnostic, EntryPoint, GrantOutcome, Permission,
    RemoteSession,
};
