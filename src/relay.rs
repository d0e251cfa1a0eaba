//! Relay engine: a SOCKS5 server for the CONNECT subset that forwards bytes
//! between the client and the requested target.
//!
//! This is the same wire contract the deployed payload implements inside the
//! remote runtime, runnable locally with `orasocks relay`.

pub mod forward;
pub mod protocol;
pub mod server;

pub use forward::{RelayStats, RELAY_BUFFER_SIZE};
pub use protocol::TargetAddr;
pub use server::{ConnectionState, RelayHandle, RelayServer, RelaySettings};
