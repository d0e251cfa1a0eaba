//! Error types shared by the control plane and the relay engine.

pub mod types;

pub use types::{
    ConfigError, ControlError, ControllerError, ProtocolError, RelayError, RemoteError,
};
