//! Caller-facing facade: connection check, start and stop of the remote
//! relay, and the progress-line channel.

pub mod controller_handler;
pub mod log_sink;

pub use controller_handler::{Controller, ControllerSettings, VerifyReport};
pub use log_sink::{LogLine, LogSink};
