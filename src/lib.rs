pub mod configuration;
pub mod control_surface;
pub mod controller;
pub mod deployment;
pub mod error_handling;
pub mod lifecycle;
pub mod relay;
pub mod resolver;
pub mod session_management;

pub use controller::{Controller, ControllerSettings, LogLine, LogSink, VerifyReport};
