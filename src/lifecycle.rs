//! Service lifecycle: transactional start of the remote relay and
//! kill-and-verify shutdown of its execution context.

pub mod manager;
pub mod state;

pub use manager::{LifecycleManager, TerminationPolicy};
pub use state::{RelayServiceHandle, ServiceState};
