use super::state::RelayServiceHandle;
use crate::configuration::types::LifecycleConfig;
use crate::control_surface::{ControlSurface, RemoteSession};
use crate::controller::log_sink::LogSink;
use crate::deployment::{self, RelaySource, ENTRY_PROCEDURE};
use crate::error_handling::types::{ControlError, RemoteError};
use crate::session_management::ControlSession;
use log::{debug, warn};
use std::time::Duration;

/// Retry budget for kill-and-verify.
#[derive(Debug, Clone, Copy)]
pub struct TerminationPolicy {
    pub max_attempts: u32,
    /// Pause after a failed attempt. Not taken after the last one.
    pub pause: Duration,
    /// Blocks for `pause`. Always `std::thread::sleep` outside tests.
    pub sleep: fn(Duration),
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pause: Duration::from_secs(1),
            sleep: std::thread::sleep,
        }
    }
}

impl From<&LifecycleConfig> for TerminationPolicy {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            max_attempts: config.kill_attempts.max(1),
            pause: Duration::from_millis(config.kill_pause_ms),
            sleep: std::thread::sleep,
        }
    }
}

/// Starts and stops the remote relay over a verified [`ControlSession`].
///
/// Every call blocks on the remote host; callers on an async runtime drive it
/// from `spawn_blocking`.
pub struct LifecycleManager {
    policy: TerminationPolicy,
    source: RelaySource,
    sink: LogSink,
    handle: Option<RelayServiceHandle>,
}

impl LifecycleManager {
    pub fn new(policy: TerminationPolicy, source: RelaySource, sink: LogSink) -> Self {
        Self {
            policy,
            source,
            sink,
            handle: None,
        }
    }

    pub fn handle(&self) -> Option<&RelayServiceHandle> {
        self.handle.as_ref()
    }

    /// Grants, deploys, registers and invokes the relay on `port` inside one
    /// transaction.
    ///
    /// Once the start procedure has returned, the listener is running on the
    /// remote host and the call reports success even if the commit that
    /// follows fails. Earlier failures roll back and surface as
    /// [`ControlError::Start`].
    pub fn start(&mut self, session: &mut ControlSession, port: u16) -> Result<(), ControlError> {
        if session.is_closed() {
            return Err(ControlError::Start(Box::new(ControlError::Network(
                RemoteError::ConnectionClosed.to_string(),
            ))));
        }

        let handle = self
            .handle
            .get_or_insert_with(|| RelayServiceHandle::new(session.client_identifier()));
        handle.begin_start(port);
        self.sink.info(format!(
            "Starting SOCKS5 relay on port {} (session {})",
            port,
            session.client_identifier()
        ));

        if let Err(e) = session.surface_mut().set_autocommit(false) {
            self.abort(&e.to_string());
            return Err(ControlError::Start(Box::new(ControlError::from(e))));
        }

        let mut launched = false;
        let outcome = self.run_start(session, port, &mut launched);

        let result = match outcome {
            Ok(()) => {
                self.sink.info(format!("SOCKS5 relay listening on port {}", port));
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = session.surface_mut().rollback() {
                    warn!("Rollback failed: {}", rollback_err);
                }
                if launched {
                    self.sink.warn(format!(
                        "Relay launched on port {} but the transaction failed to complete: {}",
                        port, e
                    ));
                    Ok(())
                } else {
                    self.abort(&e.to_string());
                    Err(ControlError::Start(Box::new(e)))
                }
            }
        };

        if let Err(e) = session.surface_mut().set_autocommit(true) {
            warn!("Failed to restore autocommit: {}", e);
        }
        result
    }

    fn run_start(
        &mut self,
        session: &mut ControlSession,
        port: u16,
        launched: &mut bool,
    ) -> Result<(), ControlError> {
        self.sink.info("Granting runtime permissions");
        deployment::grant(session, port)?;

        self.sink.info(format!("Deploying {}", self.source.class_name()));
        let artifact = deployment::deploy(session, &self.source)?;
        deployment::install_entry_point(session, artifact.object_name())?;

        self.sink.info(format!("Invoking {}({})", ENTRY_PROCEDURE, port));
        session
            .surface_mut()
            .invoke_entry_point(ENTRY_PROCEDURE, port)
            .map_err(|e| match e {
                RemoteError::ConnectionClosed => ControlError::Network(e.to_string()),
                other => ControlError::Remote(other),
            })?;
        *launched = true;
        if let Some(handle) = self.handle.as_mut() {
            handle.mark_running();
        }

        session.surface_mut().commit()?;
        Ok(())
    }

    fn abort(&mut self, reason: &str) {
        self.sink.error(format!("Start aborted: {}", reason));
        if let Some(handle) = self.handle.as_mut() {
            handle.abort_start();
        }
    }

    /// Terminates every remote context tagged with the session's identifier,
    /// then closes the control connection.
    ///
    /// Returns `true` iff at least one context was verified gone. A closed
    /// session returns `false` without touching anything.
    pub fn stop(&mut self, session: &mut ControlSession) -> bool {
        if session.is_closed() {
            warn!("Stop requested on a closed control session");
            return false;
        }

        let identifier = session.client_identifier().to_string();
        if let Some(handle) = self.handle.as_mut() {
            handle.begin_stop();
        }
        self.sink
            .info(format!("Stopping relay contexts tagged {}", identifier));

        let terminated = match session.surface_mut().sessions_by_identifier(&identifier) {
            Ok(targets) => {
                if targets.is_empty() {
                    self.sink
                        .warn(format!("No remote context is tagged {}", identifier));
                }
                let mut any = false;
                for target in targets {
                    if self.terminate_with_retry(session.surface_mut(), target) {
                        any = true;
                    }
                }
                any
            }
            Err(e) => {
                self.sink
                    .error(format!("Unable to list remote contexts: {}", e));
                false
            }
        };

        session.close();

        if terminated {
            if let Some(handle) = self.handle.as_mut() {
                handle.mark_stopped();
            }
            self.sink.info("Relay stopped");
        } else {
            if let Some(handle) = self.handle.as_mut() {
                handle.abort_stop();
            }
            self.sink.error(format!(
                "No remote context tagged {} could be terminated",
                identifier
            ));
        }
        terminated
    }

    fn terminate_with_retry(&self, surface: &mut dyn ControlSurface, target: RemoteSession) -> bool {
        let max = self.policy.max_attempts;
        for attempt in 1..=max {
            self.sink.info(format!(
                "Terminating session {} (attempt {}/{})",
                target, attempt, max
            ));
            if let Err(e) = surface.force_terminate(target) {
                self.sink.warn(format!(
                    "Kill of session {} failed (attempt {}/{}): {}",
                    target, attempt, max, e
                ));
            }

            match surface.session_alive(target) {
                Ok(false) => {
                    debug!("Session {} is gone after attempt {}", target, attempt);
                    return true;
                }
                Ok(true) => debug!("Session {} still present", target),
                Err(e) => warn!("Could not verify session {}: {}", target, e),
            }

            if attempt < max {
                (self.policy.sleep)(self.policy.pause);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_surface::simulated::{test_profile, SimulatedHost};
    use crate::control_surface::CompileStatus;
    use crate::lifecycle::state::ServiceState;
    use std::cell::RefCell;

    thread_local! {
        static PAUSES: RefCell<Vec<Duration>> = const { RefCell::new(Vec::new()) };
    }

    fn record_pause(pause: Duration) {
        PAUSES.with(|p| p.borrow_mut().push(pause));
    }

    fn pauses() -> Vec<Duration> {
        PAUSES.with(|p| p.borrow().clone())
    }

    fn manager(pause: Duration) -> LifecycleManager {
        let _ = env_logger::builder().is_test(true).try_init();
        PAUSES.with(|p| p.borrow_mut().clear());
        LifecycleManager::new(
            TerminationPolicy {
                max_attempts: 3,
                pause,
                sleep: record_pause,
            },
            RelaySource::embedded().unwrap(),
            LogSink::detached(),
        )
    }

    fn open(host: &SimulatedHost) -> ControlSession {
        ControlSession::open(test_profile(), host).unwrap()
    }

    const RELAY_CONTEXT: RemoteSession = RemoteSession { sid: 143, serial: 2291 };

    #[test]
    fn test_start_runs_pipeline_and_commits() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);
        let mut lifecycle = manager(Duration::ZERO);

        lifecycle.start(&mut session, 1080).unwrap();

        let state = host.state();
        assert_eq!(state.grants.len(), 6);
        assert_eq!(state.uploaded.len(), 1);
        assert_eq!(state.entry_points.len(), 1);
        assert_eq!(state.invocations, vec![("start_socks5".to_string(), 1080)]);
        assert_eq!(state.commits, 1);
        assert_eq!(state.rollbacks, 0);
        assert!(state.autocommit);
        drop(state);

        let handle = lifecycle.handle().unwrap();
        assert_eq!(handle.state(), ServiceState::Running);
        assert_eq!(handle.client_identifier(), session.client_identifier());
    }

    #[test]
    fn test_compile_failure_rolls_back() {
        let host = SimulatedHost::privileged();
        host.state().compile_status = Some(CompileStatus::Invalid);
        let mut session = open(&host);
        let mut lifecycle = manager(Duration::ZERO);

        let err = lifecycle.start(&mut session, 1080).unwrap_err();
        assert!(matches!(err, ControlError::Start(_)));
        assert!(matches!(err.root_cause(), ControlError::Compilation(_)));

        let state = host.state();
        assert_eq!(state.rollbacks, 1);
        assert_eq!(state.commits, 0);
        assert!(state.invocations.is_empty());
        assert!(state.autocommit);
        drop(state);
        assert_eq!(lifecycle.handle().unwrap().state(), ServiceState::NotStarted);
    }

    #[test]
    fn test_commit_failure_after_launch_is_success() {
        let host = SimulatedHost::privileged();
        host.state().commit_error = Some(RemoteError::statement("ORA-02091: transaction rolled back"));
        let mut session = open(&host);
        let mut lifecycle = manager(Duration::ZERO);

        lifecycle.start(&mut session, 1080).unwrap();

        let state = host.state();
        assert_eq!(state.invocations.len(), 1);
        assert_eq!(state.rollbacks, 1);
        assert!(state.autocommit);
        drop(state);
        assert_eq!(lifecycle.handle().unwrap().state(), ServiceState::Running);
    }

    #[test]
    fn test_invoke_failure_is_start_error() {
        let host = SimulatedHost::privileged();
        host.state().invoke_error = Some(RemoteError::Statement {
            code: Some(29532),
            message: "Java call terminated by uncaught Java exception".to_string(),
        });
        let mut session = open(&host);
        let mut lifecycle = manager(Duration::ZERO);

        let err = lifecycle.start(&mut session, 1080).unwrap_err();
        assert!(matches!(err.root_cause(), ControlError::Remote(_)));
        assert_eq!(host.state().rollbacks, 1);
    }

    #[test]
    fn test_stop_on_closed_session_returns_false() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);
        session.close();
        let mut lifecycle = manager(Duration::ZERO);

        assert!(!lifecycle.stop(&mut session));
        let state = host.state();
        assert!(state.kill_attempts.is_empty());
        assert_eq!(state.close_calls, 1);
    }

    #[test]
    fn test_stop_kills_tagged_context_and_closes() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);
        host.with_tagged_context(RELAY_CONTEXT, 0);
        let mut lifecycle = manager(Duration::ZERO);
        lifecycle.start(&mut session, 1080).unwrap();

        assert!(lifecycle.stop(&mut session));
        let state = host.state();
        assert_eq!(state.kill_attempts, vec![RELAY_CONTEXT]);
        assert!(state.live.is_empty());
        assert!(state.closed);
        drop(state);
        assert_eq!(lifecycle.handle().unwrap().state(), ServiceState::Stopped);
    }

    #[test]
    fn test_vanishing_after_second_attempt_skips_third() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);
        host.with_tagged_context(RELAY_CONTEXT, 10);
        host.state().live[0].vanishes_after_checks = Some(2);
        let mut lifecycle = manager(Duration::from_millis(30));

        assert!(lifecycle.stop(&mut session));

        let state = host.state();
        assert_eq!(state.kill_attempts.len(), 2);
        assert_eq!(state.liveness_checks, 2);
        assert_eq!(pauses(), vec![Duration::from_millis(30)]);
    }

    #[test]
    fn test_retries_are_bounded() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);
        host.with_tagged_context(RELAY_CONTEXT, 10);
        let mut lifecycle = manager(Duration::from_millis(10));

        assert!(!lifecycle.stop(&mut session));

        let state = host.state();
        assert_eq!(state.kill_attempts.len(), 3);
        assert_eq!(state.liveness_checks, 3);
        assert!(state.closed);
        // No pause after the final attempt.
        assert_eq!(pauses().len(), 2);
    }

    #[test]
    fn test_pause_is_real_sleep_by_default() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);
        host.with_tagged_context(RELAY_CONTEXT, 10);
        let policy = TerminationPolicy {
            max_attempts: 2,
            pause: Duration::from_millis(20),
            ..TerminationPolicy::default()
        };
        let mut lifecycle =
            LifecycleManager::new(policy, RelaySource::embedded().unwrap(), LogSink::detached());

        let started = std::time::Instant::now();
        assert!(!lifecycle.stop(&mut session));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_stop_without_tagged_context_returns_false() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);
        let mut lifecycle = manager(Duration::ZERO);

        assert!(!lifecycle.stop(&mut session));
        assert!(host.state().closed);
        assert!(pauses().is_empty());
    }

    #[test]
    fn test_stop_that_terminates_nothing_keeps_handle_running() {
        let host = SimulatedHost::privileged();
        let mut session = open(&host);
        let mut lifecycle = manager(Duration::ZERO);
        lifecycle.start(&mut session, 1080).unwrap();

        assert!(!lifecycle.stop(&mut session));
        assert_eq!(lifecycle.handle().unwrap().state(), ServiceState::Running);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = TerminationPolicy::from(&LifecycleConfig {
            kill_attempts: 0,
            kill_pause_ms: 250,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.pause, Duration::from_millis(250));
    }
}
