//! In-memory remote host used by the control-plane tests.

use super::surface::*;
use crate::configuration::types::ConnectionProfile;
use crate::error_handling::types::{ControlError, RemoteError};
use crate::resolver::ConnectDescriptor;
use std::sync::{Arc, Mutex, MutexGuard};

/// A registry entry for one live remote execution context.
#[derive(Debug, Clone)]
pub struct LiveSession {
    pub session: RemoteSession,
    pub identifier: Option<String>,
    /// Kill attempts that fail before one takes effect.
    pub survives_kills: u32,
    /// Registry checks after which the context ends on its own.
    pub vanishes_after_checks: Option<u32>,
}

#[derive(Debug, Default)]
pub struct HostState {
    pub connect_error: Option<ControlError>,
    pub fail_tagging: bool,
    /// Session setup calls in the order they reached the host.
    pub calls: Vec<&'static str>,
    pub privileges: Vec<String>,
    pub banner: Option<String>,
    pub reject_grant: Option<String>,
    pub grants: Vec<(String, Permission)>,
    pub uploaded: Vec<(String, String)>,
    pub compile_status: Option<CompileStatus>,
    pub diagnostics: Vec<Diagnostic>,
    pub entry_points: Vec<EntryPoint>,
    pub invoke_error: Option<RemoteError>,
    pub commit_error: Option<RemoteError>,
    pub invocations: Vec<(String, u16)>,
    pub identifier: Option<String>,
    pub tag_calls: usize,
    pub live: Vec<LiveSession>,
    pub kill_attempts: Vec<RemoteSession>,
    pub liveness_checks: u32,
    pub autocommit: bool,
    pub commits: usize,
    pub rollbacks: usize,
    pub closed: bool,
    pub close_calls: usize,
}

#[derive(Clone, Default)]
pub struct SimulatedHost {
    state: Arc<Mutex<HostState>>,
}

impl SimulatedHost {
    /// A healthy 19c host on which the connecting principal holds ALTER SYSTEM.
    pub fn privileged() -> Self {
        let host = Self::default();
        {
            let mut state = host.state();
            state.privileges = vec!["ALTER SYSTEM".to_string(), "CREATE SESSION".to_string()];
            state.banner = Some("Oracle Database 19c Enterprise Edition Release 19.3.0.0.0".to_string());
            state.compile_status = Some(CompileStatus::Valid);
            state.autocommit = true;
        }
        host
    }

    pub fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap()
    }

    /// Registers the control session itself as a tagged live context.
    pub fn with_tagged_context(&self, session: RemoteSession, survives_kills: u32) {
        let identifier = self.state().identifier.clone();
        self.state().live.push(LiveSession {
            session,
            identifier,
            survives_kills,
            vanishes_after_checks: None,
        });
    }
}

impl Connector for SimulatedHost {
    fn connect(
        &self,
        _descriptor: &ConnectDescriptor,
        _profile: &ConnectionProfile,
    ) -> Result<Box<dyn ControlSurface>, ControlError> {
        if let Some(err) = self.state().connect_error.clone() {
            return Err(err);
        }
        self.state().closed = false;
        Ok(Box::new(self.clone()))
    }
}

impl SimulatedHost {
    fn open_state(&self) -> Result<MutexGuard<'_, HostState>, RemoteError> {
        let state = self.state();
        if state.closed {
            return Err(RemoteError::ConnectionClosed);
        }
        Ok(state)
    }
}

impl ControlSurface for SimulatedHost {
    fn tag_session(&mut self, identifier: &str) -> Result<(), RemoteError> {
        let mut state = self.open_state()?;
        state.calls.push("tag");
        state.tag_calls += 1;
        if state.fail_tagging {
            return Err(RemoteError::statement("DBMS_SESSION must be declared"));
        }
        state.identifier = Some(identifier.to_string());
        Ok(())
    }

    fn has_privilege(&mut self, privilege: &str) -> Result<bool, RemoteError> {
        let mut state = self.open_state()?;
        state.calls.push("has_privilege");
        Ok(state.privileges.iter().any(|p| p == privilege))
    }

    fn check_session_registry(&mut self) -> Result<(), RemoteError> {
        self.open_state()?.calls.push("check_registry");
        Ok(())
    }

    fn version_banner(&mut self) -> Result<Option<String>, RemoteError> {
        Ok(self.open_state()?.banner.clone())
    }

    fn grant_permission(
        &mut self,
        principal: &str,
        permission: &Permission,
    ) -> Result<GrantOutcome, RemoteError> {
        let mut state = self.open_state()?;
        if state.reject_grant.as_deref() == Some(permission.kind) {
            return Err(RemoteError::statement("ORA-01031: insufficient privileges"));
        }
        let entry = (principal.to_string(), permission.clone());
        if state.grants.contains(&entry) {
            return Ok(GrantOutcome::AlreadyHeld);
        }
        state.grants.push(entry);
        Ok(GrantOutcome::Granted)
    }

    fn upload_source(&mut self, name: &str, chunks: &[&str]) -> Result<(), RemoteError> {
        self.open_state()?
            .uploaded
            .push((name.to_string(), chunks.concat()));
        Ok(())
    }

    fn compile_status(&mut self, _name: &str) -> Result<Option<CompileStatus>, RemoteError> {
        Ok(self.open_state()?.compile_status)
    }

    fn compile_errors(&mut self, _name: &str) -> Result<Vec<Diagnostic>, RemoteError> {
        Ok(self.open_state()?.diagnostics.clone())
    }

    fn register_entry_point(&mut self, entry: &EntryPoint) -> Result<(), RemoteError> {
        self.open_state()?.entry_points.push(entry.clone());
        Ok(())
    }

    fn invoke_entry_point(&mut self, procedure: &str, port: u16) -> Result<(), RemoteError> {
        let mut state = self.open_state()?;
        if let Some(err) = state.invoke_error.clone() {
            return Err(err);
        }
        state.invocations.push((procedure.to_string(), port));
        Ok(())
    }

    fn sessions_by_identifier(
        &mut self,
        identifier: &str,
    ) -> Result<Vec<RemoteSession>, RemoteError> {
        Ok(self
            .open_state()?
            .live
            .iter()
            .filter(|l| l.identifier.as_deref() == Some(identifier))
            .map(|l| l.session)
            .collect())
    }

    fn force_terminate(&mut self, session: RemoteSession) -> Result<(), RemoteError> {
        let mut state = self.open_state()?;
        state.kill_attempts.push(session);
        let Some(pos) = state.live.iter().position(|l| l.session == session) else {
            return Err(RemoteError::Statement {
                code: Some(30),
                message: "session ID does not exist".to_string(),
            });
        };
        if state.live[pos].survives_kills > 0 {
            state.live[pos].survives_kills -= 1;
            return Err(RemoteError::Statement {
                code: Some(31),
                message: "session marked for kill".to_string(),
            });
        }
        state.live.remove(pos);
        Ok(())
    }

    fn session_alive(&mut self, session: RemoteSession) -> Result<bool, RemoteError> {
        let mut state = self.open_state()?;
        state.liveness_checks += 1;
        let checks = state.liveness_checks;
        state.live.retain(|l| match l.vanishes_after_checks {
            Some(limit) => !(l.session == session && checks >= limit),
            None => true,
        });
        Ok(state.live.iter().any(|l| l.session == session))
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), RemoteError> {
        self.open_state()?.autocommit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), RemoteError> {
        let mut state = self.open_state()?;
        if let Some(err) = state.commit_error.clone() {
            return Err(err);
        }
        state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), RemoteError> {
        self.open_state()?.rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.close_calls += 1;
        state.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state().closed
    }
}

/// Profile used across the control-plane tests.
pub fn test_profile() -> ConnectionProfile {
    ConnectionProfile {
        host: "db.internal".to_string(),
        port: 1521,
        service: "ORCL".to_string(),
        username: "system".to_string(),
        password: "manager".to_string(),
        sysdba: true,
        naming: crate::configuration::types::NamingConvention::ServiceName,
    }
}
