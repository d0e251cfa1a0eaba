use super::log_sink::LogSink;
use crate::configuration::config::Config;
use crate::configuration::types::ConnectionProfile;
use crate::control_surface::Connector;
use crate::deployment::RelaySource;
use crate::error_handling::types::*;
use crate::lifecycle::{LifecycleManager, RelayServiceHandle, TerminationPolicy};
use crate::resolver::VersionTag;
use crate::session_management::ControlSession;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// What the caller needs from the configuration to drive the control plane.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub policy: TerminationPolicy,
    pub source: RelaySource,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let source = match &config.proxy.source_path {
            Some(path) => RelaySource::from_file(Path::new(path))?,
            None => RelaySource::embedded()?,
        };
        Ok(Self {
            policy: TerminationPolicy::from(&config.lifecycle),
            source,
        })
    }
}

/// Outcome of a successful connection check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub client_identifier: String,
    pub descriptor: String,
    pub version: VersionTag,
    pub has_privilege: bool,
}

struct ActiveControl {
    session: ControlSession,
    lifecycle: LifecycleManager,
}

/// Caller-facing facade over the control plane.
///
/// # Fields Overview
///
/// - `connector`: opens control connections to the remote host
/// - `settings`: relay payload and termination policy
/// - `sink`: caller-visible progress lines
/// - `active`: the verified control session, if any. The mutex serializes
///   start and stop so only one runs at a time.
///
/// Remote calls block, so each one runs on the blocking pool.
pub struct Controller {
    connector: Arc<dyn Connector>,
    settings: ControllerSettings,
    sink: LogSink,
    active: Mutex<Option<ActiveControl>>,
}

impl Controller {
    pub fn new(connector: Arc<dyn Connector>, settings: ControllerSettings, sink: LogSink) -> Self {
        Self {
            connector,
            settings,
            sink,
            active: Mutex::new(None),
        }
    }

    /// Opens and verifies a control session for `profile`, replacing any
    /// session held before.
    pub async fn verify_connection(
        &self,
        profile: ConnectionProfile,
    ) -> Result<VerifyReport, ControllerError> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!(
                "Releasing previous control session {}",
                previous.session.client_identifier()
            );
            drop(previous);
        }

        self.sink.info(format!(
            "Connecting to {}:{} as {}",
            profile.host, profile.port, profile.username
        ));
        let connector = Arc::clone(&self.connector);
        let opened = tokio::task::spawn_blocking(move || {
            let mut session = ControlSession::open(profile, connector.as_ref())?;
            let has_privilege = session.check_elevated_privilege()?;
            Ok::<_, ControlError>((session, has_privilege))
        })
        .await
        .map_err(|e| ControllerError::TaskFailed(e.to_string()))?;

        let (session, has_privilege) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                self.sink.error(format!("Connection check failed: {}", e));
                return Err(e.into());
            }
        };

        let report = VerifyReport {
            client_identifier: session.client_identifier().to_string(),
            descriptor: session.descriptor().to_string(),
            version: session.target_version(),
            has_privilege,
        };
        self.sink.info(format!(
            "Connected (version {}, session {})",
            report.version, report.client_identifier
        ));

        let lifecycle = LifecycleManager::new(
            self.settings.policy,
            self.settings.source.clone(),
            self.sink.clone(),
        );
        *active = Some(ActiveControl { session, lifecycle });
        Ok(report)
    }

    /// Deploys and starts the relay on `port` over the verified session.
    pub async fn start(&self, port: u16) -> Result<(), ControllerError> {
        let mut active = self.active.lock().await;
        let Some(mut control) = active.take() else {
            return Err(ControllerError::NotConnected);
        };

        let (control, result) = tokio::task::spawn_blocking(move || {
            let result = control.lifecycle.start(&mut control.session, port);
            (control, result)
        })
        .await
        .map_err(|e| {
            error!("Start task failed: {}", e);
            ControllerError::TaskFailed(e.to_string())
        })?;

        *active = Some(control);
        result.map_err(ControllerError::from)
    }

    /// Stops the relay and releases the control session. Returns whether a
    /// remote context was verified terminated.
    pub async fn stop(&self) -> bool {
        let mut active = self.active.lock().await;
        let Some(mut control) = active.take() else {
            warn!("Stop requested without a control session");
            return false;
        };

        match tokio::task::spawn_blocking(move || control.lifecycle.stop(&mut control.session)).await {
            Ok(stopped) => {
                info!("Stop finished (terminated: {})", stopped);
                stopped
            }
            Err(e) => {
                error!("Stop task failed: {}", e);
                false
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        match self.active.lock().await.as_ref() {
            Some(control) => !control.session.is_closed(),
            None => false,
        }
    }

    /// The relay handle of the current session, once a start was attempted.
    pub async fn service(&self) -> Option<RelayServiceHandle> {
        self.active
            .lock()
            .await
            .as_ref()
            .and_then(|control| control.lifecycle.handle().cloned())
    }
}
