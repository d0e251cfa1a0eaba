use crate::configuration::types::ConnectionProfile;
use crate::control_surface::{Connector, ControlSurface};
use crate::error_handling::types::{ControlError, RemoteError};
use crate::resolver::{classify_banner, connect_descriptor, ConnectDescriptor, VersionTag};
use log::{debug, error, info, warn};
use uuid::Uuid;

/// Privilege required to grant runtime permissions and kill sessions.
pub const ELEVATED_PRIVILEGE: &str = "ALTER SYSTEM";

/// Prefix of every client identifier tagged onto a control session.
pub const IDENTIFIER_PREFIX: &str = "SOCKS5_PROXY_";

/// One live control connection to the privileged host.
///
/// The session is tagged with a fresh client identifier right after
/// authentication. Lifecycle operations locate the relay's remote execution
/// context by that identifier, never by a local handle.
///
/// The connection is released on every exit path: explicitly through
/// [`ControlSession::close`], or when the session is dropped.
pub struct ControlSession {
    surface: Box<dyn ControlSurface>,
    profile: ConnectionProfile,
    descriptor: ConnectDescriptor,
    client_identifier: String,
    target_version: VersionTag,
}

impl ControlSession {
    /// Opens, tags and verifies a control session for `profile`.
    ///
    /// # Errors
    ///
    /// - [`ControlError::Network`] / [`ControlError::Auth`] from the connector
    /// - [`ControlError::Auth`] if tagging fails after authentication succeeded
    /// - [`ControlError::Privilege`] if the principal lacks [`ELEVATED_PRIVILEGE`]
    ///
    /// Any failure after the connection was established closes it before
    /// returning.
    pub fn open(
        profile: ConnectionProfile,
        connector: &dyn Connector,
    ) -> Result<ControlSession, ControlError> {
        let descriptor = connect_descriptor(&profile, VersionTag::Unknown);
        info!(
            "Opening control connection to {} as {}{}",
            descriptor,
            profile.username,
            if profile.sysdba { " (SYSDBA)" } else { "" }
        );
        let surface = connector.connect(&descriptor, &profile)?;

        let mut session = ControlSession {
            surface,
            profile,
            descriptor,
            client_identifier: format!("{}{}", IDENTIFIER_PREFIX, Uuid::new_v4()),
            target_version: VersionTag::Unknown,
        };

        // Dropping `session` on an early return closes the connection.
        session
            .surface
            .tag_session(&session.client_identifier)
            .map_err(|e| {
                error!("Failed to set client identifier: {}", e);
                ControlError::Auth(format!("failed to set client identifier: {}", e))
            })?;
        debug!("Control session tagged as {}", session.client_identifier);

        session.verify_privileges()?;
        session.target_version = session.resolve_version();

        info!(
            "Control session {} ready (version {})",
            session.client_identifier, session.target_version
        );
        Ok(session)
    }

    fn verify_privileges(&mut self) -> Result<(), ControlError> {
        if !self.check_elevated_privilege()? {
            return Err(ControlError::Privilege(format!(
                "user lacks {} privilege",
                ELEVATED_PRIVILEGE
            )));
        }
        self.surface
            .check_session_registry()
            .map_err(|e| ControlError::Privilege(format!("cannot read session registry: {}", e)))
    }

    /// Whether the authenticated principal holds [`ELEVATED_PRIVILEGE`].
    pub fn check_elevated_privilege(&mut self) -> Result<bool, ControlError> {
        self.surface
            .has_privilege(ELEVATED_PRIVILEGE)
            .map_err(|e| match e {
                RemoteError::ConnectionClosed => ControlError::Network(e.to_string()),
                other => ControlError::Privilege(format!("privilege query failed: {}", other)),
            })
    }

    /// Reads the version banner and classifies it. Never fails: an unreadable
    /// banner is reported as [`VersionTag::Unknown`].
    pub fn resolve_version(&mut self) -> VersionTag {
        match self.surface.version_banner() {
            Ok(banner) => classify_banner(banner.as_deref()),
            Err(e) => {
                warn!("Unable to read version banner: {}", e);
                VersionTag::Unknown
            }
        }
    }

    /// Best-effort, idempotent release of the control connection.
    pub fn close(&mut self) {
        if self.surface.is_closed() {
            return;
        }
        match self.surface.close() {
            Ok(()) => debug!("Control session {} closed", self.client_identifier),
            Err(e) => error!(
                "Failed to close control session {}: {}",
                self.client_identifier, e
            ),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.surface.is_closed()
    }

    pub fn client_identifier(&self) -> &str {
        &self.client_identifier
    }

    pub fn target_version(&self) -> VersionTag {
        self.target_version
    }

    pub fn descriptor(&self) -> &ConnectDescriptor {
        &self.descriptor
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    pub(crate) fn surface_mut(&mut self) -> &mut dyn ControlSurface {
        self.surface.as_mut()
    }
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        self.close();
    }
}
