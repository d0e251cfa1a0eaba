use crate::control_surface::{ControlSurface, GrantOutcome, Permission};
use crate::error_handling::types::{ControlError, RemoteError};
use log::{debug, error, info};

/// The permissions the relay needs to listen on `port` and reach any target,
/// scoped to one principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeGrant {
    principal: String,
    permissions: Vec<Permission>,
}

impl PrivilegeGrant {
    pub fn for_listener(principal: &str, host: &str, port: u16) -> Self {
        let permissions = vec![
            Permission {
                kind: "java.net.SocketPermission",
                target: format!("{}:{}", escape_host(host), port),
                actions: "listen,accept,resolve",
            },
            Permission {
                kind: "java.net.SocketPermission",
                target: format!("*:{}", port),
                actions: "listen,accept,resolve",
            },
            Permission {
                kind: "java.net.SocketPermission",
                target: "*".to_string(),
                actions: "connect,resolve",
            },
            Permission {
                kind: "java.lang.RuntimePermission",
                target: "createClassLoader".to_string(),
                actions: "",
            },
            Permission {
                kind: "java.lang.RuntimePermission",
                target: "getClassLoader".to_string(),
                actions: "",
            },
            Permission {
                kind: "java.util.PropertyPermission",
                target: "*".to_string(),
                actions: "read,write",
            },
        ];
        Self {
            principal: principal.to_uppercase(),
            permissions,
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Applies every permission in order. Stops at the first rejected grant.
    /// A permission the principal already holds is not an error.
    pub fn apply(&self, surface: &mut dyn ControlSurface) -> Result<(), ControlError> {
        for permission in &self.permissions {
            match surface.grant_permission(&self.principal, permission) {
                Ok(GrantOutcome::Granted) => {
                    debug!(
                        "Granted {} '{}' to {}",
                        permission.kind, permission.target, self.principal
                    );
                }
                Ok(GrantOutcome::AlreadyHeld) => {
                    info!(
                        "{} '{}' already granted to {}",
                        permission.kind, permission.target, self.principal
                    );
                }
                Err(RemoteError::ConnectionClosed) => {
                    return Err(ControlError::Network(
                        RemoteError::ConnectionClosed.to_string(),
                    ));
                }
                Err(e) => {
                    error!(
                        "Grant of {} '{}' failed: {}",
                        permission.kind, permission.target, e
                    );
                    return Err(ControlError::Privilege(format!(
                        "grant of {} '{}' rejected: {}",
                        permission.kind, permission.target, e
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Dots in the host are escaped the way the runtime's policy table expects.
fn escape_host(host: &str) -> String {
    host.replace('.', "\\.")
}
