use serde::{Deserialize, Serialize};
use std::fmt;

/// How the `service` field of a profile names the database.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    #[default]
    ServiceName,
    Sid,
}

/// Connection parameters for the control connection.
///
/// Supplied by the caller and never written back anywhere by this crate. The
/// `Debug` impl redacts the secret.
#[derive(PartialEq, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Service name or SID, depending on `naming`.
    pub service: String,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Connect with the SYSDBA administrative privilege.
    #[serde(default)]
    pub sysdba: bool,
    #[serde(default)]
    pub naming: NamingConvention,
}

impl ConnectionProfile {
    /// Principal the remote permissions are granted to.
    pub fn principal(&self) -> String {
        self.username.to_uppercase()
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("service", &self.service)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sysdba", &self.sysdba)
            .field("naming", &self.naming)
            .finish()
    }
}

fn default_db_port() -> u16 {
    1521
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Port the deployed relay listens on inside the remote host.
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// Optional path to an alternative relay source payload.
    #[serde(default)]
    pub source_path: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_proxy_port(),
            source_path: None,
        }
    }
}

fn default_proxy_port() -> u16 {
    1080
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_kill_attempts")]
    pub kill_attempts: u32,
    #[serde(default = "default_kill_pause_ms")]
    pub kill_pause_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            kill_attempts: default_kill_attempts(),
            kill_pause_ms: default_kill_pause_ms(),
        }
    }
}

fn default_kill_attempts() -> u32 {
    3
}

fn default_kill_pause_ms() -> u64 {
    1000
}

/// Settings for running the relay engine locally.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// Upper bound on concurrently served connections. `None` means unbounded.
    #[serde(default)]
    pub max_connections: Option<usize>,
    /// Send RFC 1928 failure replies instead of silently closing on
    /// unsupported requests and failed connects.
    #[serde(default)]
    pub strict_replies: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_proxy_port(),
            max_connections: None,
            strict_replies: false,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}
