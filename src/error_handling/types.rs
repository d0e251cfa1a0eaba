use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    MissingField(String),
    BadPort(String),
    NotInRange(String),
    AssetMissing(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::MissingField(e) => write!(f, "Missing configuration value: {}", e),
            ConfigError::BadPort(e) => write!(f, "Port error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::AssetMissing(e) => write!(f, "Embedded asset missing: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failure reported by the remote host for a single control-plane call.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteError {
    ConnectionClosed,
    Statement { code: Option<i32>, message: String },
}

impl RemoteError {
    pub fn statement(message: impl Into<String>) -> Self {
        RemoteError::Statement {
            code: None,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            RemoteError::Statement { code, .. } => *code,
            RemoteError::ConnectionClosed => None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::ConnectionClosed => write!(f, "control connection is closed"),
            RemoteError::Statement {
                code: Some(code),
                message,
            } => write!(f, "ORA-{:05}: {}", code, message),
            RemoteError::Statement {
                code: None,
                message,
            } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Control-plane error taxonomy surfaced at the verify/start/stop boundary.
#[derive(Debug, Clone)]
pub enum ControlError {
    /// Control connection unreachable or refused.
    Network(String),
    /// Credentials rejected, or the post-auth tagging call failed.
    Auth(String),
    /// Elevated privilege missing, or a permission grant was rejected.
    Privilege(String),
    /// Deployed source failed to validate; carries every remote diagnostic.
    Compilation(String),
    /// Start aborted before the listener was launched.
    Start(Box<ControlError>),
    Remote(RemoteError),
}

impl ControlError {
    /// Unwraps nested `Start` layers down to the failure that caused them.
    pub fn root_cause(&self) -> &ControlError {
        match self {
            ControlError::Start(inner) => inner.root_cause(),
            other => other,
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::Network(e) => write!(f, "Network error: {}", e),
            ControlError::Auth(e) => write!(f, "Authentication error: {}", e),
            ControlError::Privilege(e) => write!(f, "Privilege error: {}", e),
            ControlError::Compilation(e) => write!(f, "Compilation error: {}", e),
            ControlError::Start(e) => write!(f, "Start error: {}", e),
            ControlError::Remote(e) => write!(f, "Remote call failed: {}", e),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<RemoteError> for ControlError {
    fn from(err: RemoteError) -> Self {
        ControlError::Remote(err)
    }
}

/// Malformed or unsupported SOCKS5 input on a relay connection.
#[derive(Debug)]
pub enum ProtocolError {
    UnsupportedVersion(u8),
    UnsupportedCommand(u8),
    UnsupportedAddressType(u8),
    InvalidDomain,
    Io(std::io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnsupportedVersion(v) => write!(f, "Unsupported SOCKS version: {}", v),
            ProtocolError::UnsupportedCommand(c) => write!(f, "Unsupported command: {:#04x}", c),
            ProtocolError::UnsupportedAddressType(a) => {
                write!(f, "Unsupported address type: {:#04x}", a)
            }
            ProtocolError::InvalidDomain => write!(f, "Domain name is not valid UTF-8"),
            ProtocolError::Io(e) => write!(f, "Protocol IO error: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::Io(err)
    }
}

#[derive(Debug)]
pub enum RelayError {
    BindError(std::io::Error),
    Protocol(ProtocolError),
    ConnectFailed(String, std::io::Error),
    ConnectTimeout(String),
    IoError(std::io::Error),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::BindError(e) => write!(f, "Relay bind error: {}", e),
            RelayError::Protocol(e) => write!(f, "Relay protocol error: {}", e),
            RelayError::ConnectFailed(target, e) => {
                write!(f, "Connection to {} failed: {}", target, e)
            }
            RelayError::ConnectTimeout(target) => write!(f, "Connection to {} timed out", target),
            RelayError::IoError(e) => write!(f, "Relay IO error: {}", e),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<ProtocolError> for RelayError {
    fn from(err: ProtocolError) -> Self {
        RelayError::Protocol(err)
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::IoError(err)
    }
}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    ControlError(ControlError),
    NotConnected,
    TaskFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::ControlError(e) => write!(f, "{}", e),
            ControllerError::NotConnected => write!(f, "No verified control connection"),
            ControllerError::TaskFailed(e) => write!(f, "Background task failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ControlError> for ControllerError {
    fn from(err: ControlError) -> Self {
        ControllerError::ControlError(err)
    }
}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}
