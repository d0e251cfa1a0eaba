//! Address and version resolution for the control connection.
//!
//! Pure functions: no I/O, no remote calls. The session controller feeds the
//! version banner it reads once at open time into [`classify_banner`].

use crate::configuration::types::{ConnectionProfile, NamingConvention};
use serde::Serialize;
use std::fmt;

/// Normalised release family of the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VersionTag {
    #[serde(rename = "11g")]
    V11g,
    #[serde(rename = "12c")]
    V12c,
    #[serde(rename = "19c+")]
    V19cPlus,
    #[serde(rename = "unknown")]
    Unknown,
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            VersionTag::V11g => "11g",
            VersionTag::V12c => "12c",
            VersionTag::V19cPlus => "19c+",
            VersionTag::Unknown => "unknown",
        };
        f.write_str(tag)
    }
}

/// Classifies a version banner by case-insensitive substring match.
///
/// Checked in order `11g`, `12c`, then `19c`/`21c`; anything else, including a
/// missing banner, is [`VersionTag::Unknown`].
pub fn classify_banner(banner: Option<&str>) -> VersionTag {
    let Some(banner) = banner else {
        return VersionTag::Unknown;
    };
    let lower = banner.to_lowercase();
    if lower.contains("11g") {
        VersionTag::V11g
    } else if lower.contains("12c") {
        VersionTag::V12c
    } else if lower.contains("19c") || lower.contains("21c") {
        VersionTag::V19cPlus
    } else {
        VersionTag::Unknown
    }
}

/// The connection string form used to reach the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectDescriptor {
    ServiceName {
        host: String,
        port: u16,
        service: String,
    },
    Sid {
        host: String,
        port: u16,
        sid: String,
    },
}

impl ConnectDescriptor {
    /// Renders the descriptor in the form the client libraries accept.
    pub fn connect_string(&self) -> String {
        match self {
            ConnectDescriptor::ServiceName {
                host,
                port,
                service,
            } => format!("//{}:{}/{}", host, port, service),
            ConnectDescriptor::Sid { host, port, sid } => format!(
                "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={}))(CONNECT_DATA=(SID={})))",
                host, port, sid
            ),
        }
    }
}

impl fmt::Display for ConnectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connect_string())
    }
}

/// Picks the connection string form for `profile`.
///
/// 11g hosts are always addressed by SID; otherwise the profile's naming
/// convention decides.
pub fn connect_descriptor(profile: &ConnectionProfile, version: VersionTag) -> ConnectDescriptor {
    let use_sid = version == VersionTag::V11g || profile.naming == NamingConvention::Sid;
    if use_sid {
        ConnectDescriptor::Sid {
            host: profile.host.clone(),
            port: profile.port,
            sid: profile.service.clone(),
        }
    } else {
        ConnectDescriptor::ServiceName {
            host: profile.host.clone(),
            port: profile.port,
            service: profile.service.clone(),
        }
    }
}
