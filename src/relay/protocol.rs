//! SOCKS5 wire format, CONNECT subset (RFC 1928, no authentication).

use crate::error_handling::types::ProtocolError;
use log::trace;
use std::fmt;
use std::net::Ipv4Addr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const SOCKS_VERSION: u8 = 0x05;
pub const METHOD_NO_AUTH: u8 = 0x00;
pub const METHOD_NONE_ACCEPTABLE: u8 = 0xFF;

pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;

pub const REPLY_SUCCEEDED: u8 = 0x00;
pub const REPLY_HOST_UNREACHABLE: u8 = 0x04;
pub const REPLY_CONNECTION_REFUSED: u8 = 0x05;
pub const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
pub const REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

/// Destination requested by a CONNECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ipv4(Ipv4Addr, u16),
    Domain(String, u16),
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ipv4(ip, port) => write!(f, "{}:{}", ip, port),
            TargetAddr::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}

/// Reads the client greeting and selects "no authentication".
///
/// A greeting with any version other than 5 is answered with `05 FF` and
/// nothing more is read from the stream.
pub async fn negotiate<S>(stream: &mut S) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = stream.read_u8().await?;
    if version != SOCKS_VERSION {
        stream
            .write_all(&[SOCKS_VERSION, METHOD_NONE_ACCEPTABLE])
            .await?;
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let method_count = stream.read_u8().await? as usize;
    let mut methods = vec![0u8; method_count];
    stream.read_exact(&mut methods).await?;
    trace!("Client offered methods {:02x?}", methods);

    stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;
    Ok(())
}

/// Reads one request and returns its destination. Only CONNECT to an IPv4
/// address or a domain name is accepted.
pub async fn read_request<S>(stream: &mut S) -> Result<TargetAddr, ProtocolError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let [version, command, _reserved, address_type] = header;
    if version != SOCKS_VERSION {
        trace!("Request carries version {}, continuing", version);
    }
    if command != CMD_CONNECT {
        return Err(ProtocolError::UnsupportedCommand(command));
    }

    match address_type {
        ATYP_IPV4 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            let port = stream.read_u16().await?;
            Ok(TargetAddr::Ipv4(Ipv4Addr::from(octets), port))
        }
        ATYP_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            let mut raw = vec![0u8; len];
            stream.read_exact(&mut raw).await?;
            let host = String::from_utf8(raw).map_err(|_| ProtocolError::InvalidDomain)?;
            let port = stream.read_u16().await?;
            Ok(TargetAddr::Domain(host, port))
        }
        other => Err(ProtocolError::UnsupportedAddressType(other)),
    }
}

/// `05 00 00 01 0.0.0.0 <port>`, reporting the outbound socket's local port.
pub fn success_reply(bound_port: u16) -> [u8; 10] {
    reply(REPLY_SUCCEEDED, bound_port)
}

pub fn failure_reply(code: u8) -> [u8; 10] {
    reply(code, 0)
}

fn reply(code: u8, port: u16) -> [u8; 10] {
    let [hi, lo] = port.to_be_bytes();
    [SOCKS_VERSION, code, 0x00, ATYP_IPV4, 0, 0, 0, 0, hi, lo]
}

/// Reply code a strict server sends for a rejected request, if any.
pub fn rejection_code(err: &ProtocolError) -> Option<u8> {
    match err {
        ProtocolError::UnsupportedCommand(_) => Some(REPLY_COMMAND_NOT_SUPPORTED),
        ProtocolError::UnsupportedAddressType(_) => Some(REPLY_ADDRESS_TYPE_NOT_SUPPORTED),
        _ => None,
    }
}
