use super::forward::{self, RelayStats};
use super::protocol::{
    self, failure_reply, rejection_code, success_reply, TargetAddr, REPLY_CONNECTION_REFUSED,
    REPLY_HOST_UNREACHABLE,
};
use crate::configuration::types::RelayConfig;
use crate::error_handling::types::RelayError;
use log::{debug, error, info, trace, warn};
use std::io;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub connect_timeout: Duration,
    pub strict_replies: bool,
    pub max_connections: Option<usize>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            strict_replies: false,
            max_connections: None,
        }
    }
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            strict_replies: config.strict_replies,
            max_connections: config.max_connections,
        }
    }
}

/// Progress of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Greeting,
    MethodSelected,
    RequestParsed,
    Connected,
    Relaying,
    Closed,
}

struct RelayConnection {
    peer: SocketAddr,
    state: ConnectionState,
}

impl RelayConnection {
    fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            state: ConnectionState::Greeting,
        }
    }

    fn advance(&mut self, next: ConnectionState) {
        trace!("[{}] {:?} -> {:?}", self.peer, self.state, next);
        self.state = next;
    }
}

/// SOCKS5 CONNECT relay.
///
/// The accept loop runs until the cancellation token fires. Connections that
/// are already relaying keep going until their flows notice the token
/// between chunks or reach EOF.
pub struct RelayServer {
    listener: TcpListener,
    settings: Arc<RelaySettings>,
    cancel: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
}

impl RelayServer {
    pub async fn bind(
        addr: &str,
        settings: RelaySettings,
        cancel: CancellationToken,
    ) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr).await.map_err(RelayError::BindError)?;
        let limiter = settings
            .max_connections
            .map(|max| Arc::new(Semaphore::new(max.clamp(1, Semaphore::MAX_PERMITS))));
        info!(
            "SOCKS5 relay listening on {}",
            listener.local_addr().map_err(RelayError::BindError)?
        );
        Ok(Self {
            listener,
            settings: Arc::new(settings),
            cancel,
            limiter,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        self.listener.local_addr().map_err(RelayError::IoError)
    }

    /// Moves the accept loop onto its own task.
    pub fn spawn(self) -> Result<RelayHandle, RelayError> {
        let local_addr = self.local_addr()?;
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());
        Ok(RelayHandle {
            local_addr,
            cancel,
            task,
        })
    }

    pub async fn run(self) {
        loop {
            let permit = match &self.limiter {
                Some(limiter) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        permit = Arc::clone(limiter).acquire_owned() => match permit {
                            Ok(permit) => Some(permit),
                            Err(_) => break,
                        },
                    }
                }
                None => None,
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        let settings = Arc::clone(&self.settings);
                        let cancel = self.cancel.clone();
                        tokio::spawn(async move {
                            match serve_connection(stream, peer, &settings, cancel).await {
                                Ok(stats) => debug!(
                                    "[{}] closed ({} bytes out, {} bytes in)",
                                    peer, stats.client_to_target, stats.target_to_client
                                ),
                                Err(e) => debug!("[{}] {}", peer, e),
                            }
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        warn!("Accept failed: {}; retrying in {:?}", e, ACCEPT_BACKOFF);
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = sleep(ACCEPT_BACKOFF) => {}
                        }
                    }
                },
            }
        }
        info!("SOCKS5 relay stopped accepting");
    }
}

/// A relay running in the background.
pub struct RelayHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Cancels the relay and waits for the accept loop to exit.
    pub async fn stop(self) -> Result<(), RelayError> {
        self.cancel.cancel();
        self.task.await.map_err(|e| {
            error!("Relay accept task failed: {}", e);
            RelayError::IoError(io::Error::new(io::ErrorKind::Other, e))
        })
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    settings: &RelaySettings,
    cancel: CancellationToken,
) -> Result<RelayStats, RelayError> {
    if cancel.is_cancelled() {
        return Ok(RelayStats::default());
    }
    let mut conn = RelayConnection::new(peer);

    protocol::negotiate(&mut stream).await?;
    conn.advance(ConnectionState::MethodSelected);

    let target = match protocol::read_request(&mut stream).await {
        Ok(target) => target,
        Err(e) => {
            if settings.strict_replies {
                if let Some(code) = rejection_code(&e) {
                    let _ = stream.write_all(&failure_reply(code)).await;
                }
            }
            return Err(e.into());
        }
    };
    conn.advance(ConnectionState::RequestParsed);
    debug!("[{}] CONNECT {}", peer, target);

    let outbound = match timeout(settings.connect_timeout, connect(&target)).await {
        Ok(Ok(outbound)) => outbound,
        Ok(Err(e)) => {
            if settings.strict_replies {
                let code = if e.kind() == io::ErrorKind::ConnectionRefused {
                    REPLY_CONNECTION_REFUSED
                } else {
                    REPLY_HOST_UNREACHABLE
                };
                let _ = stream.write_all(&failure_reply(code)).await;
            }
            return Err(RelayError::ConnectFailed(target.to_string(), e));
        }
        Err(_) => {
            if settings.strict_replies {
                let _ = stream.write_all(&failure_reply(REPLY_HOST_UNREACHABLE)).await;
            }
            return Err(RelayError::ConnectTimeout(target.to_string()));
        }
    };
    conn.advance(ConnectionState::Connected);

    let bound_port = outbound.local_addr()?.port();
    stream.write_all(&success_reply(bound_port)).await?;
    conn.advance(ConnectionState::Relaying);

    let stats = forward::relay(stream, outbound, cancel).await;
    conn.advance(ConnectionState::Closed);
    Ok(stats)
}

async fn connect(target: &TargetAddr) -> io::Result<TcpStream> {
    match target {
        TargetAddr::Ipv4(ip, port) => TcpStream::connect(SocketAddrV4::new(*ip, *port)).await,
        TargetAddr::Domain(host, port) => TcpStream::connect((host.as_str(), *port)).await,
    }
}
