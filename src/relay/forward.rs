use log::trace;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub const RELAY_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToTarget,
    TargetToClient,
}

/// Byte counts for one relayed connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_target: u64,
    pub target_to_client: u64,
}

/// Copies `reader` into `writer` until EOF, an error, or cancellation, then
/// shuts down the write side.
///
/// Cancellation is only checked between chunks: a read that is already
/// waiting is never interrupted.
pub async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    cancel: CancellationToken,
) -> (u64, io::Result<()>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;
    let outcome = loop {
        if cancel.is_cancelled() {
            break Ok(());
        }
        let n = match reader.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e),
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            break Err(e);
        }
        total += n as u64;
    };
    let _ = writer.shutdown().await;
    (total, outcome)
}

/// Runs both directions as independent tasks and waits for both to finish.
/// One direction ending never stops the other.
pub async fn relay(client: TcpStream, target: TcpStream, cancel: CancellationToken) -> RelayStats {
    let (client_read, client_write) = client.into_split();
    let (target_read, target_write) = target.into_split();

    let mut set = JoinSet::new();
    {
        let cancel = cancel.clone();
        set.spawn(async move {
            let (n, outcome) = pump(client_read, target_write, cancel).await;
            (Direction::ClientToTarget, n, outcome)
        });
    }
    set.spawn(async move {
        let (n, outcome) = pump(target_read, client_write, cancel).await;
        (Direction::TargetToClient, n, outcome)
    });

    let mut stats = RelayStats::default();
    while let Some(joined) = set.join_next().await {
        let (direction, n, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                trace!("Forwarding task failed: {}", e);
                continue;
            }
        };
        match outcome {
            Ok(()) => trace!("{:?} finished after {} bytes", direction, n),
            Err(e) => trace!("{:?} ended with error after {} bytes: {}", direction, n, e),
        }
        match direction {
            Direction::ClientToTarget => stats.client_to_target = n,
            Direction::TargetToClient => stats.target_to_client = n,
        }
    }
    stats
}
