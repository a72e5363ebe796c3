use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use anyhow::{Context, Result};
use mdns_sd::ServiceDaemon;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use shared::protocol::{SERVICE_TAG, SERVICE_TYPE};
use crate::config::SessionConfig;
use crate::mdns::browser::{self, DiscoverOptions, Discovery};

/// How a candidate address turns into a byte stream.
pub trait Connector {
    type Stream: AsyncRead + Unpin;

    fn connect(&mut self, addr: SocketAddr) -> impl Future<Output = io::Result<Self::Stream>>;
}

/// Plain TCP dial bounded by a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    pub timeout: Duration,
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&mut self, addr: SocketAddr) -> io::Result<TcpStream> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {} timed out after {:?}", addr, self.timeout),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A candidate connected and its stream was copied out in full
    Received { from: SocketAddr, bytes: u64 },
    /// The query completed without any candidate connecting
    Exhausted { attempts: usize },
}

/// Try each match in arrival order until one connects, then copy that
/// connection into `out` until end-of-stream.
///
/// Dial failures only skip the candidate. An I/O error while streaming ends
/// the session.
pub async fn receive<C, W>(
    discovery: &mut Discovery,
    connector: &mut C,
    out: &mut W,
) -> Result<ReceiveOutcome>
where
    C: Connector,
    W: AsyncWrite + Unpin,
{
    let mut attempts = 0;

    while let Some(candidate) = discovery.next().await {
        let Some(addr) = candidate.preferred_addr() else {
            tracing::debug!("{} advertised no addresses, skipping", candidate.name);
            continue;
        };

        attempts += 1;
        let mut conn = match connector.connect(addr).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!("Dial {} ({}) failed: {}", candidate.name, addr, e);
                continue;
            }
        };

        tracing::info!("Connected to {} at {}", candidate.name, addr);

        let bytes = tokio::io::copy(&mut conn, out)
            .await
            .with_context(|| format!("Failed to stream from {}", addr))?;
        out.flush().await.context("Failed to flush output")?;

        return Ok(ReceiveOutcome::Received { from: addr, bytes });
    }

    Ok(ReceiveOutcome::Exhausted { attempts })
}

/// Query the network and copy the first reachable publisher to stdout.
pub async fn run(config: &SessionConfig) -> Result<ReceiveOutcome> {
    let daemon = ServiceDaemon::new().context("Failed to create mDNS daemon")?;

    let result = receive_with(&daemon, config, &mut tokio::io::stdout()).await;

    if let Err(e) = daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    result
}

async fn receive_with<W>(
    daemon: &ServiceDaemon,
    config: &SessionConfig,
    out: &mut W,
) -> Result<ReceiveOutcome>
where
    W: AsyncWrite + Unpin,
{
    let mut discovery = browser::discover(
        daemon,
        SERVICE_TYPE,
        DiscoverOptions {
            tag: SERVICE_TAG.to_string(),
            query_timeout: config.query_timeout,
            capacity: config.match_capacity,
        },
    )?;

    let mut connector = TcpConnector {
        timeout: config.connect_timeout,
    };

    receive(&mut discovery, &mut connector, out).await
}
