//! Single-use TCP endpoint: bind an ephemeral port, accept exactly one peer in
//! the background, and hand the connection to whoever writes into the sink.

pub mod gate;

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use self::gate::{Gate, GateError, GateSetter};

/// The one connection a rendezvous ever binds.
#[derive(Debug, Clone)]
pub struct Accepted {
    stream: Arc<Mutex<TcpStream>>,
    peer: SocketAddr,
}

/// Write/close handle over a connection that may not exist yet.
///
/// Every call waits for the background accept to resolve. After a failed
/// accept each call returns an `accept error` and no socket is touched.
#[derive(Debug, Clone)]
pub struct RendezvousSink {
    gate: Gate<Accepted>,
}

/// Bind `bind:0`, start the one-shot accept, and return the bound port with
/// the sink that will carry the stream.
pub async fn start_rendezvous(bind: IpAddr) -> Result<(u16, RendezvousSink)> {
    let listener = TcpListener::bind(SocketAddr::new(bind, 0))
        .await
        .with_context(|| format!("Failed to bind rendezvous listener on {}", bind))?;

    let port = listener
        .local_addr()
        .context("Failed to read rendezvous listener address")?
        .port();

    tracing::info!("Rendezvous listening on {}", SocketAddr::new(bind, port));

    let (setter, gate) = gate::gate();
    tokio::spawn(accept_once(listener, setter));

    Ok((port, RendezvousSink { gate }))
}

async fn accept_once(listener: TcpListener, setter: GateSetter<Accepted>) {
    match listener.accept().await {
        Ok((stream, peer)) => {
            tracing::info!("Accepted connection from {}", peer);
            setter.succeed(Accepted {
                stream: Arc::new(Mutex::new(stream)),
                peer,
            });
        }
        Err(e) => {
            tracing::error!("Rendezvous accept failed: {}", e);
            setter.fail(GateError::from(&e));
        }
    }
    // listener drops here: nobody else gets in
}

impl RendezvousSink {
    #[cfg(test)]
    pub(crate) fn from_gate(gate: Gate<Accepted>) -> Self {
        Self { gate }
    }

    async fn connection(&self) -> io::Result<Accepted> {
        self.gate.wait().await.map_err(|e| {
            io::Error::new(e.kind, format!("accept error: {}", e.message))
        })
    }

    /// Wait for the accept and report who connected.
    pub async fn accepted(&self) -> io::Result<SocketAddr> {
        Ok(self.connection().await?.peer)
    }

    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let conn = self.connection().await?;
        let mut stream = conn.stream.lock().await;
        stream.write(buf).await
    }

    pub async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "rendezvous peer stopped accepting bytes",
                ));
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Shut down the write side so the peer reads end-of-stream.
    pub async fn close(&self) -> io::Result<()> {
        let conn = self.connection().await?;
        let mut stream = conn.stream.lock().await;
        stream.shutdown().await
    }
}
