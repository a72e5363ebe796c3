use std::io;
use std::sync::Arc;
use anyhow::{Context, Result};
use mdns_sd::ServiceDaemon;
use tokio::io::{AsyncRead, AsyncReadExt};
use shared::protocol::SERVICE_TYPE;
use shared::types::ServiceRecord;
use crate::config::SessionConfig;
use crate::mdns::advertise;
use crate::net::addresses;
use crate::rendezvous::{self, RendezvousSink};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Copy `reader` into the sink until end of input. The first write blocks
/// until a receiver has connected.
pub async fn copy_into<R>(reader: &mut R, sink: &RendezvousSink) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        sink.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}

/// Send all of `reader` through the sink and close it.
pub async fn transfer<R>(reader: &mut R, sink: &RendezvousSink) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let bytes = copy_into(reader, sink)
        .await
        .context("Failed to copy input into rendezvous")?;

    sink.close().await.context("Failed to close rendezvous")?;

    Ok(bytes)
}

fn instance_name(config: &SessionConfig) -> Result<String> {
    if let Some(name) = &config.name {
        return Ok(name.clone());
    }

    Ok(hostname::get()
        .context("Failed to get system hostname")?
        .to_string_lossy()
        .to_string())
}

/// Advertise a one-shot endpoint and push stdin to whoever connects first.
pub async fn run(config: &SessionConfig) -> Result<()> {
    let name = instance_name(config)?;

    let addresses = addresses::select_addresses()
        .context("Failed to enumerate network interfaces")?;
    if addresses.is_empty() {
        anyhow::bail!("No reachable address to advertise: only loopback or virtual interfaces are up");
    }

    let bind = match config.bind {
        Some(bind) => bind,
        None => addresses::unspecified_for(&addresses)?,
    };

    let (port, sink) = rendezvous::start_rendezvous(bind).await?;

    let daemon = ServiceDaemon::new().context("Failed to create mDNS daemon")?;
    let record = ServiceRecord {
        name,
        port,
        addresses,
    };

    let result = advertise_and_send(&daemon, &record, &sink).await;

    if let Err(e) = daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    let bytes = result?;
    tracing::info!("Sent {} bytes", bytes);
    Ok(())
}

async fn advertise_and_send(
    daemon: &ServiceDaemon,
    record: &ServiceRecord,
    sink: &RendezvousSink,
) -> Result<u64> {
    let advertisement = Arc::new(advertise::advertise(daemon, SERVICE_TYPE, record)?);

    // Pull the record as soon as someone is connected so nobody else tries.
    let watcher = {
        let advertisement = Arc::clone(&advertisement);
        let sink = sink.clone();
        tokio::spawn(async move {
            if let Ok(peer) = sink.accepted().await {
                tracing::debug!("{} connected, withdrawing {}", peer, advertisement.fullname());
                advertisement.withdraw();
            }
        })
    };

    let mut stdin = tokio::io::stdin();
    let result = transfer(&mut stdin, sink).await;

    watcher.abort();
    advertisement.shutdown().await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;
    use shared::types::DiscoveryMatch;
    use crate::mdns::browser::Discovery;
    use crate::session::receive::{self, ReceiveOutcome, TcpConnector};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// Publish `input` on loopback, discover it through a hand-fed match and
    /// return what the receiver wrote plus how the receive ended.
    async fn loopback_transfer(input: &'static [u8]) -> (Vec<u8>, ReceiveOutcome, u64) {
        let (port, sink) = rendezvous::start_rendezvous(LOCALHOST).await.unwrap();

        let publisher = tokio::spawn(async move {
            let mut reader = input;
            transfer(&mut reader, &sink).await.unwrap()
        });

        let (tx, rx) = mpsc::channel(1);
        tx.send(DiscoveryMatch::new(
            "publisher._airlift._tcp.local.",
            vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            port,
        ))
        .await
        .unwrap();
        drop(tx);

        let mut discovery = Discovery::from_channel(rx);
        let mut connector = TcpConnector {
            timeout: std::time::Duration::from_secs(1),
        };
        let mut out = Vec::new();
        let outcome = receive::receive(&mut discovery, &mut connector, &mut out)
            .await
            .unwrap();

        (out, outcome, publisher.await.unwrap())
    }

    #[tokio::test]
    async fn test_end_to_end_hello() {
        let (out, outcome, sent) = loopback_transfer(b"hello").await;
        assert_eq!(out, b"hello");
        assert_eq!(sent, 5);
        assert!(matches!(outcome, ReceiveOutcome::Received { bytes: 5, .. }));
    }

    #[tokio::test]
    async fn test_end_to_end_empty_input() {
        let (out, outcome, sent) = loopback_transfer(b"").await;
        assert!(out.is_empty());
        assert_eq!(sent, 0);
        assert!(matches!(outcome, ReceiveOutcome::Received { bytes: 0, .. }));
    }

    #[tokio::test]
    async fn test_copy_spans_many_reads() {
        let (port, sink) = rendezvous::start_rendezvous(LOCALHOST).await.unwrap();
        let input: Vec<u8> = (0..COPY_BUF_SIZE * 3 + 17).map(|i| (i % 253) as u8).collect();
        let expected = input.clone();

        let reader = tokio::spawn(async move {
            let mut peer = TcpStream::connect((LOCALHOST, port)).await.unwrap();
            let mut received = Vec::new();
            peer.read_to_end(&mut received).await.unwrap();
            received
        });

        let sent = transfer(&mut input.as_slice(), &sink).await.unwrap();
        assert_eq!(sent, expected.len() as u64);
        assert_eq!(reader.await.unwrap(), expected);
    }
}
