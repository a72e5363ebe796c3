use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use anyhow::{Context, Result};
use shared::types::DiscoveryMatch;

#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    /// Substring a full name must contain to be forwarded
    pub tag: String,
    /// Response window; `None` keeps the query open until the consumer stops
    pub query_timeout: Option<Duration>,
    /// Matches buffered ahead of a slow consumer
    pub capacity: usize,
}

/// Stream of matches for one outstanding query. Dropping it stops the browse.
pub struct Discovery {
    rx: mpsc::Receiver<DiscoveryMatch>,
    _stop: DropGuard,
}

impl Discovery {
    /// Wrap an existing channel, e.g. one fed by hand.
    #[cfg(test)]
    pub fn from_channel(rx: mpsc::Receiver<DiscoveryMatch>) -> Self {
        Self {
            rx,
            _stop: CancellationToken::new().drop_guard(),
        }
    }

    /// Next match, or `None` once the query has completed.
    pub async fn next(&mut self) -> Option<DiscoveryMatch> {
        self.rx.recv().await
    }
}

/// Issue one query for `service_type` and stream what comes back.
///
/// Failing to start the browse is fatal and reported here; everything after
/// that happens on a background task.
pub fn discover(
    daemon: &ServiceDaemon,
    service_type: &str,
    opts: DiscoverOptions,
) -> Result<Discovery> {
    let receiver = daemon
        .browse(service_type)
        .with_context(|| format!("Failed to browse {}", service_type))?;

    tracing::info!("Querying for {}", service_type);

    let (discovery, _task) = spawn_browser(daemon, service_type, receiver, opts);
    Ok(discovery)
}

fn spawn_browser(
    daemon: &ServiceDaemon,
    service_type: &str,
    receiver: flume::Receiver<ServiceEvent>,
    opts: DiscoverOptions,
) -> (Discovery, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(opts.capacity.max(1));
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run_browser(
        daemon.clone(),
        service_type.to_string(),
        receiver,
        tx,
        opts,
        cancel.clone(),
    ));

    let discovery = Discovery {
        rx,
        _stop: cancel.drop_guard(),
    };
    (discovery, task)
}

async fn run_browser(
    daemon: ServiceDaemon,
    service_type: String,
    receiver: flume::Receiver<ServiceEvent>,
    tx: mpsc::Sender<DiscoveryMatch>,
    opts: DiscoverOptions,
    cancel: CancellationToken,
) {
    let window = async {
        match opts.query_timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(window);

    loop {
        tokio::select! {
            event = receiver.recv_async() => {
                match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        let Some(found) = to_match(&info, &opts.tag) else {
                            tracing::debug!("Ignoring {}", info.get_fullname());
                            continue;
                        };
                        tracing::debug!("Resolved {} at {:?}:{}", found.name, found.addresses, found.port);
                        if tx.send(found).await.is_err() {
                            break;
                        }
                    }
                    Ok(ServiceEvent::SearchStarted(_)) => {
                        tracing::trace!("mDNS search started");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("mDNS browse channel closed: {}", e);
                        break;
                    }
                }
            }

            _ = &mut window => {
                tracing::debug!("Query window for {} elapsed", service_type);
                break;
            }

            _ = cancel.cancelled() => break,

            _ = tx.closed() => break,
        }
    }

    if let Err(e) = daemon.stop_browse(&service_type) {
        tracing::debug!("Failed to stop browsing {}: {}", service_type, e);
    }
}

/// Convert a resolved record, keeping only names that carry `tag`.
pub fn to_match(info: &ServiceInfo, tag: &str) -> Option<DiscoveryMatch> {
    let name = info.get_fullname();
    if !name.contains(tag) {
        return None;
    }

    let addresses = info.get_addresses().iter().copied().collect();
    Some(DiscoveryMatch::new(name, addresses, info.get_port()))
}
