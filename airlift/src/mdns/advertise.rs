use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use mdns_sd::{ServiceDaemon, ServiceInfo, UnregisterStatus};
use anyhow::{Context, Result};
use shared::protocol::{APP_NAME, TXT_APP, TXT_VERSION};
use shared::types::ServiceRecord;

const UNREGISTER_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// A published service record. Withdrawn on `shutdown`, or on drop if the
/// owner never got that far.
pub struct Advertisement {
    daemon: ServiceDaemon,
    fullname: String,
    withdrawn: AtomicBool,
}

/// Build the mDNS record for `record` under `service_type`.
pub fn service_info(service_type: &str, record: &ServiceRecord) -> Result<ServiceInfo> {
    let host_name = if record.name.ends_with(".local.") {
        record.name.clone()
    } else {
        format!("{}.local.", record.name.trim_end_matches('.'))
    };

    let txt_records = HashMap::from([
        (TXT_APP.to_string(), APP_NAME.to_string()),
        (TXT_VERSION.to_string(), env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let addr_strs: Vec<String> = record.addresses.iter().map(|a| a.to_string()).collect();
    let addr_refs: Vec<&str> = addr_strs.iter().map(|s| s.as_str()).collect();

    ServiceInfo::new(
        service_type,
        &record.name,
        &host_name,
        addr_refs.as_slice(),
        record.port,
        txt_records,
    )
    .context("Failed to create ServiceInfo")
}

pub fn advertise(
    daemon: &ServiceDaemon,
    service_type: &str,
    record: &ServiceRecord,
) -> Result<Advertisement> {
    let info = service_info(service_type, record)?;
    let fullname = info.get_fullname().to_string();

    daemon
        .register(info)
        .context("Failed to register mDNS service")?;

    tracing::info!(
        "Registered {} as {} on port {} at {:?}",
        service_type,
        fullname,
        record.port,
        record.addresses
    );

    Ok(Advertisement {
        daemon: daemon.clone(),
        fullname,
        withdrawn: AtomicBool::new(false),
    })
}

impl Advertisement {
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Unregister the record. Returns false if it was already withdrawn.
    pub fn withdraw(&self) -> bool {
        self.unregister_once().is_some()
    }

    fn unregister_once(&self) -> Option<flume::Receiver<UnregisterStatus>> {
        if self.withdrawn.swap(true, Ordering::SeqCst) {
            return None;
        }

        match self.daemon.unregister(&self.fullname) {
            Ok(status) => {
                tracing::info!("Unregistered {}", self.fullname);
                Some(status)
            }
            Err(e) => {
                tracing::error!("Failed to unregister mDNS service {}: {}", self.fullname, e);
                None
            }
        }
    }

    /// Withdraw and give the daemon a moment to send the goodbye packets.
    pub async fn shutdown(&self) {
        let Some(status) = self.unregister_once() else {
            return;
        };

        match tokio::time::timeout(UNREGISTER_ACK_TIMEOUT, status.recv_async()).await {
            Ok(Ok(UnregisterStatus::OK)) => {}
            Ok(Ok(other)) => tracing::warn!("Unregister of {} returned {:?}", self.fullname, other),
            Ok(Err(e)) => tracing::warn!("Unregister status channel closed: {}", e),
            Err(_) => tracing::warn!("Timed out waiting for unregister of {}", self.fullname),
        }
    }
}

impl Drop for Advertisement {
    fn drop(&mut self) {
        self.withdraw();
    }
}
