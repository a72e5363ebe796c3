use std::net::IpAddr;
use anyhow::{Context, Result};

/// Interface name prefixes whose addresses peers can't reach (loopback
/// aliases, container bridges, hypervisor host-only networks).
const EXCLUDED_PREFIXES: &[&str] = &["lo", "docker", "br-", "veth", "virbr", "vbox", "vmnet"];

/// The parts of a network interface the selection policy looks at.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub up: bool,
    pub loopback: bool,
    pub ips: Vec<IpAddr>,
}

impl From<&pnet_datalink::NetworkInterface> for InterfaceInfo {
    fn from(iface: &pnet_datalink::NetworkInterface) -> Self {
        Self {
            name: iface.name.clone(),
            up: iface.is_up(),
            loopback: iface.is_loopback(),
            ips: iface.ips.iter().map(|net| net.ip()).collect(),
        }
    }
}

/// Enumerate local interfaces and pick the addresses to advertise.
///
/// An empty result is not an error here; the caller decides what an
/// unreachable advertisement means.
pub fn select_addresses() -> Result<Vec<IpAddr>> {
    let interfaces = enumerate_interfaces();
    let selected = select_from(&interfaces);
    tracing::debug!("Selected addresses {:?} from {} interfaces", selected, interfaces.len());
    Ok(selected)
}

fn enumerate_interfaces() -> Vec<InterfaceInfo> {
    pnet_datalink::interfaces()
        .iter()
        .map(InterfaceInfo::from)
        .collect()
}

fn usable_interface(iface: &InterfaceInfo) -> bool {
    if !iface.up || iface.loopback {
        return false;
    }
    !EXCLUDED_PREFIXES.iter().any(|prefix| iface.name.starts_with(prefix))
}

fn usable_address(ip: &IpAddr) -> bool {
    !ip.is_loopback() && !ip.is_multicast() && !ip.is_unspecified()
}

/// IPv4 wins outright: if any usable interface carries an IPv4 address,
/// IPv6 addresses are dropped. Otherwise the IPv6 set is returned as found.
pub fn select_from(interfaces: &[InterfaceInfo]) -> Vec<IpAddr> {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();

    for iface in interfaces.iter().filter(|i| usable_interface(i)) {
        for ip in iface.ips.iter().filter(|ip| usable_address(ip)) {
            let bucket = if ip.is_ipv4() { &mut v4 } else { &mut v6 };
            if !bucket.contains(ip) {
                bucket.push(*ip);
            }
        }
    }

    if v4.is_empty() {
        v6
    } else {
        v4
    }
}

/// Listener bind address matching the family that will be advertised.
pub fn unspecified_for(addresses: &[IpAddr]) -> Result<IpAddr> {
    let first = addresses
        .first()
        .context("no address to derive a bind address from")?;
    Ok(match first {
        IpAddr::V4(_) => IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, ips: &[&str]) -> InterfaceInfo {
        InterfaceInfo {
            name: name.to_string(),
            up: true,
            loopback: false,
            ips: ips.iter().map(|s| s.parse().unwrap()).collect(),
        }
    }

    #[test]
    fn test_ipv4_suppresses_ipv6() {
        let ifaces = vec![
            iface("eth0", &["fe80::1", "192.168.1.10"]),
            iface("wlan0", &["fd00::20"]),
        ];
        let selected = select_from(&ifaces);
        assert_eq!(selected, vec!["192.168.1.10".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_ipv4_from_every_interface() {
        let ifaces = vec![
            iface("eth0", &["192.168.1.10"]),
            iface("wlan0", &["10.0.0.5", "fd00::1"]),
        ];
        let selected = select_from(&ifaces);
        assert_eq!(
            selected,
            vec![
                "192.168.1.10".parse::<IpAddr>().unwrap(),
                "10.0.0.5".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_ipv6_only_passthrough() {
        let ifaces = vec![iface("eth0", &["fe80::1", "fd00::20"])];
        let selected = select_from(&ifaces);
        assert_eq!(
            selected,
            vec![
                "fe80::1".parse::<IpAddr>().unwrap(),
                "fd00::20".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_excluded_prefixes_never_contribute() {
        let ifaces = vec![
            iface("lo", &["127.0.0.1"]),
            iface("docker0", &["172.17.0.1"]),
            iface("br-5f2a", &["172.18.0.1"]),
            iface("veth12ab", &["172.17.0.2"]),
            iface("virbr0", &["192.168.122.1"]),
            iface("vboxnet0", &["192.168.56.1"]),
            iface("eth0", &["fd00::20"]),
        ];
        let selected = select_from(&ifaces);
        assert_eq!(selected, vec!["fd00::20".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_down_and_loopback_interfaces_skipped() {
        let mut down = iface("eth1", &["10.0.0.9"]);
        down.up = false;
        let mut lb = iface("lo0", &["10.0.0.8"]);
        lb.loopback = true;
        let mut lb_renamed = iface("eth2", &["10.0.0.7"]);
        lb_renamed.loopback = true;

        assert!(select_from(&[down, lb, lb_renamed]).is_empty());
    }

    #[test]
    fn test_loopback_addresses_on_real_interface_skipped() {
        let ifaces = vec![iface("eth0", &["127.0.1.1", "::1", "10.1.2.3"])];
        assert_eq!(select_from(&ifaces), vec!["10.1.2.3".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_nothing_qualifies_is_empty_not_error() {
        assert!(select_from(&[]).is_empty());
    }

    #[test]
    fn test_live_selection_is_never_an_error() {
        // whatever this host has, selection yields a list, possibly empty
        let selected = select_addresses().unwrap();
        assert!(selected.iter().all(|ip| !ip.is_loopback()));
        assert!(selected.iter().all(|ip| ip.is_ipv4()) || selected.iter().all(|ip| ip.is_ipv6()));
    }

    #[test]
    fn test_unspecified_follows_family() {
        let v4 = unspecified_for(&["10.0.0.5".parse().unwrap()]).unwrap();
        assert_eq!(v4, "0.0.0.0".parse::<IpAddr>().unwrap());
        let v6 = unspecified_for(&["fd00::5".parse().unwrap()]).unwrap();
        assert_eq!(v6, "::".parse::<IpAddr>().unwrap());
        assert!(unspecified_for(&[]).is_err());
    }
}
