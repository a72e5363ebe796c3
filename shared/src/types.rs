use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// What a publishing host puts on the network for the lifetime of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Instance name, usually the hostname
    pub name: String,

    /// Ephemeral port of the rendezvous listener
    pub port: u16,

    /// Addresses peers can dial
    pub addresses: Vec<IpAddr>,
}

/// One resolved response observed while querying for the service type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryMatch {
    /// Full DNS-SD instance name, e.g. "host._airlift._tcp.local."
    pub name: String,

    /// Advertised addresses, sorted
    pub addresses: Vec<IpAddr>,

    /// Service port
    pub port: u16,
}

impl DiscoveryMatch {
    pub fn new(name: impl Into<String>, mut addresses: Vec<IpAddr>, port: u16) -> Self {
        addresses.sort();
        addresses.dedup();
        Self {
            name: name.into(),
            addresses,
            port,
        }
    }

    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.addresses.iter().find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    pub fn ipv6(&self) -> Option<Ipv6Addr> {
        self.addresses.iter().find_map(|addr| match addr {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        })
    }

    /// IPv4 if advertised, else IPv6, else nothing to dial.
    pub fn preferred_addr(&self) -> Option<SocketAddr> {
        self.ipv4()
            .map(IpAddr::V4)
            .or_else(|| self.ipv6().map(IpAddr::V6))
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}
