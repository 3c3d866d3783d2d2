//! Proxy and registrar endpoint addresses
//!
//! Hosts are resolved to a concrete IPv4 address when the value is built.
//! `"localhost"` resolves to the address other nodes can reach this one
//! on, picked once per process:
//!
//! 1. the address the OS reports for this host
//! 2. a site-local interface address
//! 3. any other non-loopback interface address
//! 4. loopback

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::OnceLock;

use local_ip_address::{list_afinet_netifas, local_ip};

use crate::error::{Error, Result};

/// Default publish port of a proxy
pub const DEFAULT_PROXY_PORT: u16 = 7771;

/// Default registrar port
pub const DEFAULT_REGISTRAR_PORT: u16 = 8888;

const LOCALHOST: &str = "localhost";

static LOCAL_ADDRESS: OnceLock<Ipv4Addr> = OnceLock::new();

/// Address of this node as seen by its peers (cached)
pub fn local_address() -> Ipv4Addr {
    *LOCAL_ADDRESS.get_or_init(discover_local_address)
}

fn discover_local_address() -> Ipv4Addr {
    let reported = match local_ip() {
        Ok(IpAddr::V4(ip)) => Some(ip),
        Ok(IpAddr::V6(_)) => None,
        Err(e) => {
            tracing::debug!(error = %e, "OS reported no local address");
            None
        }
    };

    let interfaces: Vec<Ipv4Addr> = match list_afinet_netifas() {
        Ok(list) => list
            .into_iter()
            .filter_map(|(_, ip)| match ip {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .collect(),
        Err(e) => {
            tracing::debug!(error = %e, "Could not list network interfaces");
            Vec::new()
        }
    };

    let chosen = pick_local_address(reported, &interfaces);
    tracing::debug!(address = %chosen, "Resolved local address");
    chosen
}

fn usable(ip: &Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified()
}

/// Rank candidates: OS-reported, site-local, other non-loopback, loopback
fn pick_local_address(reported: Option<Ipv4Addr>, interfaces: &[Ipv4Addr]) -> Ipv4Addr {
    reported
        .filter(usable)
        .or_else(|| {
            interfaces
                .iter()
                .find(|ip| usable(ip) && ip.is_private())
                .copied()
        })
        .or_else(|| interfaces.iter().find(|ip| usable(ip)).copied())
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

/// Resolve a host name or literal to IPv4
pub fn resolve_ipv4(host: &str) -> Result<Ipv4Addr> {
    if host.is_empty() {
        return Err(Error::InvalidAddress("empty host".into()));
    }
    if host.eq_ignore_ascii_case(LOCALHOST) {
        return Ok(local_address());
    }
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    (host, 0)
        .to_socket_addrs()
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", host, e)))?
        .find_map(|a| match a.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| Error::InvalidAddress(format!("{}: no IPv4 address", host)))
}

/// Proxy endpoint: publish port, subscribe port (`pub + 1`) and
/// control port (`pub + 2`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyAddress {
    host: Ipv4Addr,
    pub_port: u16,
}

impl ProxyAddress {
    /// Resolve `host` and validate that all three ports fit
    pub fn new(host: &str, pub_port: u16) -> Result<Self> {
        if pub_port == 0 || pub_port > u16::MAX - 2 {
            return Err(Error::InvalidAddress(format!(
                "proxy port {} leaves no room for sub/control ports",
                pub_port
            )));
        }
        Ok(Self {
            host: resolve_ipv4(host)?,
            pub_port,
        })
    }

    /// Local proxy on the default port
    pub fn localhost() -> Self {
        Self {
            host: local_address(),
            pub_port: DEFAULT_PROXY_PORT,
        }
    }

    pub fn host(&self) -> Ipv4Addr {
        self.host
    }

    pub fn pub_port(&self) -> u16 {
        self.pub_port
    }

    pub fn sub_port(&self) -> u16 {
        self.pub_port + 1
    }

    pub fn control_port(&self) -> u16 {
        self.pub_port + 2
    }

    pub fn pub_endpoint(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.host), self.pub_port())
    }

    pub fn sub_endpoint(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.host), self.sub_port())
    }

    pub fn control_endpoint(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.host), self.control_port())
    }
}

impl Default for ProxyAddress {
    fn default() -> Self {
        Self::localhost()
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.pub_port)
    }
}

/// Registrar endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegAddress {
    host: Ipv4Addr,
    port: u16,
}

impl RegAddress {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        if port == 0 {
            return Err(Error::InvalidAddress("registrar port must be non-zero".into()));
        }
        Ok(Self {
            host: resolve_ipv4(host)?,
            port,
        })
    }

    /// Local registrar on the default port
    pub fn localhost() -> Self {
        Self {
            host: local_address(),
            port: DEFAULT_REGISTRAR_PORT,
        }
    }

    pub fn host(&self) -> Ipv4Addr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.host), self.port)
    }
}

impl Default for RegAddress {
    fn default() -> Self {
        Self::localhost()
    }
}

impl fmt::Display for RegAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_ports() {
        let addr = ProxyAddress::new("127.0.0.1", 7771).unwrap();
        assert_eq!(addr.pub_port(), 7771);
        assert_eq!(addr.sub_port(), 7772);
        assert_eq!(addr.control_port(), 7773);
        assert_eq!(addr.to_string(), "127.0.0.1:7771");
        assert_eq!(addr.sub_endpoint().port(), 7772);
    }

    #[test]
    fn test_proxy_port_range() {
        assert!(ProxyAddress::new("127.0.0.1", 0).is_err());
        assert!(ProxyAddress::new("127.0.0.1", u16::MAX - 1).is_err());
        assert!(ProxyAddress::new("127.0.0.1", u16::MAX - 2).is_ok());
    }

    #[test]
    fn test_reg_address() {
        let addr = RegAddress::new("127.0.0.1", DEFAULT_REGISTRAR_PORT).unwrap();
        assert_eq!(addr.endpoint().to_string(), "127.0.0.1:8888");
        assert!(RegAddress::new("127.0.0.1", 0).is_err());
    }

    #[test]
    fn test_empty_host_rejected() {
        assert!(matches!(
            ProxyAddress::new("", 7771),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_reported_address_ranks_first() {
        let public = Ipv4Addr::new(203, 0, 113, 7);
        let docker = Ipv4Addr::new(172, 17, 0, 1);
        let interfaces = [Ipv4Addr::LOCALHOST, docker, public];
        assert_eq!(pick_local_address(Some(public), &interfaces), public);
    }

    #[test]
    fn test_interface_fallback_order() {
        let public = Ipv4Addr::new(203, 0, 113, 7);
        let lan = Ipv4Addr::new(192, 168, 1, 20);

        assert_eq!(
            pick_local_address(None, &[Ipv4Addr::LOCALHOST, public, lan]),
            lan
        );
        assert_eq!(
            pick_local_address(Some(Ipv4Addr::LOCALHOST), &[Ipv4Addr::LOCALHOST, public]),
            public
        );
        assert_eq!(
            pick_local_address(None, &[Ipv4Addr::LOCALHOST]),
            Ipv4Addr::LOCALHOST
        );
        assert_eq!(pick_local_address(None, &[]), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_localhost_is_cached_and_ipv4() {
        let a = resolve_ipv4("localhost").unwrap();
        let b = resolve_ipv4("LOCALHOST").unwrap();
        assert_eq!(a, b);
        assert_eq!(ProxyAddress::localhost().host(), a);
    }
}
