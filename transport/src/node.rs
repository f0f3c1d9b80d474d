//! DHT node addressing.

use crate::key::PublicKey;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Where a DHT node can be reached.
///
/// The host is kept as text since bootstrap nodes may be configured by
/// hostname, while nodes learned from the network always carry an IP literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    /// Textual IP address or hostname.
    pub host: String,
    /// UDP port the node listens on.
    pub port: u16,
}

impl NodeAddress {
    /// Create a new address from a host and port.
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        NodeAddress {
            host: host.into(),
            port,
        }
    }

    /// The address as a socket address, if the host is an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.host
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl From<SocketAddr> for NodeAddress {
    fn from(addr: SocketAddr) -> Self {
        NodeAddress {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => write!(f, "[{}]:{}", self.host, self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// A node reported by a remote peer in answer to a nodes request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDiscovered {
    /// Identity of the reported node.
    pub public_key: PublicKey,
    /// Where the reported node can be reached.
    pub address: NodeAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_socket_addr() {
        let addr = NodeAddress::new("144.217.86.39", 33445);
        assert_eq!(
            addr.socket_addr(),
            Some(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::new(144, 217, 86, 39)),
                33445
            ))
        );

        let hostname = NodeAddress::new("node.example.org", 33445);
        assert_eq!(hostname.socket_addr(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            NodeAddress::new("10.0.0.1", 33445).to_string(),
            "10.0.0.1:33445"
        );
        let v6 = NodeAddress::from(SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 33445));
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.to_string(), "[::1]:33445");
    }
}
