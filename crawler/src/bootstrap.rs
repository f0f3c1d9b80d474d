//! Well-known nodes used to seed a crawl.

use dht_crawler_transport::{NodeAddress, PublicKey, PublicKeyError};
use log::warn;
use rand::seq::index;

/// Default port DHT nodes listen on.
pub const DEFAULT_DHT_PORT: u16 = 33445;

/// Public bootstrap nodes as (host, port, hex public key).
const DEFAULT_BOOTSTRAP_NODES: &[(&str, u16, &str)] = &[
    ("144.217.86.39", 33445, "7E5668E0EE09E19F320AD47902419331FFEE147BB3606769CFBE921A2A2FD34C"),
    ("46.229.52.198", 33445, "813C8F4187833EF0655B10F7752141A352248462A567529A38B6BBF73E979307"),
    ("85.172.30.117", 33445, "8E7D0B859922EF569298B4D261A8CCB5FEA14FB91ED412A7603A585A25698832"),
    ("198.199.98.108", 33445, "BEF0CFB37AF874BD17B9A8F9FE64C75521DB95A37D33C5BDB00E9CF58659C04F"),
    ("81.169.136.229", 33445, "E0DB78116AC6500398DDBA2AEEF3220BB116384CAB714C5D1FCD61EA2B69D75E"),
    ("46.101.197.175", 33445, "CD133B521159541FB1D326DE9850F5E56A6C724B5B8E5EB5CD8D950408E95707"),
    ("209.59.144.175", 33445, "214B7FEA63227CAEC5BCBA87F7ABEEDB1A2FF6D18377DD86BF551B8E094D5F1E"),
    ("188.225.9.167", 33445, "1911341A83E02503AB1FD6561BD64AF3A9D6C3F12B5FBB656976B2E678644A67"),
    ("122.116.39.151", 33445, "5716530A10D362867C8E87EE1CD5362A233BAFBBA4CF47FA73B7CAD368BD5E6E"),
    ("195.123.208.139", 33445, "534A589BA7427C631773D13083570F529238211893640C99D1507300F055FE73"),
    ("139.162.110.188", 33445, "F76A11284547163889DDC89A7738CF271797BF5E5E220643E97AD3C7E7903D55"),
    ("198.98.49.206", 33445, "28DB44A3CEEE69146469855DFFE5F54DA567F5D65E03EFB1D38BBAEFF2553255"),
    ("172.105.109.31", 33445, "D46E97CF995DC1820B92B7D899E152A217D36ABE22730FEA4B6BF1BFC06C617C"),
    ("91.146.66.26", 33445, "B5E7DAC610DBDE55F359C7F8690B294C8E4FCEC4385DE9525DBFA5523EAD9D53"),
];

/// A node known at startup and presumed reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPeer {
    pub address: NodeAddress,
    pub public_key: PublicKey,
}

impl BootstrapPeer {
    /// Create a bootstrap peer from a host, port, and hex encoded key.
    pub fn new<S: Into<String>>(host: S, port: u16, hex_key: &str) -> Result<Self, PublicKeyError> {
        Ok(BootstrapPeer {
            address: NodeAddress::new(host, port),
            public_key: PublicKey::from_hex(hex_key)?,
        })
    }
}

/// The built-in bootstrap table.
///
/// Entries whose key fails to decode are skipped.
pub fn default_bootstrap_peers() -> Vec<BootstrapPeer> {
    DEFAULT_BOOTSTRAP_NODES
        .iter()
        .filter_map(|&(host, port, hex_key)| match BootstrapPeer::new(host, port, hex_key) {
            Ok(peer) => Some(peer),
            Err(e) => {
                warn!("Skipping bootstrap node {host}:{port}: {e}");
                None
            }
        })
        .collect()
}

/// Which bootstrap peers an instance contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapSelection {
    /// Every configured peer.
    #[default]
    All,
    /// A uniformly random subset of at most this many peers.
    Random(usize),
}

impl BootstrapSelection {
    /// Pick the peers to contact, keeping their configured order.
    pub fn select<'a>(&self, peers: &'a [BootstrapPeer]) -> Vec<&'a BootstrapPeer> {
        match *self {
            BootstrapSelection::All => peers.iter().collect(),
            BootstrapSelection::Random(count) => {
                let mut picked =
                    index::sample(&mut rand::thread_rng(), peers.len(), count.min(peers.len()))
                        .into_vec();
                picked.sort_unstable();
                picked.into_iter().map(|i| &peers[i]).collect()
            }
        }
    }
}
