//! Datagram transport for discovering nodes of a DHT.
//!
//! The transport speaks a minimal plaintext nodes request / nodes response
//! protocol over UDP. It does not route for the DHT, it only asks.
//!
//! # Example
//!
//! ```no_run
//! use dht_crawler_transport::{NodeAddress, PublicKey, SessionConfiguration, UdpTransport};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (events_tx, mut events_rx) = mpsc::unbounded_channel();
//! let transport = UdpTransport::new(SessionConfiguration::default());
//! let mut session = transport.open(events_tx).await?;
//!
//! let key = PublicKey::from_hex(
//!     "7E5668E0EE09E19F320AD47902419331FFEE147BB3606769CFBE921A2A2FD34C",
//! )?;
//! session
//!     .bootstrap(&NodeAddress::new("144.217.86.39", 33445), &key)
//!     .await?;
//!
//! loop {
//!     session.poll();
//!     while let Ok(node) = events_rx.try_recv() {
//!         println!("{} at {}", node.public_key, node.address);
//!     }
//!     tokio::time::sleep(session.recommended_poll_interval()).await;
//! }
//! # }
//! ```

mod configuration;
mod error;
mod key;
mod node;
pub mod packet;
mod udp;

pub use configuration::{
    SessionConfiguration, DEFAULT_BIND_ADDRESS, DEFAULT_MAX_DATAGRAMS_PER_POLL,
    DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
};
pub use error::TransportError;
pub use key::{PublicKey, PublicKeyError, PUBLIC_KEY_SIZE};
pub use node::{NodeAddress, NodeDiscovered};
pub use packet::{Packet, PacketError};
pub use udp::{UdpSession, UdpTransport};
