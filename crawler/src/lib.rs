//! A crawler for peer-to-peer DHT networks.
//!
//! Crawl instances start from a few well-known bootstrap nodes, ask every
//! node they learn about for its neighbours, and write the addresses of
//! every node found once the network stops yielding new ones. A pool keeps
//! a bounded number of crawls running on a timer.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use dht_crawler::{CrawlerBuilder, UdpTransport};
//!
//! let crawler = CrawlerBuilder::new(UdpTransport::default()).build()?;
//! crawler
//!     .run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//! # Ok(())
//! # }
//! ```

mod bootstrap;
mod builder;
mod crawler;
mod instance;
mod pool;
mod registry;
mod scheduler;
mod transport;
mod writer;

pub use bootstrap::{default_bootstrap_peers, BootstrapPeer, BootstrapSelection, DEFAULT_DHT_PORT};
pub use builder::{CrawlerBuilder, CrawlerBuilderError, CrawlerConfig};
pub use crawler::Crawler;
pub use instance::{
    CrawlError, CrawlInstance, CrawlOutcome, InstanceState, TerminationPolicy, DEFAULT_MIN_PASSES,
    DEFAULT_NODE_DISCOVERY_TIMEOUT,
};
pub use pool::{
    ActiveSlot, PoolManager, PoolState, DEFAULT_MAX_CONCURRENT_CRAWLS, DEFAULT_SPAWN_INTERVAL,
    DEFAULT_SPAWN_POLL_INTERVAL, DEFAULT_SPAWN_RETRY_DELAY,
};
pub use registry::{DiscoveredNode, NodeRegistry, DEFAULT_REGISTRY_CAPACITY};
pub use scheduler::{
    RequestScheduler, SchedulerConfig, DEFAULT_CROSS_REQUESTS_PER_NODE,
    DEFAULT_MAX_REQUESTS_PER_TICK, DEFAULT_REQUEST_INTERVAL,
};
pub use transport::{Session, Transport};
pub use writer::{LogDestination, PersistError, ResultWriter};

// Re-exports.
pub use dht_crawler_transport::{
    NodeAddress, NodeDiscovered, PublicKey, PublicKeyError, SessionConfiguration, TransportError,
    UdpSession, UdpTransport,
};
