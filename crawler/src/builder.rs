//! Builder pattern for configuring and creating crawlers.

use crate::bootstrap::{default_bootstrap_peers, BootstrapPeer, BootstrapSelection};
use crate::crawler::Crawler;
use crate::instance::TerminationPolicy;
use crate::pool::{
    DEFAULT_MAX_CONCURRENT_CRAWLS, DEFAULT_SPAWN_INTERVAL, DEFAULT_SPAWN_POLL_INTERVAL,
    DEFAULT_SPAWN_RETRY_DELAY,
};
use crate::registry::DEFAULT_REGISTRY_CAPACITY;
use crate::scheduler::SchedulerConfig;
use crate::transport::Transport;
use crate::writer::LogDestination;
use std::fmt;
use std::time::Duration;

/// Errors that can occur during crawler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlerBuilderError {
    /// At least one crawl must be allowed to run.
    ZeroConcurrency,
    /// The registry needs room for at least one node.
    ZeroRegistryCapacity,
    /// Every batch must target at least one node.
    ZeroRequestsPerTick,
    /// The bootstrap configuration selects no peer.
    NoBootstrapPeers,
}

impl fmt::Display for CrawlerBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerBuilderError::ZeroConcurrency => {
                write!(f, "Maximum concurrent crawls must be at least 1")
            }
            CrawlerBuilderError::ZeroRegistryCapacity => {
                write!(f, "Initial registry capacity must be at least 1")
            }
            CrawlerBuilderError::ZeroRequestsPerTick => {
                write!(f, "Maximum requests per tick must be at least 1")
            }
            CrawlerBuilderError::NoBootstrapPeers => {
                write!(f, "Bootstrap configuration selects no peers")
            }
        }
    }
}

impl std::error::Error for CrawlerBuilderError {}

/// Settings shared by the pool manager and every crawl instance.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Most crawl instances running at once.
    pub max_concurrent_crawls: usize,
    /// Minimum time between starting two instances.
    pub spawn_interval: Duration,
    /// How often the manager considers starting an instance.
    pub spawn_poll_interval: Duration,
    /// Back off after an instance failed to start.
    pub spawn_retry_delay: Duration,
    /// Slots each instance's registry starts with.
    pub initial_registry_capacity: usize,
    pub scheduler: SchedulerConfig,
    pub termination: TerminationPolicy,
    pub bootstrap_peers: Vec<BootstrapPeer>,
    pub bootstrap_selection: BootstrapSelection,
    pub log_destination: LogDestination,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            max_concurrent_crawls: DEFAULT_MAX_CONCURRENT_CRAWLS,
            spawn_interval: DEFAULT_SPAWN_INTERVAL,
            spawn_poll_interval: DEFAULT_SPAWN_POLL_INTERVAL,
            spawn_retry_delay: DEFAULT_SPAWN_RETRY_DELAY,
            initial_registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            scheduler: SchedulerConfig::default(),
            termination: TerminationPolicy::default(),
            bootstrap_peers: default_bootstrap_peers(),
            bootstrap_selection: BootstrapSelection::default(),
            log_destination: LogDestination::default(),
        }
    }
}

impl CrawlerConfig {
    /// Check the settings for values no crawl can run with.
    pub fn validate(&self) -> Result<(), CrawlerBuilderError> {
        if self.max_concurrent_crawls == 0 {
            return Err(CrawlerBuilderError::ZeroConcurrency);
        }
        if self.initial_registry_capacity == 0 {
            return Err(CrawlerBuilderError::ZeroRegistryCapacity);
        }
        if self.scheduler.max_requests_per_tick == 0 {
            return Err(CrawlerBuilderError::ZeroRequestsPerTick);
        }
        if self.bootstrap_peers.is_empty()
            || self.bootstrap_selection == BootstrapSelection::Random(0)
        {
            return Err(CrawlerBuilderError::NoBootstrapPeers);
        }
        Ok(())
    }
}

/// Builder for creating a customized [`Crawler`].
///
/// # Example
///
/// ```
/// # fn main() -> Result<(), dht_crawler::CrawlerBuilderError> {
/// use dht_crawler::{BootstrapSelection, CrawlerBuilder, LogDestination, UdpTransport};
/// use std::time::Duration;
///
/// // A crawler with the default settings.
/// let basic_crawler = CrawlerBuilder::new(UdpTransport::default()).build()?;
///
/// // A crawler with custom settings.
/// let custom_crawler = CrawlerBuilder::new(UdpTransport::default())
///     .with_max_concurrent_crawls(2)
///     .with_spawn_interval(Duration::from_secs(60))
///     .with_bootstrap_selection(BootstrapSelection::Random(4))
///     .with_log_destination(LogDestination::Dated("crawler_logs".into()))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CrawlerBuilder<T: Transport> {
    /// Opens a session for each crawl instance.
    transport: T,
    config: CrawlerConfig,
}

impl<T: Transport> CrawlerBuilder<T> {
    /// Create a new crawler builder on top of a transport.
    ///
    /// # Arguments
    ///
    /// * `transport` - The DHT transport every crawl instance opens its session on.
    ///
    /// # Returns
    ///
    /// A new `CrawlerBuilder` with default settings.
    pub fn new(transport: T) -> Self {
        CrawlerBuilder {
            transport,
            config: CrawlerConfig::default(),
        }
    }

    /// Set the maximum number of crawl instances running at once.
    ///
    /// # Arguments
    ///
    /// * `max_crawls` - Maximum concurrent crawls (defaults to 4).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_max_concurrent_crawls(mut self, max_crawls: usize) -> Self {
        self.config.max_concurrent_crawls = max_crawls;
        self
    }

    /// Set the minimum time between starting two crawl instances.
    ///
    /// # Arguments
    ///
    /// * `interval` - Time between starts (defaults to 180 seconds).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_spawn_interval(mut self, interval: Duration) -> Self {
        self.config.spawn_interval = interval;
        self
    }

    /// Set how often the pool considers starting a crawl instance.
    pub fn with_spawn_poll_interval(mut self, interval: Duration) -> Self {
        self.config.spawn_poll_interval = interval;
        self
    }

    /// Set how long the pool waits after a crawl instance failed to start.
    pub fn with_spawn_retry_delay(mut self, delay: Duration) -> Self {
        self.config.spawn_retry_delay = delay;
        self
    }

    /// Set the number of full registry sweeps required before a crawl may finish.
    ///
    /// # Arguments
    ///
    /// * `passes` - Minimum passes (defaults to 2).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_min_passes(mut self, passes: usize) -> Self {
        self.config.termination.min_passes = passes;
        self
    }

    /// Set how long a crawl must go without finding a new node before it may finish.
    ///
    /// A longer timeout finds more of the network at the cost of longer
    /// crawls. A crawl never finishes before its minimum passes regardless.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Idle time (defaults to 10 seconds).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_node_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.termination.node_discovery_timeout = timeout;
        self
    }

    /// Set the minimum time between two request batches of one crawl.
    ///
    /// # Arguments
    ///
    /// * `interval` - Time between batches (defaults to zero, batches are only capped in size).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.config.scheduler.request_interval = interval;
        self
    }

    /// Set the number of nodes targeted by one request batch.
    ///
    /// # Arguments
    ///
    /// * `max_requests` - Nodes per batch (defaults to 12).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_max_requests_per_tick(mut self, max_requests: usize) -> Self {
        self.config.scheduler.max_requests_per_tick = max_requests;
        self
    }

    /// Set the number of random nodes paired with each targeted node.
    ///
    /// Each pairing costs two extra requests. Higher values surface more
    /// nodes per batch but increase network load.
    ///
    /// # Arguments
    ///
    /// * `cross_requests` - Pairings per target (defaults to 7).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_cross_requests_per_node(mut self, cross_requests: usize) -> Self {
        self.config.scheduler.cross_requests_per_node = cross_requests;
        self
    }

    /// Set the number of slots a crawl's registry starts with.
    pub fn with_initial_registry_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_registry_capacity = capacity;
        self
    }

    /// Replace the built-in bootstrap table.
    pub fn with_bootstrap_peers(mut self, peers: Vec<BootstrapPeer>) -> Self {
        self.config.bootstrap_peers = peers;
        self
    }

    /// Set which bootstrap peers each crawl contacts.
    pub fn with_bootstrap_selection(mut self, selection: BootstrapSelection) -> Self {
        self.config.bootstrap_selection = selection;
        self
    }

    /// Set where finished crawls are written.
    ///
    /// # Arguments
    ///
    /// * `destination` - Log destination (defaults to `crawler.log` in the working directory).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_log_destination(mut self, destination: LogDestination) -> Self {
        self.config.log_destination = destination;
        self
    }

    /// Build the crawler with the configured options.
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - A crawler ready to run.
    /// * `Err(CrawlerBuilderError)` - If a setting leaves nothing to crawl with.
    pub fn build(self) -> Result<Crawler<T>, CrawlerBuilderError> {
        self.config.validate()?;
        Ok(Crawler::new(self.transport, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_utils::{addr, key, MockTransport};

    #[test]
    fn test_defaults() {
        let crawler = CrawlerBuilder::new(MockTransport::new()).build().unwrap();
        let config = crawler.config();

        assert_eq!(config.max_concurrent_crawls, 4);
        assert_eq!(config.spawn_interval, Duration::from_secs(180));
        assert_eq!(config.termination.min_passes, 2);
        assert_eq!(config.termination.node_discovery_timeout, Duration::from_secs(10));
        assert_eq!(config.scheduler.request_interval, Duration::ZERO);
        assert_eq!(config.scheduler.max_requests_per_tick, 12);
        assert_eq!(config.scheduler.cross_requests_per_node, 7);
        assert_eq!(config.initial_registry_capacity, 4096);
        assert_eq!(config.bootstrap_selection, BootstrapSelection::All);
        assert!(!config.bootstrap_peers.is_empty());
    }

    #[test]
    fn test_overrides() {
        let peers = vec![BootstrapPeer {
            address: addr(1),
            public_key: key(1),
        }];
        let crawler = CrawlerBuilder::new(MockTransport::new())
            .with_max_concurrent_crawls(2)
            .with_min_passes(3)
            .with_node_discovery_timeout(Duration::from_secs(20))
            .with_request_interval(Duration::from_secs(1))
            .with_bootstrap_peers(peers.clone())
            .with_log_destination(LogDestination::Dated("logs".into()))
            .build()
            .unwrap();
        let config = crawler.config();

        assert_eq!(config.max_concurrent_crawls, 2);
        assert_eq!(config.termination.min_passes, 3);
        assert_eq!(config.termination.node_discovery_timeout, Duration::from_secs(20));
        assert_eq!(config.scheduler.request_interval, Duration::from_secs(1));
        assert_eq!(config.bootstrap_peers, peers);
        assert_eq!(config.log_destination, LogDestination::Dated("logs".into()));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let build = |builder: CrawlerBuilder<MockTransport>| builder.build().err();

        assert_eq!(
            build(CrawlerBuilder::new(MockTransport::new()).with_max_concurrent_crawls(0)),
            Some(CrawlerBuilderError::ZeroConcurrency)
        );
        assert_eq!(
            build(CrawlerBuilder::new(MockTransport::new()).with_initial_registry_capacity(0)),
            Some(CrawlerBuilderError::ZeroRegistryCapacity)
        );
        assert_eq!(
            build(CrawlerBuilder::new(MockTransport::new()).with_max_requests_per_tick(0)),
            Some(CrawlerBuilderError::ZeroRequestsPerTick)
        );
        assert_eq!(
            build(CrawlerBuilder::new(MockTransport::new()).with_bootstrap_peers(Vec::new())),
            Some(CrawlerBuilderError::NoBootstrapPeers)
        );
        assert_eq!(
            build(
                CrawlerBuilder::new(MockTransport::new())
                    .with_bootstrap_selection(BootstrapSelection::Random(0))
            ),
            Some(CrawlerBuilderError::NoBootstrapPeers)
        );
    }
}
