use crate::builder::CrawlerConfig;
use crate::instance::{CrawlError, CrawlInstance, CrawlOutcome};
use crate::pool::{PoolManager, PoolState};
use crate::transport::Transport;
use log::info;
use std::future::Future;
use std::sync::Arc;

/// DHT network crawler.
///
/// Runs a pool of crawl instances, each of which walks the DHT from the
/// bootstrap peers until the network stops yielding new nodes and then
/// writes every node it found to the log.
#[derive(Debug)]
pub struct Crawler<T: Transport> {
    transport: T,
    config: Arc<CrawlerConfig>,
    pool: Arc<PoolState>,
}

impl<T: Transport> Crawler<T> {
    /// Create a new crawler. Use [`crate::CrawlerBuilder`] to validate the configuration.
    pub(crate) fn new(transport: T, config: CrawlerConfig) -> Self {
        Crawler {
            transport,
            config: Arc::new(config),
            pool: Arc::new(PoolState::new()),
        }
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// The pool counters, for requesting an exit from another task.
    pub fn pool(&self) -> &Arc<PoolState> {
        &self.pool
    }

    /// Start crawls on a timer until `shutdown` resolves or an exit is
    /// requested through [`pool`](Self::pool).
    ///
    /// Returns once every running crawl has stopped. Crawls interrupted by
    /// the shutdown discard their results.
    ///
    /// # Arguments
    ///
    /// * `shutdown` - Resolves when the crawler should stop, for example on an interrupt signal.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting crawler, up to {} crawls every {:?}",
            self.config.max_concurrent_crawls, self.config.spawn_interval
        );
        PoolManager::new(self.transport.clone(), self.config.clone(), self.pool.clone())
            .run(shutdown)
            .await;
    }

    /// Run a single crawl to completion outside of the pool schedule.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOutcome)` - The finished crawl.
    /// * `Err(CrawlError)` - If the crawl could not start.
    pub async fn crawl_once(&self) -> Result<CrawlOutcome, CrawlError> {
        let instance =
            CrawlInstance::bootstrap(&self.transport, &self.config, self.pool.acquire()).await?;
        Ok(instance.run().await)
    }
}
