//! Crawl instance lifecycle management.
//!
//! The [`PoolManager`] starts crawl instances on a timer, never running more
//! than the configured number at once, and coordinates shutdown. The only
//! state shared between instances is the [`PoolState`] counters.
//!
//! # Shutdown
//!
//! Shutdown is cooperative. The manager raises the exit flag and then waits
//! until every instance has noticed it, released its session, and given back
//! its [`ActiveSlot`]. Instances interrupted this way discard their results.

use crate::builder::CrawlerConfig;
use crate::instance::{CrawlError, CrawlInstance, CrawlOutcome};
use crate::transport::Transport;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

/// Default number of crawl instances running at once.
pub const DEFAULT_MAX_CONCURRENT_CRAWLS: usize = 4;
/// Default time between starting two instances.
pub const DEFAULT_SPAWN_INTERVAL: Duration = Duration::from_secs(180);
/// Default interval at which the manager considers starting an instance.
pub const DEFAULT_SPAWN_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Default back off after an instance failed to start.
pub const DEFAULT_SPAWN_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Interval at which shutdown checks for remaining instances.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct PoolCounters {
    active_count: usize,
    last_spawn: Option<Instant>,
    exit_requested: bool,
    next_instance_id: u64,
}

/// Counters shared by the manager and every running instance.
///
/// All fields sit behind a single lock which is only held for the duration
/// of a check or update, never across an await.
#[derive(Debug, Default)]
pub struct PoolState {
    counters: Mutex<PoolCounters>,
}

impl PoolState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every critical section leaves the counters consistent, so a poisoned
    /// lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, PoolCounters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true once shutdown has been requested.
    pub fn exit_requested(&self) -> bool {
        self.lock().exit_requested
    }

    /// Ask every instance and the manager to stop.
    pub fn request_exit(&self) {
        self.lock().exit_requested = true;
    }

    /// Number of instances holding a slot.
    pub fn active_count(&self) -> usize {
        self.lock().active_count
    }

    /// When the most recent instance was started.
    pub fn last_spawn(&self) -> Option<Instant> {
        self.lock().last_spawn
    }

    /// Reserve a slot if the pool has capacity and the spawn interval has elapsed.
    ///
    /// The check and the reservation happen under one lock, so concurrent
    /// callers can never push the active count past `max_active`.
    pub fn try_acquire(
        self: &Arc<Self>,
        now: Instant,
        max_active: usize,
        spawn_interval: Duration,
    ) -> Option<ActiveSlot> {
        let mut counters = self.lock();
        if counters.exit_requested || counters.active_count >= max_active {
            return None;
        }
        if let Some(last) = counters.last_spawn {
            if now.saturating_duration_since(last) < spawn_interval {
                return None;
            }
        }

        Some(Self::reserve(self, &mut counters))
    }

    /// Reserve a slot regardless of capacity, for a crawl driven directly by the caller.
    pub fn acquire(self: &Arc<Self>) -> ActiveSlot {
        let mut counters = self.lock();
        Self::reserve(self, &mut counters)
    }

    fn reserve(pool: &Arc<Self>, counters: &mut PoolCounters) -> ActiveSlot {
        counters.active_count += 1;
        let id = counters.next_instance_id;
        counters.next_instance_id += 1;

        ActiveSlot {
            pool: pool.clone(),
            id,
        }
    }

    fn record_spawn(&self, now: Instant) {
        self.lock().last_spawn = Some(now);
    }

    fn release(&self) {
        let mut counters = self.lock();
        counters.active_count = counters.active_count.saturating_sub(1);
    }

    /// Wait until every slot has been given back.
    pub async fn wait_idle(&self) {
        while self.active_count() > 0 {
            sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }
}

/// A reserved place in the pool, given back when dropped.
///
/// Owned by a crawl instance for its whole life, so the active count goes
/// down even if the instance task panics.
#[derive(Debug)]
pub struct ActiveSlot {
    pool: Arc<PoolState>,
    id: u64,
}

impl ActiveSlot {
    /// Identifier of the instance holding this slot, unique within the pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pool(&self) -> &Arc<PoolState> {
        &self.pool
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.pool.release();
    }
}

/// Starts crawl instances and drives coordinated shutdown.
#[derive(Debug)]
pub struct PoolManager<T: Transport> {
    transport: T,
    config: Arc<CrawlerConfig>,
    pool: Arc<PoolState>,
    /// Earliest time to try again after a failed start.
    retry_after: Option<Instant>,
}

impl<T: Transport> PoolManager<T> {
    pub fn new(transport: T, config: Arc<CrawlerConfig>, pool: Arc<PoolState>) -> Self {
        PoolManager {
            transport,
            config,
            pool,
            retry_after: None,
        }
    }

    pub fn pool(&self) -> &Arc<PoolState> {
        &self.pool
    }

    /// Start a new crawl instance if it is time and there is capacity.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(handle))` - An instance was started, the handle resolves when it is done.
    /// * `Ok(None)` - Nothing to do yet.
    /// * `Err(CrawlError)` - The instance failed to start. Starting is retried
    ///   after the configured retry delay.
    pub async fn maybe_spawn(&mut self) -> Result<Option<JoinHandle<CrawlOutcome>>, CrawlError> {
        let now = Instant::now();
        if self.retry_after.is_some_and(|after| now < after) {
            return Ok(None);
        }

        let slot = match self.pool.try_acquire(
            now,
            self.config.max_concurrent_crawls,
            self.config.spawn_interval,
        ) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        let id = slot.id();

        // On failure the slot is dropped here, giving the reservation back.
        let instance = match CrawlInstance::bootstrap(&self.transport, &self.config, slot).await {
            Ok(instance) => instance,
            Err(e) => {
                self.retry_after = Some(Instant::now() + self.config.spawn_retry_delay);
                return Err(e);
            }
        };

        self.retry_after = None;
        self.pool.record_spawn(now);
        info!(
            "Started crawl {id} ({} of {} active)",
            self.pool.active_count(),
            self.config.max_concurrent_crawls
        );

        Ok(Some(tokio::spawn(instance.run())))
    }

    /// Run the pool until `shutdown` resolves or an exit is requested, then
    /// wait for every instance to stop.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            if self.pool.exit_requested() {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = sleep(self.config.spawn_poll_interval) => {
                    // A bootstrap in flight may be slow to resolve hosts, shutdown
                    // abandons it and the dropped slot is given back.
                    tokio::select! {
                        _ = &mut shutdown => {
                            info!("Shutdown requested");
                            break;
                        }
                        result = self.maybe_spawn() => match result {
                            // Instances run detached, they report through the log.
                            Ok(Some(_handle)) => {}
                            Ok(None) => {}
                            Err(e) => warn!(
                                "Failed to start crawl instance, retrying in {:?}: {e}",
                                self.config.spawn_retry_delay
                            ),
                        },
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Raise the exit flag and wait for every instance to stop.
    pub async fn shutdown(&self) {
        self.pool.request_exit();
        debug!(
            "Waiting for {} crawl instances to stop",
            self.pool.active_count()
        );
        self.pool.wait_idle().await;
        info!("All crawl instances stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::BootstrapPeer;
    use crate::instance::TerminationPolicy;
    use crate::transport::test_utils::{addr, key, MockTransport};
    use crate::writer::LogDestination;

    fn config(dir: &std::path::Path, termination: TerminationPolicy) -> Arc<CrawlerConfig> {
        Arc::new(CrawlerConfig {
            max_concurrent_crawls: 4,
            spawn_interval: Duration::ZERO,
            spawn_retry_delay: Duration::from_secs(5),
            termination,
            bootstrap_peers: vec![BootstrapPeer {
                address: addr(0),
                public_key: key(0),
            }],
            log_destination: LogDestination::File(dir.join("crawler.log")),
            ..CrawlerConfig::default()
        })
    }

    fn never_terminate() -> TerminationPolicy {
        TerminationPolicy {
            min_passes: usize::MAX,
            node_discovery_timeout: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_try_acquire_respects_cap() {
        let pool = Arc::new(PoolState::new());
        let now = Instant::now();

        let slots = (0..4)
            .map(|_| pool.try_acquire(now, 4, Duration::ZERO).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(pool.active_count(), 4);
        assert!(pool.try_acquire(now, 4, Duration::ZERO).is_none());

        drop(slots);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_try_acquire_respects_spawn_interval() {
        let pool = Arc::new(PoolState::new());
        let start = Instant::now();
        let interval = Duration::from_secs(180);

        // Nothing spawned yet, the first instance starts right away.
        let first = pool.try_acquire(start, 4, interval).unwrap();
        pool.record_spawn(start);

        assert!(pool
            .try_acquire(start + Duration::from_secs(179), 4, interval)
            .is_none());
        let second = pool.try_acquire(start + interval, 4, interval).unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_try_acquire_refused_after_exit() {
        let pool = Arc::new(PoolState::new());
        pool.request_exit();
        assert!(pool.exit_requested());
        assert!(pool.try_acquire(Instant::now(), 4, Duration::ZERO).is_none());
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_cap() {
        let pool = Arc::new(PoolState::new());
        let now = Instant::now();
        let peak = Arc::new(Mutex::new(0usize));

        let threads = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let peak = peak.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Some(slot) = pool.try_acquire(now, 4, Duration::ZERO) {
                            let active = pool.active_count();
                            let mut peak = peak.lock().unwrap();
                            *peak = (*peak).max(active);
                            drop(peak);
                            drop(slot);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        for thread in threads {
            thread.join().unwrap();
        }

        assert!(*peak.lock().unwrap() <= 4);
        assert_eq!(pool.active_count(), 0);
    }

    #[tokio::test]
    async fn test_maybe_spawn_caps_active_instances() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        let pool = Arc::new(PoolState::new());
        let mut manager = PoolManager::new(
            transport.clone(),
            config(dir.path(), never_terminate()),
            pool.clone(),
        );

        let mut spawned = 0;
        for _ in 0..10 {
            if manager.maybe_spawn().await.unwrap().is_some() {
                spawned += 1;
            }
            assert!(pool.active_count() <= 4);
        }
        assert_eq!(spawned, 4);
        assert_eq!(pool.active_count(), 4);

        manager.shutdown().await;
        assert_eq!(pool.active_count(), 0);
        assert_eq!(transport.sessions_opened(), 4);
        assert_eq!(transport.sessions_closed(), 4);
        // Interrupted crawls do not write a log.
        assert!(!dir.path().join("crawler.log").exists());
    }

    #[tokio::test]
    async fn test_cap_holds_while_instances_complete() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        let pool = Arc::new(PoolState::new());
        // Instances finish on their first check.
        let finish_immediately = TerminationPolicy {
            min_passes: 0,
            node_discovery_timeout: Duration::ZERO,
        };
        let mut manager = PoolManager::new(
            transport.clone(),
            config(dir.path(), finish_immediately),
            pool.clone(),
        );

        let mut handles = Vec::new();
        for _ in 0..50 {
            if let Some(handle) = manager.maybe_spawn().await.unwrap() {
                handles.push(handle);
            }
            assert!(pool.active_count() <= 4);
            sleep(Duration::from_millis(5)).await;
        }
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(!outcome.interrupted);
        }

        assert_eq!(pool.active_count(), 0);
        assert!(transport.sessions_opened() > 4);
        assert!(dir.path().join("crawler.log").exists());
    }

    #[tokio::test]
    async fn test_failed_start_backs_off() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.fail_sessions(1);
        let pool = Arc::new(PoolState::new());
        let mut manager = PoolManager::new(
            transport.clone(),
            config(dir.path(), never_terminate()),
            pool.clone(),
        );

        assert!(manager.maybe_spawn().await.is_err());
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.last_spawn(), None);

        // Backing off, nothing is attempted.
        assert!(manager.maybe_spawn().await.unwrap().is_none());
        assert_eq!(transport.sessions_opened(), 0);

        manager.retry_after = None;
        assert!(manager.maybe_spawn().await.unwrap().is_some());
        assert_eq!(pool.active_count(), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_abandons_stalled_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        transport.stall_bootstraps();
        let pool = Arc::new(PoolState::new());
        let manager = PoolManager::new(
            transport.clone(),
            config(dir.path(), never_terminate()),
            pool.clone(),
        );

        tokio::time::timeout(
            Duration::from_secs(5),
            manager.run(sleep(Duration::from_millis(50))),
        )
        .await
        .expect("Shutdown should not wait for a stalled bootstrap");

        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.last_spawn(), None);
        assert_eq!(transport.sessions_opened(), 1);
        assert_eq!(transport.bootstraps(), vec![key(0)]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        let pool = Arc::new(PoolState::new());
        let manager = PoolManager::new(
            transport.clone(),
            config(dir.path(), never_terminate()),
            pool.clone(),
        );

        manager.run(sleep(Duration::from_millis(100))).await;

        assert!(pool.exit_requested());
        assert_eq!(pool.active_count(), 0);
        assert_eq!(transport.sessions_opened(), 4);
        assert_eq!(transport.sessions_closed(), 4);
    }
}
