//! A single crawl from bootstrap to persisted log.
//!
//! An instance owns its registry, scheduler, and transport session outright.
//! The only thing it shares with the rest of the process is the pool's exit
//! flag, reached through its [`ActiveSlot`].

use crate::builder::CrawlerConfig;
use crate::pool::ActiveSlot;
use crate::registry::NodeRegistry;
use crate::scheduler::RequestScheduler;
use crate::transport::{Session, Transport};
use crate::writer::ResultWriter;
use dht_crawler_transport::{NodeDiscovered, TransportError};
use log::{debug, info, warn};
use std::collections::TryReserveError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

/// Default number of full registry sweeps before an instance may stop.
pub const DEFAULT_MIN_PASSES: usize = 2;
/// Default time without a new node after which a crawl is considered done.
pub const DEFAULT_NODE_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Interval between progress lines of a running instance.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Errors that prevent a crawl instance from starting.
#[derive(Debug)]
pub enum CrawlError {
    /// The transport could not open a session.
    Session(TransportError),
    /// The bootstrap selection left no peer to contact.
    NoBootstrapPeers,
    /// The registry could not allocate its initial slots.
    Allocation(TryReserveError),
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlError::Session(err) => write!(f, "Failed to open session: {err}"),
            CrawlError::NoBootstrapPeers => write!(f, "No bootstrap peers to contact"),
            CrawlError::Allocation(err) => write!(f, "Failed to allocate node registry: {err}"),
        }
    }
}

impl std::error::Error for CrawlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrawlError::Session(err) => Some(err),
            CrawlError::NoBootstrapPeers => None,
            CrawlError::Allocation(err) => Some(err),
        }
    }
}

impl From<TransportError> for CrawlError {
    fn from(err: TransportError) -> Self {
        CrawlError::Session(err)
    }
}

impl From<TryReserveError> for CrawlError {
    fn from(err: TryReserveError) -> Self {
        CrawlError::Allocation(err)
    }
}

/// When a running crawl is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    /// Full sweeps of the registry required before stopping.
    pub min_passes: usize,
    /// Time without a new node required before stopping.
    pub node_discovery_timeout: Duration,
}

impl TerminationPolicy {
    /// Returns true if a crawl in this situation should stop.
    ///
    /// A shutdown request always stops the crawl. Otherwise the registry has
    /// to be swept `min_passes` times and growth has to have stalled for
    /// `node_discovery_timeout`.
    pub fn should_terminate(
        &self,
        exit_requested: bool,
        pass_count: usize,
        last_discovery: Instant,
        now: Instant,
    ) -> bool {
        exit_requested
            || (pass_count >= self.min_passes
                && now.saturating_duration_since(last_discovery) >= self.node_discovery_timeout)
    }
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        TerminationPolicy {
            min_passes: DEFAULT_MIN_PASSES,
            node_discovery_timeout: DEFAULT_NODE_DISCOVERY_TIMEOUT,
        }
    }
}

/// How a crawl ended.
///
/// Bootstrapping happens inside [`CrawlInstance::bootstrap`] and a
/// [`CrawlInstance`] is always running, so only the end states need naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Results were written to the log.
    Persisted,
    /// Results were dropped, either on shutdown or because writing failed.
    Discarded,
}

/// Summary of a finished crawl.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub instance_id: u64,
    /// Nodes in the registry when the crawl stopped.
    pub nodes: usize,
    /// Completed sweeps of the registry.
    pub passes: usize,
    /// True if the crawl was stopped by a shutdown request.
    pub interrupted: bool,
    /// Where the log was written, if it was.
    pub persisted: Option<PathBuf>,
    pub state: InstanceState,
}

/// One crawl of the DHT.
#[derive(Debug)]
pub struct CrawlInstance<S: Session> {
    registry: NodeRegistry,
    scheduler: RequestScheduler,
    session: S,
    events: mpsc::UnboundedReceiver<NodeDiscovered>,
    last_discovery: Instant,
    termination: TerminationPolicy,
    writer: ResultWriter,
    slot: ActiveSlot,
}

impl<S: Session> CrawlInstance<S> {
    /// Open a session and contact the configured bootstrap peers.
    ///
    /// Peers that answer the contact attempt become the first registry
    /// entries. A peer that cannot be contacted is logged and skipped.
    ///
    /// # Arguments
    ///
    /// * `transport` - Opens the session this instance will own.
    /// * `config` - Bootstrap peers, registry size, and crawl tuning.
    /// * `slot` - The pool reservation held until the instance is done.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlInstance)` - An instance ready to [`run`](Self::run).
    /// * `Err(CrawlError)` - If no peer was selected or the session could not be opened.
    pub async fn bootstrap<T>(
        transport: &T,
        config: &CrawlerConfig,
        slot: ActiveSlot,
    ) -> Result<Self, CrawlError>
    where
        T: Transport<Session = S>,
    {
        let peers = config
            .bootstrap_selection
            .select(&config.bootstrap_peers);
        if peers.is_empty() {
            return Err(CrawlError::NoBootstrapPeers);
        }

        let mut registry = NodeRegistry::with_capacity(config.initial_registry_capacity)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut session = transport.create_session(events_tx).await?;

        let id = slot.id();
        let mut contacted = 0;
        for peer in peers {
            match session.bootstrap(&peer.address, &peer.public_key).await {
                Ok(()) => {
                    registry.insert(peer.public_key, peer.address.clone());
                    contacted += 1;
                }
                Err(e) => warn!("Crawl {id}: bootstrap via {} failed: {e}", peer.address),
            }
        }
        debug!("Crawl {id}: contacted {contacted} bootstrap peers");

        let now = Instant::now();
        Ok(CrawlInstance {
            registry,
            scheduler: RequestScheduler::new(config.scheduler, now),
            session,
            events: events_rx,
            last_discovery: now,
            termination: config.termination,
            writer: ResultWriter::new(config.log_destination.clone()),
            slot,
        })
    }

    pub fn id(&self) -> u64 {
        self.slot.id()
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Time the most recent new node was recorded.
    pub fn last_discovery(&self) -> Instant {
        self.last_discovery
    }

    /// Returns true if the crawl should stop at `now`.
    pub fn is_finished(&self, now: Instant) -> bool {
        self.termination.should_terminate(
            self.slot.pool().exit_requested(),
            self.registry.pass_count(),
            self.last_discovery,
            now,
        )
    }

    /// Poll the session and record every node it reported.
    ///
    /// # Returns
    ///
    /// The number of nodes that were new to the registry.
    pub fn receive_discoveries(&mut self, now: Instant) -> usize {
        self.session.poll();

        let mut added = 0;
        while let Ok(node) = self.events.try_recv() {
            if self.registry.insert(node.public_key, node.address) {
                added += 1;
            }
        }
        if added > 0 {
            self.last_discovery = now;
        }
        added
    }

    /// One step of the crawl loop: take in responses, then send the next batch.
    ///
    /// # Returns
    ///
    /// The number of primary requests sent.
    pub fn iterate(&mut self, now: Instant) -> usize {
        self.receive_discoveries(now);
        self.scheduler
            .schedule_tick(&mut self.registry, &mut self.session, now)
    }

    /// Crawl until the termination policy holds, then persist or discard the results.
    pub async fn run(mut self) -> CrawlOutcome {
        let id = self.id();
        info!("Crawl {id} running with {} seed nodes", self.registry.len());
        let mut last_progress = Instant::now();

        loop {
            let now = Instant::now();
            if self.is_finished(now) {
                break;
            }
            self.iterate(now);

            if now.saturating_duration_since(last_progress) >= PROGRESS_LOG_INTERVAL {
                info!(
                    "Crawl {id}: {} nodes, {} passes, idle for {:?}",
                    self.registry.len(),
                    self.registry.pass_count(),
                    now.saturating_duration_since(self.last_discovery)
                );
                last_progress = now;
            }

            sleep(self.session.recommended_poll_interval()).await;
        }

        self.finish().await
    }

    /// Persist unless interrupted, then release the session and the pool slot, in that order.
    async fn finish(self) -> CrawlOutcome {
        let CrawlInstance {
            registry,
            session,
            writer,
            slot,
            ..
        } = self;
        let id = slot.id();
        let interrupted = slot.pool().exit_requested();
        info!(
            "Crawl {id} finished with {} nodes after {} passes",
            registry.len(),
            registry.pass_count()
        );

        let (state, persisted) = if interrupted {
            debug!("Crawl {id} interrupted, discarding results");
            (InstanceState::Discarded, None)
        } else {
            match writer.persist(id, &registry.snapshot_addresses()).await {
                Ok(path) => {
                    info!("Crawl {id} wrote {}", path.display());
                    (InstanceState::Persisted, Some(path))
                }
                Err(e) => {
                    warn!("Crawl {id} results lost: {e}");
                    (InstanceState::Discarded, None)
                }
            }
        };

        session.close();
        let outcome = CrawlOutcome {
            instance_id: id,
            nodes: registry.len(),
            passes: registry.pass_count(),
            interrupted,
            persisted,
            state,
        };
        drop(slot);
        outcome
    }
}
