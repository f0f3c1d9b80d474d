//! Request scheduling.
//!
//! Each tick picks the next batch of nodes from the registry's send cursor
//! and asks every one of them for its neighbours. To widen the set of
//! answers, a handful of random known nodes are paired with each target and
//! queried about each other in both directions.

use crate::registry::NodeRegistry;
use crate::transport::Session;
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::Instant;

/// Default minimum time between request batches.
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_secs(0);
/// Default number of nodes targeted per batch.
pub const DEFAULT_MAX_REQUESTS_PER_TICK: usize = 12;
/// Default number of random pairings per targeted node.
pub const DEFAULT_CROSS_REQUESTS_PER_NODE: usize = 7;

/// Throttling and fan-out settings of a [`RequestScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Minimum time between two batches. Zero still caps each batch.
    pub request_interval: Duration,
    /// Most nodes targeted by one batch.
    pub max_requests_per_tick: usize,
    /// Random nodes paired with each target, capped at the registry size.
    pub cross_requests_per_node: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            request_interval: DEFAULT_REQUEST_INTERVAL,
            max_requests_per_tick: DEFAULT_MAX_REQUESTS_PER_TICK,
            cross_requests_per_node: DEFAULT_CROSS_REQUESTS_PER_NODE,
        }
    }
}

/// Walks a [`NodeRegistry`] in passes and emits discovery requests.
#[derive(Debug)]
pub struct RequestScheduler {
    config: SchedulerConfig,
    last_batch: Instant,
    rng: StdRng,
}

impl RequestScheduler {
    /// Create a scheduler whose throttle window starts at `now`.
    pub fn new(config: SchedulerConfig, now: Instant) -> Self {
        Self::with_rng(config, now, StdRng::from_entropy())
    }

    /// Create a scheduler with a given source of randomness for picking cross request partners.
    pub fn with_rng(config: SchedulerConfig, now: Instant, rng: StdRng) -> Self {
        RequestScheduler {
            config,
            last_batch: now,
            rng,
        }
    }

    /// Time of the most recent batch.
    pub fn last_batch(&self) -> Instant {
        self.last_batch
    }

    /// Emit the next batch of requests, if the throttle allows it.
    ///
    /// For each node `N` taken from the send cursor:
    ///
    /// * one primary request asks `N` for nodes near `N` itself.
    /// * for each of `K` random known nodes `R`, `N` is asked about `R` and
    ///   `R` is asked about `N`.
    ///
    /// Reaching the end of the registry completes a pass and restarts the
    /// cursor at zero, so nodes found during a pass are visited on the next.
    ///
    /// # Returns
    ///
    /// The number of primary requests sent.
    pub fn schedule_tick<S: Session>(
        &mut self,
        registry: &mut NodeRegistry,
        session: &mut S,
        now: Instant,
    ) -> usize {
        if now.saturating_duration_since(self.last_batch) < self.config.request_interval {
            return 0;
        }

        let nodes = registry.nodes();
        let cross_requests = self.config.cross_requests_per_node.min(nodes.len());
        let mut cursor = registry.send_cursor();
        let mut sent = 0;

        while sent < self.config.max_requests_per_tick && cursor < nodes.len() {
            let node = &nodes[cursor];
            session.request_peers_near(&node.address, &node.public_key, &node.public_key);

            for _ in 0..cross_requests {
                let partner = &nodes[self.rng.gen_range(0..nodes.len())];
                session.request_peers_near(&node.address, &node.public_key, &partner.public_key);
                session.request_peers_near(&partner.address, &partner.public_key, &node.public_key);
            }

            sent += 1;
            cursor += 1;
        }

        trace!(
            "Sent {sent} primary requests, cursor {cursor} of {}",
            nodes.len()
        );
        registry.advance_cursor(cursor);
        self.last_batch = now;

        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_utils::{addr, key, MockTransport};
    use crate::transport::Transport;
    use tokio::sync::mpsc;

    async fn session(transport: &MockTransport) -> crate::transport::test_utils::MockSession {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        transport.create_session(events_tx).await.unwrap()
    }

    fn registry_with(count: u8) -> NodeRegistry {
        let mut registry = NodeRegistry::with_capacity(16).unwrap();
        for n in 0..count {
            registry.insert(key(n), addr(n));
        }
        registry
    }

    fn scheduler(config: SchedulerConfig, now: Instant) -> RequestScheduler {
        RequestScheduler::with_rng(config, now, StdRng::seed_from_u64(7))
    }

    #[tokio::test]
    async fn test_batch_capped_and_cursor_advances() {
        let transport = MockTransport::new();
        let mut session = session(&transport).await;
        let mut registry = registry_with(5);
        let now = Instant::now();
        let mut scheduler = scheduler(
            SchedulerConfig {
                request_interval: Duration::ZERO,
                max_requests_per_tick: 2,
                cross_requests_per_node: 0,
            },
            now,
        );

        assert_eq!(scheduler.schedule_tick(&mut registry, &mut session, now), 2);
        assert_eq!(registry.send_cursor(), 2);
        assert_eq!(registry.pass_count(), 0);

        assert_eq!(scheduler.schedule_tick(&mut registry, &mut session, now), 2);
        assert_eq!(registry.send_cursor(), 4);

        // Only one node left in this pass.
        assert_eq!(scheduler.schedule_tick(&mut registry, &mut session, now), 1);
        assert_eq!(registry.send_cursor(), 0);
        assert_eq!(registry.pass_count(), 1);

        // Primary requests follow insertion order and ask about the target itself.
        let requests = transport.requests();
        assert_eq!(requests.len(), 5);
        for (n, request) in requests.iter().enumerate() {
            assert_eq!(request.target_key, key(n as u8));
            assert_eq!(request.queried, key(n as u8));
            assert_eq!(request.target, addr(n as u8));
        }
    }

    #[tokio::test]
    async fn test_throttled_by_request_interval() {
        let transport = MockTransport::new();
        let mut session = session(&transport).await;
        let mut registry = registry_with(3);
        let start = Instant::now();
        let mut scheduler = scheduler(
            SchedulerConfig {
                request_interval: Duration::from_secs(2),
                max_requests_per_tick: 1,
                cross_requests_per_node: 0,
            },
            start,
        );

        assert_eq!(
            scheduler.schedule_tick(&mut registry, &mut session, start + Duration::from_secs(1)),
            0
        );
        assert_eq!(registry.send_cursor(), 0);

        let later = start + Duration::from_secs(2);
        assert_eq!(scheduler.schedule_tick(&mut registry, &mut session, later), 1);
        assert_eq!(scheduler.last_batch(), later);

        // The window restarts at the last batch.
        assert_eq!(
            scheduler.schedule_tick(&mut registry, &mut session, later + Duration::from_secs(1)),
            0
        );
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cross_requests_go_both_ways() {
        let transport = MockTransport::new();
        let mut session = session(&transport).await;
        let mut registry = registry_with(4);
        let now = Instant::now();
        let mut scheduler = scheduler(
            SchedulerConfig {
                request_interval: Duration::ZERO,
                max_requests_per_tick: 1,
                cross_requests_per_node: 3,
            },
            now,
        );

        assert_eq!(scheduler.schedule_tick(&mut registry, &mut session, now), 1);

        let requests = transport.requests();
        // One primary plus two per cross pairing.
        assert_eq!(requests.len(), 1 + 2 * 3);
        assert_eq!(requests[0].target_key, key(0));
        assert_eq!(requests[0].queried, key(0));

        for pair in requests[1..].chunks(2) {
            let (ask_target, ask_partner) = (&pair[0], &pair[1]);
            assert_eq!(ask_target.target_key, key(0));
            assert_eq!(ask_partner.queried, key(0));
            assert_eq!(ask_target.queried, ask_partner.target_key);
        }
    }

    #[tokio::test]
    async fn test_cross_requests_capped_at_registry_size() {
        let transport = MockTransport::new();
        let mut session = session(&transport).await;
        let mut registry = registry_with(2);
        let now = Instant::now();
        let mut scheduler = scheduler(
            SchedulerConfig {
                request_interval: Duration::ZERO,
                max_requests_per_tick: 12,
                cross_requests_per_node: 7,
            },
            now,
        );

        assert_eq!(scheduler.schedule_tick(&mut registry, &mut session, now), 2);
        // Two targets, each with one primary and two cross pairings.
        assert_eq!(transport.requests().len(), 2 * (1 + 2 * 2));
        assert_eq!(registry.pass_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_registry_completes_pass() {
        let transport = MockTransport::new();
        let mut session = session(&transport).await;
        let mut registry = registry_with(0);
        let now = Instant::now();
        let mut scheduler = scheduler(SchedulerConfig::default(), now);

        assert_eq!(scheduler.schedule_tick(&mut registry, &mut session, now), 0);
        assert_eq!(registry.pass_count(), 1);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_new_nodes_visited_on_next_pass() {
        let transport = MockTransport::new();
        let mut session = session(&transport).await;
        let mut registry = registry_with(2);
        let now = Instant::now();
        let mut scheduler = scheduler(
            SchedulerConfig {
                request_interval: Duration::ZERO,
                max_requests_per_tick: 12,
                cross_requests_per_node: 0,
            },
            now,
        );

        scheduler.schedule_tick(&mut registry, &mut session, now);
        assert_eq!(registry.pass_count(), 1);

        registry.insert(key(2), addr(2));
        assert_eq!(scheduler.schedule_tick(&mut registry, &mut session, now), 3);
        assert_eq!(registry.pass_count(), 2);

        let targets = transport
            .requests()
            .iter()
            .map(|r| r.target_key)
            .collect::<Vec<_>>();
        assert_eq!(targets, vec![key(0), key(1), key(0), key(1), key(2)]);
    }
}
