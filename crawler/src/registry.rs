//! Per-crawl store of discovered nodes.
//!
//! The registry is an append-only list of nodes in discovery order, deduplicated
//! by public key. It also carries the send cursor the scheduler uses to sweep
//! the list in passes.

use dht_crawler_transport::{NodeAddress, PublicKey};
use std::collections::{HashSet, TryReserveError};

/// Default number of slots a registry starts with.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 4096;

/// A node discovered during a crawl. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredNode {
    /// Unique network identity of the node.
    pub public_key: PublicKey,
    /// Where the node was reported to be reachable.
    pub address: NodeAddress,
}

/// Ordered, growable, deduplicated collection of [`DiscoveredNode`]s.
///
/// Capacity is tracked explicitly and doubles when the next insert would
/// reach it, so it is always a power-of-two multiple of the initial capacity.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: Vec<DiscoveredNode>,
    /// Keys of every node in `nodes`.
    index: HashSet<PublicKey>,
    capacity: usize,
    /// Index of the first node not yet targeted in the current pass.
    send_cursor: usize,
    /// Completed sweeps of the send cursor.
    pass_count: usize,
}

impl NodeRegistry {
    /// Create a registry with room for `initial_capacity` nodes.
    ///
    /// # Returns
    ///
    /// * `Ok(NodeRegistry)` - An empty registry.
    /// * `Err(TryReserveError)` - If the initial slots could not be allocated.
    pub fn with_capacity(initial_capacity: usize) -> Result<Self, TryReserveError> {
        let capacity = initial_capacity.max(1);
        let mut nodes = Vec::new();
        nodes.try_reserve_exact(capacity)?;
        let mut index = HashSet::new();
        index.try_reserve(capacity)?;

        Ok(NodeRegistry {
            nodes,
            index,
            capacity,
            send_cursor: 0,
            pass_count: 0,
        })
    }

    /// Returns true if a node with this key has been recorded.
    pub fn contains(&self, public_key: &PublicKey) -> bool {
        self.index.contains(public_key)
    }

    /// Record a node if its key is new.
    ///
    /// # Returns
    ///
    /// `true` if the node was appended, `false` if the key was already known
    /// or the registry could not grow. A dropped node may be rediscovered
    /// through another peer later.
    pub fn insert(&mut self, public_key: PublicKey, address: NodeAddress) -> bool {
        if self.contains(&public_key) {
            return false;
        }

        if self.nodes.len() + 1 >= self.capacity && self.grow().is_err() {
            return false;
        }
        if self.index.try_reserve(1).is_err() {
            return false;
        }

        self.index.insert(public_key);
        self.nodes.push(DiscoveredNode {
            public_key,
            address,
        });
        true
    }

    /// Addresses of every recorded node, in discovery order.
    pub fn snapshot_addresses(&self) -> Vec<NodeAddress> {
        self.nodes.iter().map(|node| node.address.clone()).collect()
    }

    /// Number of recorded nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no node has been recorded.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Current number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Recorded nodes in discovery order.
    pub fn nodes(&self) -> &[DiscoveredNode] {
        &self.nodes
    }

    pub fn send_cursor(&self) -> usize {
        self.send_cursor
    }

    pub fn pass_count(&self) -> usize {
        self.pass_count
    }

    /// Move the send cursor forward.
    ///
    /// When the cursor reaches the end of the list the pass is complete: the
    /// pass count goes up by one and the cursor starts over at zero.
    pub(crate) fn advance_cursor(&mut self, cursor: usize) {
        debug_assert!(cursor >= self.send_cursor && cursor <= self.nodes.len());
        self.send_cursor = cursor.min(self.nodes.len());

        if self.send_cursor == self.nodes.len() {
            self.pass_count += 1;
            self.send_cursor = 0;
        }
    }

    fn grow(&mut self) -> Result<(), TryReserveError> {
        let new_capacity = self.capacity.saturating_mul(2);
        self.nodes
            .try_reserve_exact(new_capacity.saturating_sub(self.nodes.len()))?;
        self.capacity = new_capacity;
        Ok(())
    }
}
