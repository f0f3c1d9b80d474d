//! Transport abstractions the crawl engine drives.
//!
//! This module provides the [`Transport`] and [`Session`] traits that stand
//! between the crawl engine and the DHT networking stack, enabling dependency
//! injection for testing without modifying the core crawl logic.

use dht_crawler_transport::{
    NodeAddress, NodeDiscovered, PublicKey, TransportError, UdpSession, UdpTransport,
};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// Factory for transport sessions.
///
/// Every crawl instance opens its own session, so implementations must be
/// cheap to clone and shareable across tasks.
pub trait Transport: Clone + Send + Sync + 'static {
    type Session: Session;

    /// Establish a local network identity.
    ///
    /// Nodes reported by responses to the session's requests are delivered to
    /// `events` whenever the session is polled.
    fn create_session(
        &self,
        events: mpsc::UnboundedSender<NodeDiscovered>,
    ) -> impl Future<Output = Result<Self::Session, TransportError>> + Send;
}

/// One open session on the DHT.
pub trait Session: Send + 'static {
    /// Contact a known node once. Failures only concern this node.
    fn bootstrap(
        &mut self,
        address: &NodeAddress,
        public_key: &PublicKey,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Ask the node at `target` for nodes near `queried`, without waiting for an answer.
    fn request_peers_near(
        &mut self,
        target: &NodeAddress,
        target_key: &PublicKey,
        queried: &PublicKey,
    );

    /// Process pending network activity, delivering any discovered nodes.
    fn poll(&mut self);

    /// Advisory sleep between polls.
    fn recommended_poll_interval(&self) -> Duration;

    /// Release the session.
    fn close(self);
}

impl Transport for UdpTransport {
    type Session = UdpSession;

    fn create_session(
        &self,
        events: mpsc::UnboundedSender<NodeDiscovered>,
    ) -> impl Future<Output = Result<Self::Session, TransportError>> + Send {
        let transport = self.clone();
        async move { transport.open(events).await }
    }
}

impl Session for UdpSession {
    fn bootstrap(
        &mut self,
        address: &NodeAddress,
        public_key: &PublicKey,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        UdpSession::bootstrap(self, address, public_key)
    }

    fn request_peers_near(
        &mut self,
        target: &NodeAddress,
        target_key: &PublicKey,
        queried: &PublicKey,
    ) {
        UdpSession::request_peers_near(self, target, target_key, queried)
    }

    fn poll(&mut self) {
        UdpSession::poll(self)
    }

    fn recommended_poll_interval(&self) -> Duration {
        UdpSession::recommended_poll_interval(self)
    }

    fn close(self) {
        UdpSession::close(self)
    }
}
