//! UDP sessions.
//!
//! A [`UdpSession`] owns one socket and a throwaway identity. Requests are
//! written without waiting and responses are drained by [`UdpSession::poll`],
//! which hands every reported node to the event channel given at creation.

use crate::configuration::SessionConfiguration;
use crate::error::TransportError;
use crate::key::PublicKey;
use crate::node::{NodeAddress, NodeDiscovered};
use crate::packet::{self, Packet, MAX_PACKET_SIZE};
use log::{debug, info};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;

/// Opens [`UdpSession`]s with a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct UdpTransport {
    configuration: SessionConfiguration,
}

impl UdpTransport {
    /// Create a transport which opens sessions with the given configuration.
    pub fn new(configuration: SessionConfiguration) -> Self {
        UdpTransport { configuration }
    }

    /// Open a new session.
    ///
    /// # Arguments
    ///
    /// * `events` - Channel every node reported by a response is delivered to.
    ///
    /// # Returns
    ///
    /// * `Ok(UdpSession)` - A bound session with a fresh identity.
    /// * `Err(TransportError)` - If the socket could not be bound.
    pub async fn open(
        &self,
        events: mpsc::UnboundedSender<NodeDiscovered>,
    ) -> Result<UdpSession, TransportError> {
        let socket = UdpSocket::bind(self.configuration.bind_address).await?;
        // Non-blocking sends fail until the socket's readiness is registered.
        socket.writable().await?;
        let identity = PublicKey::random();
        info!(
            "Opened DHT session {identity} on {}",
            socket.local_addr()?
        );

        Ok(UdpSession {
            socket,
            identity,
            configuration: self.configuration.clone(),
            events,
            resolved: HashMap::new(),
            pending: HashMap::new(),
            next_request_id: rand::random(),
            buf: vec![0u8; MAX_PACKET_SIZE + 1],
        })
    }
}

/// A bound UDP socket speaking the nodes discovery protocol.
#[derive(Debug)]
pub struct UdpSession {
    socket: UdpSocket,
    /// Identity advertised as the sender of every request.
    identity: PublicKey,
    configuration: SessionConfiguration,
    events: mpsc::UnboundedSender<NodeDiscovered>,
    /// Hostnames resolved during bootstrap.
    resolved: HashMap<String, SocketAddr>,
    /// Outstanding request ids and when they were sent.
    pending: HashMap<u64, Instant>,
    next_request_id: u64,
    /// One byte larger than any valid packet so oversized datagrams are caught.
    buf: Vec<u8>,
}

impl UdpSession {
    /// The identity this session advertises.
    pub fn identity(&self) -> PublicKey {
        self.identity
    }

    /// Local address of the session socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Contact a known node, asking it for nodes near our own identity.
    ///
    /// Hostnames are resolved here and remembered, so later requests to the
    /// same host do not need a lookup.
    ///
    /// # Arguments
    ///
    /// * `address` - Where the bootstrap node listens.
    /// * `public_key` - Identity of the bootstrap node.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The request was written to the socket.
    /// * `Err(TransportError)` - If the host could not be resolved or the write failed.
    pub async fn bootstrap(
        &mut self,
        address: &NodeAddress,
        public_key: &PublicKey,
    ) -> Result<(), TransportError> {
        let socket_addr = match address.socket_addr() {
            Some(addr) => addr,
            None => {
                let addr = lookup_host((address.host.as_str(), address.port))
                    .await?
                    .next()
                    .ok_or_else(|| TransportError::Unresolved(address.host.clone()))?;
                self.resolved.insert(address.host.clone(), addr);
                addr
            }
        };

        let request_id = self.next_request_id();
        let packet = Packet::NodesRequest {
            sender: self.identity,
            queried: self.identity,
            request_id,
        };
        self.socket.send_to(&packet.encode(), socket_addr).await?;
        self.pending.insert(request_id, Instant::now());
        debug!("Sent bootstrap request to {public_key:?} at {socket_addr}");

        Ok(())
    }

    /// Ask the node at `target` for nodes near `queried`.
    ///
    /// Fire-and-forget: a request that cannot be written right away is
    /// dropped, the next pass over the node will ask again.
    pub fn request_peers_near(
        &mut self,
        target: &NodeAddress,
        target_key: &PublicKey,
        queried: &PublicKey,
    ) {
        let socket_addr = match target
            .socket_addr()
            .or_else(|| self.resolved.get(&target.host).copied())
        {
            Some(addr) => addr,
            None => {
                debug!("Dropping request to unresolved host {target}");
                return;
            }
        };

        let request_id = self.next_request_id();
        let packet = Packet::NodesRequest {
            sender: self.identity,
            queried: *queried,
            request_id,
        };
        match self.socket.try_send_to(&packet.encode(), socket_addr) {
            Ok(_) => {
                self.pending.insert(request_id, Instant::now());
            }
            Err(e) => debug!("Failed to send nodes request to {target_key:?} at {target}: {e}"),
        }
    }

    /// Drain pending datagrams and deliver discovered nodes.
    ///
    /// Never waits on the socket, returns once no datagram is ready or the
    /// per-poll cap is reached.
    pub fn poll(&mut self) {
        let now = Instant::now();
        let timeout = self.configuration.request_timeout;
        self.pending
            .retain(|_, sent| now.saturating_duration_since(*sent) < timeout);

        for _ in 0..self.configuration.max_datagrams_per_poll {
            match self.socket.try_recv_from(&mut self.buf) {
                Ok((len, from)) => {
                    if len > MAX_PACKET_SIZE {
                        debug!("Dropping oversized datagram from {from}");
                        continue;
                    }
                    let datagram = self.buf[..len].to_vec();
                    self.handle_datagram(&datagram, from);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    // ICMP unreachable errors surface here on some platforms.
                    debug!("Receive error: {e}");
                    break;
                }
            }
        }
    }

    /// Advisory sleep between polls.
    pub fn recommended_poll_interval(&self) -> Duration {
        self.configuration.poll_interval
    }

    /// Release the socket.
    pub fn close(self) {
        debug!(
            "Closing DHT session {} with {} requests outstanding",
            self.identity,
            self.pending.len()
        );
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }

    fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr) {
        match Packet::decode(datagram) {
            Ok(Packet::NodesResponse {
                sender,
                request_id,
                nodes,
            }) => {
                if self.pending.remove(&request_id).is_none() {
                    debug!("Ignoring unsolicited response from {sender:?} at {from}");
                    return;
                }
                debug!("Received {} nodes from {sender:?} at {from}", nodes.len());
                for discovered in packet::discoveries(nodes) {
                    if self.events.send(discovered).is_err() {
                        // Receiver dropped, nobody is listening anymore.
                        return;
                    }
                }
            }
            Ok(Packet::NodesRequest { sender, .. }) => {
                // We do not route for the DHT.
                debug!("Ignoring nodes request from {sender:?} at {from}");
            }
            Err(e) => debug!("Dropping datagram from {from}: {e}"),
        }
    }
}
