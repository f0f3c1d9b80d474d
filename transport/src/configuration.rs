//! Session configuration types and constants.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default local address, any interface with an ephemeral port.
pub const DEFAULT_BIND_ADDRESS: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
/// Default interval callers are advised to wait between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Default cap on datagrams drained by a single poll.
pub const DEFAULT_MAX_DATAGRAMS_PER_POLL: usize = 256;
/// Default lifetime of an outstanding request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration used to open a session.
#[derive(Debug, Clone)]
pub struct SessionConfiguration {
    /// Local address the session socket binds to.
    pub bind_address: SocketAddr,
    /// Advisory sleep between polls.
    pub poll_interval: Duration,
    /// Upper bound on datagrams processed per poll, keeps a poll bounded under load.
    pub max_datagrams_per_poll: usize,
    /// How long a request waits for its response before a late answer is ignored.
    pub request_timeout: Duration,
}

impl SessionConfiguration {
    /// Creates a configuration bound to a specific local address.
    pub fn bound_to(bind_address: SocketAddr) -> Self {
        SessionConfiguration {
            bind_address,
            ..Self::default()
        }
    }
}

impl Default for SessionConfiguration {
    fn default() -> Self {
        SessionConfiguration {
            bind_address: DEFAULT_BIND_ADDRESS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_datagrams_per_poll: DEFAULT_MAX_DATAGRAMS_PER_POLL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}
