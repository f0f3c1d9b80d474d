//! Nodes request and response datagrams.
//!
//! Each datagram carries exactly one packet, so there is no framing beyond the
//! leading kind byte. All integers are big-endian.
//!
//! ```text
//! request:  kind(0x02) | sender key (32) | queried key (32) | request id (8)
//! response: kind(0x04) | sender key (32) | request id (8) | count (1) | node*
//! node:     family (4|6) | ip (4|16) | port (2) | key (32)
//! ```

use crate::key::{PublicKey, PUBLIC_KEY_SIZE};
use crate::node::{NodeAddress, NodeDiscovered};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Packet kind of a nodes request.
const NODES_REQUEST: u8 = 0x02;
/// Packet kind of a nodes response.
const NODES_RESPONSE: u8 = 0x04;
/// Address family marker for IPv4 nodes.
const FAMILY_IPV4: u8 = 4;
/// Address family marker for IPv6 nodes.
const FAMILY_IPV6: u8 = 6;
/// Size of an encoded nodes request.
pub const REQUEST_SIZE: usize = 1 + PUBLIC_KEY_SIZE + PUBLIC_KEY_SIZE + 8;
/// Most nodes a single response may carry.
pub const MAX_NODES_PER_RESPONSE: usize = 4;
/// Upper bound on the size of any packet, used to size receive buffers.
pub const MAX_PACKET_SIZE: usize =
    1 + PUBLIC_KEY_SIZE + 8 + 1 + MAX_NODES_PER_RESPONSE * (1 + 16 + 2 + PUBLIC_KEY_SIZE);

/// Errors that can occur while decoding a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The datagram was empty.
    Empty,
    /// The leading kind byte is not a known packet kind.
    UnknownKind(u8),
    /// The datagram ended before the packet was complete.
    Truncated,
    /// A response claimed more nodes than allowed.
    TooManyNodes(usize),
    /// A node entry had an unknown address family.
    UnknownFamily(u8),
    /// Bytes were left over after the packet.
    TrailingBytes(usize),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Empty => write!(f, "Empty datagram"),
            PacketError::UnknownKind(kind) => write!(f, "Unknown packet kind {kind:#04x}"),
            PacketError::Truncated => write!(f, "Datagram truncated"),
            PacketError::TooManyNodes(count) => write!(
                f,
                "Response carries {count} nodes, at most {MAX_NODES_PER_RESPONSE} allowed"
            ),
            PacketError::UnknownFamily(family) => {
                write!(f, "Unknown address family {family}")
            }
            PacketError::TrailingBytes(len) => {
                write!(f, "{len} unexpected bytes after packet")
            }
        }
    }
}

impl std::error::Error for PacketError {}

/// A packet of the nodes discovery protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Ask the receiver for the nodes it knows closest to `queried`.
    NodesRequest {
        sender: PublicKey,
        queried: PublicKey,
        request_id: u64,
    },
    /// Answer to a [`Packet::NodesRequest`] with the same `request_id`.
    NodesResponse {
        sender: PublicKey,
        request_id: u64,
        nodes: Vec<(PublicKey, SocketAddr)>,
    },
}

impl Packet {
    /// Serialize the packet into a datagram payload.
    ///
    /// Responses with more than [`MAX_NODES_PER_RESPONSE`] nodes are cut down
    /// to the first [`MAX_NODES_PER_RESPONSE`].
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::NodesRequest {
                sender,
                queried,
                request_id,
            } => {
                let mut buf = Vec::with_capacity(REQUEST_SIZE);
                buf.push(NODES_REQUEST);
                buf.extend_from_slice(sender.as_bytes());
                buf.extend_from_slice(queried.as_bytes());
                buf.extend_from_slice(&request_id.to_be_bytes());
                buf
            }
            Packet::NodesResponse {
                sender,
                request_id,
                nodes,
            } => {
                let nodes = &nodes[..nodes.len().min(MAX_NODES_PER_RESPONSE)];
                let mut buf = Vec::with_capacity(MAX_PACKET_SIZE);
                buf.push(NODES_RESPONSE);
                buf.extend_from_slice(sender.as_bytes());
                buf.extend_from_slice(&request_id.to_be_bytes());
                buf.push(nodes.len() as u8);
                for (key, addr) in nodes {
                    match addr.ip() {
                        IpAddr::V4(ip) => {
                            buf.push(FAMILY_IPV4);
                            buf.extend_from_slice(&ip.octets());
                        }
                        IpAddr::V6(ip) => {
                            buf.push(FAMILY_IPV6);
                            buf.extend_from_slice(&ip.octets());
                        }
                    }
                    buf.extend_from_slice(&addr.port().to_be_bytes());
                    buf.extend_from_slice(key.as_bytes());
                }
                buf
            }
        }
    }

    /// Deserialize a datagram payload.
    pub fn decode(datagram: &[u8]) -> Result<Self, PacketError> {
        let (&kind, body) = datagram.split_first().ok_or(PacketError::Empty)?;
        let mut reader = Reader::new(body);

        let packet = match kind {
            NODES_REQUEST => Packet::NodesRequest {
                sender: reader.public_key()?,
                queried: reader.public_key()?,
                request_id: reader.u64()?,
            },
            NODES_RESPONSE => {
                let sender = reader.public_key()?;
                let request_id = reader.u64()?;
                let count = reader.u8()? as usize;
                if count > MAX_NODES_PER_RESPONSE {
                    return Err(PacketError::TooManyNodes(count));
                }

                let mut nodes = Vec::with_capacity(count);
                for _ in 0..count {
                    let ip = match reader.u8()? {
                        FAMILY_IPV4 => IpAddr::V4(Ipv4Addr::from(reader.array::<4>()?)),
                        FAMILY_IPV6 => IpAddr::V6(Ipv6Addr::from(reader.array::<16>()?)),
                        family => return Err(PacketError::UnknownFamily(family)),
                    };
                    let port = u16::from_be_bytes(reader.array::<2>()?);
                    let key = reader.public_key()?;
                    nodes.push((key, SocketAddr::new(ip, port)));
                }

                Packet::NodesResponse {
                    sender,
                    request_id,
                    nodes,
                }
            }
            other => return Err(PacketError::UnknownKind(other)),
        };

        match reader.remaining() {
            0 => Ok(packet),
            extra => Err(PacketError::TrailingBytes(extra)),
        }
    }
}

/// Convert the nodes of a response into discovery events.
pub fn discoveries(nodes: Vec<(PublicKey, SocketAddr)>) -> impl Iterator<Item = NodeDiscovered> {
    nodes
        .into_iter()
        .map(|(public_key, addr)| NodeDiscovered {
            public_key,
            address: NodeAddress::from(addr),
        })
}

/// Cursor over a datagram body.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        if self.buf.len() < N {
            return Err(PacketError::Truncated);
        }
        let (head, tail) = self.buf.split_at(N);
        self.buf = tail;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.array::<1>()?[0])
    }

    fn u64(&mut self) -> Result<u64, PacketError> {
        Ok(u64::from_be_bytes(self.array::<8>()?))
    }

    fn public_key(&mut self) -> Result<PublicKey, PacketError> {
        Ok(PublicKey::new(self.array::<PUBLIC_KEY_SIZE>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PublicKey {
        PublicKey::new([byte; PUBLIC_KEY_SIZE])
    }

    #[test]
    fn test_request_layout() {
        let packet = Packet::NodesRequest {
            sender: key(1),
            queried: key(2),
            request_id: 0x0102030405060708,
        };
        let bytes = packet.encode();

        assert_eq!(bytes.len(), REQUEST_SIZE);
        assert_eq!(bytes[0], NODES_REQUEST);
        assert_eq!(&bytes[1..33], &[1u8; 32]);
        assert_eq!(&bytes[33..65], &[2u8; 32]);
        assert_eq!(&bytes[65..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(Packet::decode(&bytes), Ok(packet));
    }

    #[test]
    fn test_response_with_mixed_families() {
        let packet = Packet::NodesResponse {
            sender: key(9),
            request_id: 7,
            nodes: vec![
                (key(3), "10.0.0.1:33445".parse().unwrap()),
                (key(4), "[2001:db8::1]:33446".parse().unwrap()),
            ],
        };
        let bytes = packet.encode();
        assert_eq!(bytes.len(), 1 + 32 + 8 + 1 + (1 + 4 + 2 + 32) + (1 + 16 + 2 + 32));
        assert_eq!(Packet::decode(&bytes), Ok(packet));
    }

    #[test]
    fn test_response_capped_on_encode() {
        let nodes = (0..6)
            .map(|i| (key(i), SocketAddr::from(([10, 0, 0, i], 33445))))
            .collect::<Vec<_>>();
        let bytes = Packet::NodesResponse {
            sender: key(9),
            request_id: 1,
            nodes,
        }
        .encode();

        match Packet::decode(&bytes).unwrap() {
            Packet::NodesResponse { nodes, .. } => assert_eq!(nodes.len(), MAX_NODES_PER_RESPONSE),
            other => panic!("Expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::Empty));
        assert_eq!(Packet::decode(&[0x07, 1, 2]), Err(PacketError::UnknownKind(0x07)));

        let request = Packet::NodesRequest {
            sender: key(1),
            queried: key(2),
            request_id: 3,
        }
        .encode();
        assert_eq!(
            Packet::decode(&request[..request.len() - 1]),
            Err(PacketError::Truncated)
        );

        let mut padded = request.clone();
        padded.extend_from_slice(&[0, 0]);
        assert_eq!(Packet::decode(&padded), Err(PacketError::TrailingBytes(2)));
    }

    #[test]
    fn test_decode_rejects_bad_node_entries() {
        let mut header = vec![NODES_RESPONSE];
        header.extend_from_slice(&[5u8; 32]);
        header.extend_from_slice(&1u64.to_be_bytes());

        let mut too_many = header.clone();
        too_many.push(5);
        assert_eq!(Packet::decode(&too_many), Err(PacketError::TooManyNodes(5)));

        let mut bad_family = header.clone();
        bad_family.push(1);
        bad_family.push(9);
        assert_eq!(Packet::decode(&bad_family), Err(PacketError::UnknownFamily(9)));
    }

    #[test]
    fn test_discoveries() {
        let found = discoveries(vec![(key(3), "10.0.0.1:33445".parse().unwrap())])
            .collect::<Vec<_>>();
        assert_eq!(
            found,
            vec![NodeDiscovered {
                public_key: key(3),
                address: NodeAddress::new("10.0.0.1", 33445),
            }]
        );
    }
}
