//! DHT node identities.
//!
//! Every node on the DHT is identified by a fixed length public key. Keys are
//! exchanged as raw bytes on the wire and as hex strings in configuration.

use rand::RngCore;
use std::fmt;
use std::str::FromStr;

/// Size of a DHT node public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Errors that can occur when parsing a public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyError {
    /// The key is not valid hex.
    InvalidHex,
    /// The decoded key does not have the expected length.
    InvalidLength(usize),
}

impl fmt::Display for PublicKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicKeyError::InvalidHex => write!(f, "Public key is not a valid hex string"),
            PublicKeyError::InvalidLength(len) => write!(
                f,
                "Public key must be {PUBLIC_KEY_SIZE} bytes, got {len} bytes"
            ),
        }
    }
}

impl std::error::Error for PublicKeyError {}

/// The network identity of a DHT node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Create a key from its raw bytes.
    pub const fn new(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        PublicKey(bytes)
    }

    /// Generate a random key, used as the throwaway identity of a session.
    pub fn random() -> Self {
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        PublicKey(bytes)
    }

    /// Parse a key from a hex string.
    ///
    /// # Arguments
    ///
    /// * `hex_key` - Hex encoded key, either case.
    ///
    /// # Returns
    ///
    /// * `Ok(PublicKey)` - If the string decodes to exactly [`PUBLIC_KEY_SIZE`] bytes.
    /// * `Err(PublicKeyError)` - If the string is not hex or has the wrong length.
    pub fn from_hex(hex_key: &str) -> Result<Self, PublicKeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| PublicKeyError::InvalidHex)?;
        Self::try_from(bytes.as_slice())
    }

    /// Raw bytes of the key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = PublicKeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PublicKeyError::InvalidLength(bytes.len()))?;
        Ok(PublicKey(bytes))
    }
}

impl FromStr for PublicKey {
    type Err = PublicKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Keys are long, the prefix is enough to tell nodes apart in logs.
        write!(f, "PublicKey({}..)", &hex::encode_upper(&self.0[..4]))
    }
}
