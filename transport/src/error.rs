//! Error types for transport sessions.

use std::error::Error;
use std::fmt;
use std::io;

/// Errors that can occur while opening or using a transport session.
#[derive(Debug)]
pub enum TransportError {
    /// An I/O error occurred during network operations.
    Io(io::Error),
    /// A hostname could not be resolved to any socket address.
    Unresolved(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(err) => write!(f, "Transport I/O error: {err}"),
            TransportError::Unresolved(host) => write!(f, "Could not resolve host {host}"),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::Io(err) => Some(err),
            TransportError::Unresolved(_) => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_sources() {
        let err = TransportError::from(io::Error::other("socket closed"));
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "Transport I/O error: socket closed");

        let err = TransportError::Unresolved("invalid.invalid".to_string());
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "Could not resolve host invalid.invalid");
    }
}
