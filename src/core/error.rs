//! Error types shared by the transport collaborators.

use thiserror::Error;

#[cfg(feature = "transport")]
use crate::transport::FrameError;

/// Errors produced by a packet codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying transport has been closed.
    #[error("transport closed")]
    Closed,

    /// A packet could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Inbound bytes could not be parsed into a packet.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Frame-level failure on the polling transport.
    #[cfg(feature = "transport")]
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Whether the transport is unusable after this error.
    ///
    /// Serialization failures only affect the packet that caused them.
    pub fn is_fatal(&self) -> bool {
        match self {
            CodecError::Encode(_) => false,
            #[cfg(feature = "transport")]
            CodecError::Frame(err) => !err.is_caller_violation(),
            _ => true,
        }
    }
}

/// Errors produced while dialing a transport.
#[derive(Debug, Error)]
pub enum DialError {
    /// No configured transport could reach the server.
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// The transport opened but the handshake was rejected.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The transport preference list was empty.
    #[error("no transport configured")]
    NoTransport,

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error returned by user-registered handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
