//! Client error types.

use thiserror::Error;

use crate::core::{CodecError, DialError, HandlerError};

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No server address was given.
    #[error("empty addr")]
    EmptyAddress,

    /// The server address could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] url::ParseError),

    /// Dialing the transport failed.
    #[error("dial failed: {0}")]
    Dial(#[from] DialError),

    /// Encoding or decoding a packet failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No connection is active.
    #[error("client not connected")]
    NotConnected,

    /// The namespace has not been joined on the active connection.
    #[error("namespace not joined: {0:?}")]
    UnknownNamespace(String),

    /// The server refused a namespace join.
    #[error("connect refused: {0}")]
    ConnectRefused(String),

    /// An acknowledgement arrived for an id nobody is waiting on.
    #[error("unknown ack id {0}")]
    UnknownAck(u64),

    /// A registered handler failed.
    #[error("handler failed: {0}")]
    Handler(HandlerError),

    /// Reconnection gave up after the configured number of attempts.
    #[error("reconnect failed: {attempts} attempts exhausted")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The client was shut down.
    #[error("client shut down")]
    Shutdown,
}

impl ClientError {
    /// Whether another connection attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Dial(_) | ClientError::Codec(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ClientError::Dial(DialError::Unreachable("down".into())).is_retryable());
        assert!(ClientError::Codec(CodecError::Closed).is_retryable());
        assert!(!ClientError::ReconnectExhausted { attempts: 3 }.is_retryable());
        assert!(!ClientError::Shutdown.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = ClientError::ReconnectExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "reconnect failed: 5 attempts exhausted");
        assert_eq!(ClientError::EmptyAddress.to_string(), "empty addr");
        assert_eq!(ClientError::UnknownAck(7).to_string(), "unknown ack id 7");
        assert_eq!(
            ClientError::ConnectRefused("not authorized".into()).to_string(),
            "connect refused: not authorized"
        );
        let handler = ClientError::Handler("boom".into());
        assert_eq!(handler.to_string(), "handler failed: boom");
        assert!(!handler.is_retryable());
    }
}
