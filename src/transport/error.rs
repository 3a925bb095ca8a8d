//! Transport layer error types.

use std::io;

use thiserror::Error;

/// Errors raised by the polling frame encoder and decoder.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The encoder's closed signal has fired (end of stream).
    #[error("end of stream")]
    Closed,

    /// A frame writer is already open and unclosed.
    ///
    /// Caller contract violation: frames must be opened one at a time.
    #[error("has a non-closed frame writer")]
    NonClosedFrame,

    /// The reserved separator byte was written into a text frame.
    #[error("should not write 0x1e to text frames")]
    SeparatorInTextFrame,

    /// No frame became ready before the keep-alive deadline.
    ///
    /// Not fatal: the caller should emit a keep-alive and drain again.
    #[error("ping timeout")]
    PingTimeout,

    /// A polling payload could not be split into valid frames.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// I/O error while writing drained frames.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Whether the error reports misuse by the caller rather than a
    /// transport condition. Encoder state is unchanged by these.
    pub fn is_caller_violation(&self) -> bool {
        matches!(
            self,
            FrameError::NonClosedFrame | FrameError::SeparatorInTextFrame
        )
    }

    /// Whether the error only asks the caller to send a keep-alive.
    pub fn is_ping_timeout(&self) -> bool {
        matches!(self, FrameError::PingTimeout)
    }
}

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(inner) => inner,
            FrameError::Closed => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            FrameError::SeparatorInTextFrame | FrameError::InvalidFrame(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            FrameError::NonClosedFrame => io::Error::new(io::ErrorKind::WouldBlock, err),
            FrameError::PingTimeout => io::Error::new(io::ErrorKind::TimedOut, err),
        }
    }
}
