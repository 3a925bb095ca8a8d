//! Polling transport framing.
//!
//! This module implements the outbound side of the long-polling transport:
//!
//! - **Frame encoding**: [`FrameEncoder`] hands out one [`FrameWriter`] at a
//!   time and drains finished frames to the HTTP response
//! - **Keep-alive deadline**: a drain that sees no frame before the ping
//!   timeout returns [`FrameError::PingTimeout`]
//! - **Payload decoding**: [`decode_payload`] splits a drained payload back
//!   into [`Frame`]s
//! - **Signals**: [`WakeCell`] (coalescing wakeup) and [`Shutdown`]
//!   (one-shot broadcast)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       Connection controller             │
//! ├─────────────────────────────────────────┤
//! │       Packet codec (external)           │
//! ├─────────────────────────────────────────┤
//! │       Polling framing                   │  ← This module
//! ├─────────────────────────────────────────┤
//! │       HTTP request/response             │
//! └─────────────────────────────────────────┘
//! ```

mod encoder;
mod error;
mod frame;
mod signal;

pub use encoder::{FrameEncoder, FrameWriter};
pub use error::FrameError;
pub use frame::{decode_payload, Frame, FrameType};
pub use signal::{Shutdown, WakeCell};
