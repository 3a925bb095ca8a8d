//! # sockio
//!
//! Client side of an event-oriented socket protocol with namespaces,
//! acknowledgements and automatic reconnection.
//!
//! - **Framing**: the long-polling transport multiplexes many frames into
//!   one HTTP response; [`transport::FrameEncoder`] builds that payload
//! - **Lifecycle**: [`client::Client`] dials, runs read/write/error tasks per
//!   connection and reconnects with exponential backoff
//! - **Namespaces**: handler sets keyed by namespace name
//!
//! Transport dialing and packet serialization are supplied by the caller
//! through the [`core::Dialer`], [`core::PacketEncoder`] and
//! [`core::PacketDecoder`] traits.
//!
//! ## Feature Flags
//!
//! - `transport` (default): polling frame encoder and signals
//! - `client` (default): connection controller, backoff, namespaces
//!
//! ## Modules
//!
//! - [`core`]: Packet headers, constants, error types and collaborator traits (always included)
//! - [`transport`]: Polling framing (requires `transport` feature)
//! - [`client`]: Connection controller (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Duration;
//! use sockio::prelude::*;
//!
//! let config = ClientBuilder::new()
//!     .reconnection_delay(Duration::from_millis(500))
//!     .reconnection_attempts(MaxAttempts::Limited(5))
//!     .build();
//!
//! let mut backoff = config.backoff();
//! assert!(backoff.next_delay() <= Duration::from_secs(10));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    #[cfg(feature = "transport")]
    pub use crate::transport::{decode_payload, Frame, FrameEncoder, FrameError, FrameType, FrameWriter};

    #[cfg(feature = "client")]
    pub use crate::client::{
        BackoffPolicy, Client, ClientBuilder, ClientConfig, ClientError, ConnectionState,
        MaxAttempts, NamespaceConn, NamespaceHandler, NamespaceRegistry,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{CodecError, DialError, Header, Packet, PacketType};

#[cfg(feature = "transport")]
pub use crate::transport::{FrameEncoder, FrameError, FrameType, FrameWriter};

#[cfg(feature = "client")]
pub use crate::client::{Client, ClientConfig, ClientError, ConnectionState};
