//! Protocol constants.
//!
//! Framing bytes are fixed by the polling wire format and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// POLLING FRAMING
// =============================================================================

/// Record separator terminating every frame in a polling payload.
///
/// Reserved: it never appears inside a text frame.
pub const FRAME_SEPARATOR: u8 = 0x1e;

/// Marker byte opening a base64-transcoded binary frame.
pub const BINARY_FRAME_PREFIX: u8 = b'b';

/// Initial capacity of a polling encoder's frame buffer.
pub const DEFAULT_FRAME_BUFFER_CAPACITY: usize = 1024;

// =============================================================================
// TIMING
// =============================================================================

/// Keep-alive deadline for a polling drain (ping interval + ping timeout).
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(25);

/// First reconnection delay.
pub const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_secs(3);

/// Ceiling for reconnection delays.
pub const DEFAULT_RECONNECTION_DELAY_MAX: Duration = Duration::from_secs(10);

/// Growth multiplier between successive reconnection delays.
pub const DEFAULT_RECONNECTION_FACTOR: f64 = 2.0;

/// Jitter fraction applied to reconnection delays.
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

// =============================================================================
// NAMESPACES AND PATHS
// =============================================================================

/// Canonical name of the root namespace.
pub const ROOT_NAMESPACE: &str = "";

/// Wire alias of the root namespace.
pub const ROOT_NAMESPACE_ALIAS: &str = "/";

/// Request path prefix for the handshake endpoint.
pub const SOCKET_IO_PATH: &str = "/socket.io";

// =============================================================================
// QUEUES
// =============================================================================

/// Capacity of a connection's outgoing packet queue.
pub const DEFAULT_OUTGOING_CAPACITY: usize = 64;
