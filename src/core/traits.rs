//! Capabilities the connection controller consumes from its collaborators.
//!
//! Transport dialing and packet (de)serialization are provided by the
//! embedding application; the controller only drives them.

use std::future::Future;

use serde_json::Value;

use super::error::{CodecError, DialError};
use super::packet::Header;

/// Transport flavours a dialer may try, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// HTTP long-polling request/response cycles.
    Polling,
    /// Persistent socket.
    WebSocket,
}

/// Writing half of a dialed connection.
pub trait PacketEncoder: Send + 'static {
    /// Serialize one packet onto the transport.
    ///
    /// For event packets the first argument is the event name.
    fn encode(
        &mut self,
        header: &Header,
        args: &[Value],
    ) -> impl Future<Output = Result<(), CodecError>> + Send;

    /// Release the transport. Pending reads on the paired decoder fail afterwards.
    fn close(&mut self) -> impl Future<Output = Result<(), CodecError>> + Send;
}

/// Reading half of a dialed connection.
pub trait PacketDecoder: Send + 'static {
    /// Decode the next packet header and, for events, the event name.
    fn decode_header(
        &mut self,
    ) -> impl Future<Output = Result<(Header, Option<String>), CodecError>> + Send;

    /// Decode the remaining arguments of the packet whose header was just read.
    fn decode_args(&mut self) -> impl Future<Output = Result<Vec<Value>, CodecError>> + Send;
}

/// Opens transports to a server.
pub trait Dialer: Send + Sync + 'static {
    /// Writing half produced by a successful dial.
    type Encoder: PacketEncoder;
    /// Reading half produced by a successful dial.
    type Decoder: PacketDecoder;

    /// Dial `url`, trying `transports` in order.
    fn dial(
        &self,
        url: &str,
        transports: &[TransportKind],
    ) -> impl Future<Output = Result<(Self::Encoder, Self::Decoder), DialError>> + Send;
}
