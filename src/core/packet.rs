//! Packet header model exchanged with the codec.
//!
//! The wire encoding of these headers belongs to the codec; this module only
//! fixes the vocabulary the connection controller dispatches on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constants::{ROOT_NAMESPACE, ROOT_NAMESPACE_ALIAS};

/// Kind of a protocol packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    /// Namespace join request or confirmation.
    Connect,
    /// Namespace leave.
    Disconnect,
    /// Named event with arguments.
    Event,
    /// Acknowledgement of an event carrying an id.
    Ack,
    /// Server refused a namespace join.
    ConnectError,
}

/// Packet header decoded ahead of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Packet kind.
    pub packet_type: PacketType,
    /// Target namespace (root is `""`).
    #[serde(default)]
    pub namespace: String,
    /// Acknowledgement id, present when the sender expects an ack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl Header {
    /// Create a header for the given kind and namespace.
    pub fn new(packet_type: PacketType, namespace: impl Into<String>) -> Self {
        Self {
            packet_type,
            namespace: namespace.into(),
            id: None,
        }
    }

    /// Attach an acknowledgement id.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether the header addresses the root namespace.
    pub fn is_root(&self) -> bool {
        self.namespace == ROOT_NAMESPACE
    }
}

/// Header plus arguments queued for the write task.
///
/// For [`PacketType::Event`] the first argument is the event name.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Packet header.
    pub header: Header,
    /// Payload values.
    pub args: Vec<Value>,
}

impl Packet {
    /// Build an event packet.
    pub fn event(namespace: impl Into<String>, event: &str, args: Vec<Value>) -> Self {
        let mut payload = Vec::with_capacity(args.len() + 1);
        payload.push(Value::String(event.to_owned()));
        payload.extend(args);
        Self {
            header: Header::new(PacketType::Event, namespace),
            args: payload,
        }
    }

    /// Build an acknowledgement packet for `id`.
    pub fn ack(namespace: impl Into<String>, id: u64, args: Vec<Value>) -> Self {
        Self {
            header: Header::new(PacketType::Ack, namespace).with_id(id),
            args,
        }
    }

    /// Build a control packet without payload.
    pub fn control(packet_type: PacketType, namespace: impl Into<String>) -> Self {
        Self {
            header: Header::new(packet_type, namespace),
            args: Vec::new(),
        }
    }
}

/// Map the `"/"` alias onto the canonical root namespace.
pub fn normalize_namespace(namespace: &str) -> &str {
    if namespace == ROOT_NAMESPACE_ALIAS {
        ROOT_NAMESPACE
    } else {
        namespace
    }
}
