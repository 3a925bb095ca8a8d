//! Socket client.
//!
//! Connection lifecycle, reconnection backoff and namespace handlers.

mod backoff;
#[allow(clippy::module_inception)]
mod client;
mod config;
mod connection;
mod error;
mod namespace;

#[cfg(test)]
pub(crate) mod test_utils;

pub use backoff::*;
pub use client::*;
pub use config::*;
pub use connection::{AckCallback, NamespaceConn};
pub use error::*;
pub use namespace::*;
