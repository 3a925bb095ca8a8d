//! Core types shared by every layer: constants, packet headers, errors and
//! the collaborator traits the client drives.

pub mod constants;
mod error;
mod packet;
mod traits;

pub use error::*;
pub use packet::*;
pub use traits::*;
