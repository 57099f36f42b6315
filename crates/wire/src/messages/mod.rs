//! Typed payloads and topic constants for the authority protocol.

pub mod authority;
pub mod topics;

pub use authority::*;
