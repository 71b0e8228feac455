//! Shared types, the event envelope, identity/addressing, configuration, and
//! the core error taxonomy for the claw protocol.

pub mod config;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod keystore;
pub mod types;

pub use envelope::Envelope;
pub use error::ClawError;
pub use types::{Address, Balance, Cursor, Did, EventHash, Nonce, ResourceId, ResourceKind, Timestamp};
