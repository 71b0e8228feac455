//! The node's typed command/query surface (C11, §6.1): a `jsonrpsee` trait
//! the out-of-scope REST adapter would sit in front of, and one
//! implementation, [`server::RpcServer`], that owns the node's own signing
//! identity and drives a [`claw_validate::Pipeline`].
//!
//! Grounded on `chronx-rpc`'s `api.rs`/`server.rs` split: an exhaustive,
//! thin-method trait on one side, a single state-holding struct implementing
//! it on the other.

pub mod api;
pub mod server;
pub mod types;

pub use api::NodeApiServer;
pub use server::RpcServer;
pub use types::*;
