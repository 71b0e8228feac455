//! Param/result shapes for the typed command/query surface (§6.1). Grounded
//! on `chronx-rpc/src/types.rs`'s plain `Rpc*` struct convention — every
//! field a primitive or `String` so responses serialize the same whether a
//! caller reaches this crate in-process or through the (out-of-scope) REST
//! adapter.

use serde::{Deserialize, Serialize};

/// Returned by every command method (§6.1: `{hash, resultingResourceId?}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub hash: String,
    pub resulting_resource_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcWalletBalance {
    pub available: String,
    pub locked: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcWalletHistoryEntry {
    pub hash: String,
    pub kind: String,
    pub nonce: u64,
    pub ts: i64,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcIdentity {
    pub did: String,
    pub public_key: String,
    pub capabilities: Vec<String>,
    pub platform_links: Vec<String>,
    pub revoked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcEscrow {
    pub id: String,
    pub depositor: String,
    pub beneficiary: String,
    pub arbiter: Option<String>,
    pub amount: String,
    pub released_to_beneficiary: String,
    pub refunded_to_depositor: String,
    pub state: String,
    pub release_rules: String,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcListing {
    pub id: String,
    pub seller: String,
    pub kind: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub pricing: serde_json::Value,
    pub accepted_bid: Option<String>,
    pub content_hash: Option<String>,
    pub encrypted_content_key: Option<String>,
    pub seller_ephemeral_public: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcContract {
    pub id: String,
    pub client: String,
    pub provider: String,
    pub arbiter: Option<String>,
    pub total_amount: String,
    pub state: String,
    pub milestones: Vec<RpcMilestone>,
    pub deadline: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMilestone {
    pub id: String,
    pub amount: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReputation {
    pub subject: String,
    pub dimensions: std::collections::HashMap<String, RpcReputationDimension>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReputationDimension {
    pub count: u64,
    pub mean: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcProposal {
    pub id: String,
    pub kind: String,
    pub proposer: String,
    pub state: String,
    pub votes_for: f64,
    pub votes_against: f64,
    pub action: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNodeStatus {
    pub did: String,
    pub address: String,
    pub peer_multiaddr: Option<String>,
    pub peers: u32,
    pub cursor: String,
    pub version: String,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRangePage {
    pub events: Vec<String>,
    pub next_cursor: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMilestoneInput {
    pub id: String,
    pub amount: String,
}
