//! The derived-state cache (§3 "Derived state", §9 ownership model): a plain
//! value type owned exclusively by this crate. `claw-validate` wraps one
//! `State` per top-level map in its own reader-writer discipline; this crate
//! never touches storage or concurrency itself.

use std::collections::HashMap;

use claw_core::types::{Address, Balance, Did, EventHash, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub did: Did,
    pub public_key: String,
    pub capabilities: Vec<String>,
    pub platform_links: Vec<String>,
    pub revoked: bool,
    pub last_event_hash: EventHash,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletAccount {
    pub available: Balance,
    pub locked: Balance,
    pub total_in: Balance,
    pub total_out: Balance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EscrowState {
    Active,
    Released,
    Refunded,
    Expired,
    Disputed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escrow {
    pub id: String,
    pub depositor: Address,
    pub beneficiary: Address,
    pub arbiter: Option<Did>,
    pub amount: Balance,
    pub released_to_beneficiary: Balance,
    pub refunded_to_depositor: Balance,
    pub state: EscrowState,
    pub release_rules: String,
    pub expires_at: Option<Timestamp>,
    pub last_event_hash: EventHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListingKind {
    Info,
    Task,
    Capability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListingStatus {
    Active,
    Sold,
    Withdrawn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub seller: Address,
    pub kind: ListingKind,
    pub metadata: serde_json::Value,
    pub pricing: serde_json::Value,
    pub status: ListingStatus,
    pub accepted_bid: Option<String>,
    /// sha256 of the off-chain content bytes, required for `Info` listings
    /// so a buyer can verify what they decrypt against what was advertised.
    pub content_hash: Option<String>,
    /// Hex X25519 ciphertext of the content's symmetric key, revealed to the
    /// buyer once their bid on an `Info` listing is accepted.
    pub encrypted_content_key: Option<String>,
    /// The seller's ephemeral X25519 public key used to derive the shared
    /// secret `encrypted_content_key` is sealed under.
    pub seller_ephemeral_public: Option<String>,
    pub last_event_hash: EventHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BidStatus {
    Open,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: String,
    pub listing_id: String,
    pub bidder: Address,
    pub amount: Balance,
    pub status: BidStatus,
    /// The buyer's ephemeral X25519 public key, required on a bid against an
    /// `Info` listing so the seller can seal the content key to it on accept.
    pub buyer_ephemeral_public: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryStatus {
    Submitted,
    Rejected,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub listing_id: String,
    pub bid_id: String,
    pub status: DeliveryStatus,
    pub escrow_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MilestoneState {
    Pending,
    InProgress,
    Approved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub amount: Balance,
    pub state: MilestoneState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContractState {
    Draft,
    Signed,
    Active,
    MilestoneInProgress,
    Completed,
    Disputed,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractSignatures {
    pub client: bool,
    pub provider: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub client: Address,
    pub provider: Address,
    pub arbiter: Option<Did>,
    pub total_amount: Balance,
    pub milestones: Vec<Milestone>,
    pub state: ContractState,
    pub signatures: ContractSignatures,
    pub escrow_id: Option<String>,
    pub deadline: Option<Timestamp>,
    pub last_event_hash: EventHash,
}

pub const REPUTATION_DIMENSIONS: [&str; 5] =
    ["quality", "fulfillment", "transaction", "behavior", "social"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionAggregate {
    pub count: u64,
    pub sum: u64,
    pub mean: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub subject: Option<Did>,
    pub dimensions: HashMap<String, DimensionAggregate>,
    pub seen_refs: std::collections::HashSet<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProposalState {
    Discussion,
    Voting,
    Passed,
    Rejected,
    Queued,
    Executed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub kind: String,
    pub proposer: Did,
    pub state: ProposalState,
    pub quorum_bps: u32,
    pub pass_threshold_bps: u32,
    pub votes_for: f64,
    pub votes_against: f64,
    pub voters: std::collections::HashSet<Did>,
    pub action: serde_json::Value,
    pub queued_at: Option<Timestamp>,
    pub timelock_delay_secs: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaoState {
    pub proposals: HashMap<String, Proposal>,
    pub delegations: HashMap<Did, Did>,
    pub treasury: Balance,
}

#[derive(Debug, Clone, Default)]
pub struct State {
    pub identities: HashMap<Did, IdentityRecord>,
    pub wallets: HashMap<Address, WalletAccount>,
    pub escrows: HashMap<String, Escrow>,
    pub listings: HashMap<String, Listing>,
    pub bids: HashMap<String, Bid>,
    pub deliveries: HashMap<String, Delivery>,
    pub contracts: HashMap<String, Contract>,
    pub reputation: HashMap<Did, ReputationRecord>,
    pub dao: DaoState,
    pub treasury: Balance,
}

impl State {
    pub fn wallet(&self, addr: &Address) -> WalletAccount {
        self.wallets.get(addr).cloned().unwrap_or_default()
    }

    pub fn wallet_mut(&mut self, addr: &Address) -> &mut WalletAccount {
        self.wallets.entry(addr.clone()).or_default()
    }
}
