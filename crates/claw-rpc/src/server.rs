//! The node-local RPC server (C11, §6.1). Grounded on
//! `chronx-rpc/src/server.rs`'s `RpcServerState`/`#[async_trait] impl
//! ...ApiServer for RpcServer` shape, generalized from a read-mostly query
//! surface over a shared `StateDb` to a node that also *issues* its own
//! commands: this node represents one agent's own identity, so every
//! command method builds, signs with the node's own keystore key, and
//! submits one envelope rather than accepting a pre-signed one from a
//! caller (see DESIGN.md's node-as-single-issuing-identity note).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::types::ErrorObject;
use serde_json::json;

use claw_core::error::ClawError;
use claw_core::identity::{address_from_public_key, did_from_public_key};
use claw_core::keystore::Keystore;
use claw_core::types::{Address, Cursor, Did, Timestamp};
use claw_core::Envelope;
use claw_reducers::state::{BidStatus, ContractState, DeliveryStatus, EscrowState, ListingStatus, MilestoneState, ProposalState};
use claw_validate::Pipeline;

use crate::api::NodeApiServer;
use crate::types::{
    CommandResult, RpcContract, RpcEscrow, RpcIdentity, RpcListing, RpcMilestone, RpcMilestoneInput,
    RpcNodeStatus, RpcProposal, RpcRangePage, RpcReputation, RpcReputationDimension, RpcWalletBalance,
    RpcWalletHistoryEntry,
};

fn claw_err(e: ClawError) -> ErrorObject<'static> {
    let code = match e.code() {
        "NotFound" => -32001,
        "Unauthorized" => -32002,
        "Duplicate" => -32003,
        "OutOfOrder" => -32004,
        "StaleResource" => -32005,
        "Conflict" => -32006,
        "RateLimited" => -32007,
        "Transient" => -32008,
        _ => -32602,
    };
    ErrorObject::owned(code, e.to_string(), Some(json!({ "code": e.code() })))
}

fn now_ms() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as Timestamp
}

struct NodeIdentity {
    key_id: String,
    passphrase: String,
    public_key: [u8; 32],
    did: Did,
    address: Address,
}

/// The node's own signing context plus the pipeline it drives.
pub struct RpcServer {
    pipeline: Arc<Pipeline>,
    keystore: Arc<Keystore>,
    identity: StdMutex<NodeIdentity>,
    peer_count: Arc<AtomicUsize>,
    /// This node's own dialable multiaddr, if the P2P layer exposed one, so
    /// another node can bootstrap off it without a separate discovery
    /// mechanism.
    peer_multiaddr: Option<String>,
    /// Gossip publish channel, so a command submitted through this surface
    /// reaches peers the same way a relayed event does (§2 dataflow).
    outbound_tx: tokio::sync::mpsc::Sender<claw_p2p::Outbound>,
    started_at: Timestamp,
}

impl RpcServer {
    pub fn new(
        pipeline: Arc<Pipeline>,
        keystore: Arc<Keystore>,
        key_id: String,
        passphrase: String,
        peer_count: Arc<AtomicUsize>,
        peer_multiaddr: Option<String>,
        outbound_tx: tokio::sync::mpsc::Sender<claw_p2p::Outbound>,
    ) -> Result<Self, ClawError> {
        let public_key = keystore
            .public_key(&key_id)
            .map_err(|e| ClawError::SigningKeyUnavailable(e.to_string()))?;
        let did = did_from_public_key(&public_key);
        let address = address_from_public_key(&public_key);
        Ok(Self {
            pipeline,
            keystore,
            identity: StdMutex::new(NodeIdentity { key_id, passphrase, public_key, did, address }),
            peer_count,
            peer_multiaddr,
            outbound_tx,
            started_at: now_ms(),
        })
    }

    fn did(&self) -> Did {
        self.identity.lock().expect("identity mutex poisoned").did.clone()
    }

    fn address(&self) -> Address {
        self.identity.lock().expect("identity mutex poisoned").address.clone()
    }

    /// Start the JSON-RPC server on `addr`. No CORS layer: the (out-of-scope)
    /// REST/browser-facing surface would add one in front of this; this
    /// transport is for other node processes and local tooling.
    pub async fn start(self, addr: std::net::SocketAddr) -> anyhow::Result<jsonrpsee::server::ServerHandle> {
        let server = jsonrpsee::server::Server::builder().build(addr).await?;
        let module = self.into_rpc();
        let handle = server.start(module);
        tracing::info!(%addr, "RPC server started");
        Ok(handle)
    }

    /// Build, sign, and submit one envelope for `kind`/`payload`, issued by
    /// this node's own identity. Nonce and `prev` are computed from the log
    /// immediately before signing, matching the committer's own expectations
    /// (§4.7 steps 3-4); a race against another writer to the same issuer
    /// surfaces as a `StaleResource`/`NonceConflict` on submit, same as any
    /// other caller.
    async fn submit(&self, kind: &str, payload: serde_json::Value) -> Result<CommandResult, ClawError> {
        let (key_id, passphrase, public_key, issuer) = {
            let identity = self.identity.lock().expect("identity mutex poisoned");
            (identity.key_id.clone(), identity.passphrase.clone(), identity.public_key, identity.did.clone())
        };
        let log = self.pipeline.log();
        let resource = claw_reducers::resource_of_parts(kind, &payload, &issuer);
        let prev = match &resource {
            Some(r) => log.resource_head(r)?,
            None => None,
        };
        let nonce = log.issuer_head(&issuer)? + 1;
        let keystore = Arc::clone(&self.keystore);

        let envelope = Envelope::build(kind, issuer, &public_key, nonce, prev, payload, now_ms(), |bytes| {
            // The node's own passphrase is fixed at startup; failure here is a
            // configuration bug, not a request-time error a caller can act on.
            keystore.sign(&key_id, &passphrase, bytes).expect("node signing key unavailable")
        })?;

        let hash = envelope.hash;
        let envelope_bytes = serde_json::to_vec(&envelope).map_err(|e| ClawError::Serialization(e.to_string()))?;
        let outcome = self.pipeline.submit(envelope, now_ms()).await?;
        let resulting_resource_id = resource.map(|r| r.index_key());
        // Gossip our own commit the same way a relayed event is rebroadcast,
        // so peers converge on it without having to pull it via range backfill.
        let _ = self.outbound_tx.send(claw_p2p::Outbound::PublishGossip(envelope_bytes)).await;
        match outcome {
            claw_validate::Outcome::Committed { hash, .. } => Ok(CommandResult { hash: hash.to_hex(), resulting_resource_id }),
            claw_validate::Outcome::Buffered { .. } => Ok(CommandResult { hash: hash.to_hex(), resulting_resource_id }),
        }
    }
}

fn escrow_state_str(s: EscrowState) -> &'static str {
    match s {
        EscrowState::Active => "active",
        EscrowState::Released => "released",
        EscrowState::Refunded => "refunded",
        EscrowState::Expired => "expired",
        EscrowState::Disputed => "disputed",
    }
}

fn listing_status_str(s: ListingStatus) -> &'static str {
    match s {
        ListingStatus::Active => "active",
        ListingStatus::Sold => "sold",
        ListingStatus::Withdrawn => "withdrawn",
    }
}

fn contract_state_str(s: ContractState) -> &'static str {
    match s {
        ContractState::Draft => "draft",
        ContractState::Signed => "signed",
        ContractState::Active => "active",
        ContractState::MilestoneInProgress => "milestoneInProgress",
        ContractState::Completed => "completed",
        ContractState::Disputed => "disputed",
        ContractState::Cancelled => "cancelled",
    }
}

fn milestone_state_str(s: MilestoneState) -> &'static str {
    match s {
        MilestoneState::Pending => "pending",
        MilestoneState::InProgress => "inProgress",
        MilestoneState::Approved => "approved",
    }
}

fn proposal_state_str(s: ProposalState) -> &'static str {
    match s {
        ProposalState::Discussion => "discussion",
        ProposalState::Voting => "voting",
        ProposalState::Passed => "passed",
        ProposalState::Rejected => "rejected",
        ProposalState::Queued => "queued",
        ProposalState::Executed => "executed",
    }
}

// Silences unused-import warnings on statuses consulted only via Debug/match
// completeness above, not read back out by any query method yet.
#[allow(dead_code)]
fn _unused_status_refs(_: BidStatus, _: DeliveryStatus) {}

#[async_trait]
impl NodeApiServer for RpcServer {
    async fn identity_register(&self) -> RpcResult<CommandResult> {
        self.submit("identity.register", json!({})).await.map_err(claw_err)
    }

    async fn identity_rotate_key(&self, new_key_id: String, new_passphrase: String) -> RpcResult<CommandResult> {
        let new_pub = self
            .keystore
            .create(&new_key_id, &new_passphrase)
            .map_err(|e| claw_err(ClawError::SigningKeyUnavailable(e.to_string())))?;
        let new_pub_multibase = format!("z{}", bs58::encode(new_pub).into_string());
        let message = json!({ "newPub": new_pub_multibase });
        let signing_bytes = claw_crypto::jcs::canonicalize(&message).map_err(|e| claw_err(ClawError::from(e)))?;
        let (key_id, passphrase) = {
            let identity = self.identity.lock().expect("identity mutex poisoned");
            (identity.key_id.clone(), identity.passphrase.clone())
        };
        let old_sig = self
            .keystore
            .sign(&key_id, &passphrase, &signing_bytes)
            .map_err(|e| claw_err(ClawError::SigningKeyUnavailable(e.to_string())))?;
        self.submit(
            "identity.rotateKey",
            json!({ "newPub": new_pub_multibase, "oldKeySig": hex::encode(old_sig) }),
        )
        .await
        .map_err(claw_err)
    }

    async fn identity_revoke(&self) -> RpcResult<CommandResult> {
        self.submit("identity.revoke", json!({})).await.map_err(claw_err)
    }

    async fn identity_capability_add(&self, capability: String) -> RpcResult<CommandResult> {
        self.submit("identity.capability.add", json!({ "capability": capability })).await.map_err(claw_err)
    }

    async fn identity_platform_link_add(&self, platform: String) -> RpcResult<CommandResult> {
        self.submit("identity.platformLink.add", json!({ "platform": platform })).await.map_err(claw_err)
    }

    async fn identity_resolve(&self, did: String) -> RpcResult<Option<RpcIdentity>> {
        let state = self.pipeline.state().await;
        Ok(state.identities.get(&Did(did)).map(|r| RpcIdentity {
            did: r.did.0.clone(),
            public_key: r.public_key.clone(),
            capabilities: r.capabilities.clone(),
            platform_links: r.platform_links.clone(),
            revoked: r.revoked,
        }))
    }

    async fn wallet_mint(&self, to: String, amount: String) -> RpcResult<CommandResult> {
        self.submit("wallet.mint", json!({ "to": to, "amount": amount })).await.map_err(claw_err)
    }

    async fn wallet_transfer(&self, to: String, amount: String, fee: Option<String>, memo: Option<String>) -> RpcResult<CommandResult> {
        let mut payload = json!({ "to": to, "amount": amount });
        if let Some(fee) = fee {
            payload["fee"] = json!(fee);
        }
        if let Some(memo) = memo {
            payload["memo"] = json!(memo);
        }
        self.submit("wallet.transfer", payload).await.map_err(claw_err)
    }

    async fn wallet_balance(&self, address: String) -> RpcResult<RpcWalletBalance> {
        let state = self.pipeline.state().await;
        let wallet = state.wallet(&Address(address));
        Ok(RpcWalletBalance { available: wallet.available.to_string(), locked: wallet.locked.to_string() })
    }

    /// Walks the `Wallet` resource chain rooted at `address` backward via
    /// `prev`. Because that chain is keyed by the *issuer* of each
    /// `wallet.*` event (§4.8.2), this surfaces events `address` itself
    /// issued (mints to itself, outgoing transfers) but not transfers it
    /// only received — there is no secondary by-recipient index in the log.
    async fn wallet_history(&self, address: String, limit: u32) -> RpcResult<Vec<RpcWalletHistoryEntry>> {
        let resource = claw_core::types::ResourceId::new(claw_core::types::ResourceKind::Wallet, address);
        let log = self.pipeline.log();
        let mut cursor = log.resource_head(&resource).map_err(claw_err)?;
        let mut out = Vec::new();
        while let Some(hash) = cursor {
            if out.len() >= limit as usize {
                break;
            }
            let bytes = log.get(&hash).map_err(claw_err)?;
            let Some(bytes) = bytes else { break };
            let envelope: Envelope = serde_json::from_slice(&bytes).map_err(|e| claw_err(ClawError::Serialization(e.to_string())))?;
            cursor = envelope.prev;
            out.push(RpcWalletHistoryEntry {
                hash: envelope.hash.to_hex(),
                kind: envelope.kind,
                nonce: envelope.nonce,
                ts: envelope.ts,
                payload: envelope.payload,
            });
        }
        Ok(out)
    }

    async fn escrow_create(
        &self,
        id: String,
        beneficiary: String,
        arbiter: Option<String>,
        amount: String,
        release_rules: String,
        expires_at: Option<i64>,
    ) -> RpcResult<CommandResult> {
        let mut payload = json!({
            "id": id,
            "depositor": self.address().0,
            "beneficiary": beneficiary,
            "amount": amount,
            "releaseRules": release_rules,
        });
        if let Some(arbiter) = arbiter {
            payload["arbiter"] = json!(arbiter);
        }
        if let Some(expires_at) = expires_at {
            payload["expiresAt"] = json!(expires_at);
        }
        self.submit("wallet.escrow.create", payload).await.map_err(claw_err)
    }

    async fn escrow_fund(&self, id: String, amount: String) -> RpcResult<CommandResult> {
        self.submit("wallet.escrow.fund", json!({ "id": id, "amount": amount })).await.map_err(claw_err)
    }

    async fn escrow_release(&self, id: String, amount: String) -> RpcResult<CommandResult> {
        self.submit("wallet.escrow.release", json!({ "id": id, "amount": amount })).await.map_err(claw_err)
    }

    async fn escrow_refund(&self, id: String, amount: String) -> RpcResult<CommandResult> {
        self.submit("wallet.escrow.refund", json!({ "id": id, "amount": amount })).await.map_err(claw_err)
    }

    async fn escrow_expire(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("wallet.escrow.expire", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn escrow_dispute(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("wallet.escrow.dispute", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn escrow_resolve(&self, id: String, release_to_beneficiary: String, refund_to_depositor: String) -> RpcResult<CommandResult> {
        self.submit(
            "wallet.escrow.resolve",
            json!({ "id": id, "releaseToBeneficiary": release_to_beneficiary, "refundToDepositor": refund_to_depositor }),
        )
        .await
        .map_err(claw_err)
    }

    async fn escrow_get(&self, id: String) -> RpcResult<Option<RpcEscrow>> {
        let state = self.pipeline.state().await;
        Ok(state.escrows.get(&id).map(|e| RpcEscrow {
            id: e.id.clone(),
            depositor: e.depositor.0.clone(),
            beneficiary: e.beneficiary.0.clone(),
            arbiter: e.arbiter.as_ref().map(|d| d.0.clone()),
            amount: e.amount.to_string(),
            released_to_beneficiary: e.released_to_beneficiary.to_string(),
            refunded_to_depositor: e.refunded_to_depositor.to_string(),
            state: escrow_state_str(e.state).to_string(),
            release_rules: e.release_rules.clone(),
            expires_at: e.expires_at,
        }))
    }

    async fn listing_publish(
        &self,
        id: String,
        kind: String,
        metadata: serde_json::Value,
        pricing: serde_json::Value,
        content_hash: Option<String>,
    ) -> RpcResult<CommandResult> {
        let mut payload = json!({ "id": id, "kind": kind, "seller": self.address().0, "metadata": metadata, "pricing": pricing });
        if let Some(content_hash) = content_hash {
            payload["contentHash"] = json!(content_hash);
        }
        self.submit("listing.publish", payload).await.map_err(claw_err)
    }

    async fn listing_remove(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("listing.remove", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn listing_get(&self, id: String) -> RpcResult<Option<RpcListing>> {
        let state = self.pipeline.state().await;
        Ok(state.listings.get(&id).map(listing_to_rpc))
    }

    async fn listing_list(&self, status: Option<String>, kind: Option<String>, query: Option<String>) -> RpcResult<Vec<RpcListing>> {
        let state = self.pipeline.state().await;
        Ok(state
            .listings
            .values()
            .filter(|l| status.as_deref().map(|s| listing_status_str(l.status) == s).unwrap_or(true))
            .filter(|l| kind.as_deref().map(|k| format!("{:?}", l.kind).eq_ignore_ascii_case(k)).unwrap_or(true))
            .filter(|l| query.as_deref().map(|q| l.metadata.to_string().to_lowercase().contains(&q.to_lowercase())).unwrap_or(true))
            .map(listing_to_rpc)
            .collect())
    }

    async fn bid_submit(
        &self,
        id: String,
        listing_id: String,
        amount: String,
        buyer_ephemeral_public_key: Option<String>,
    ) -> RpcResult<CommandResult> {
        let mut payload = json!({ "id": id, "listingId": listing_id, "amount": amount });
        if let Some(key) = buyer_ephemeral_public_key {
            payload["buyerEphemeralPublicKey"] = json!(key);
        }
        self.submit("bid.submit", payload).await.map_err(claw_err)
    }

    async fn bid_accept(
        &self,
        id: String,
        seller_ephemeral_public_key: Option<String>,
        encrypted_content_key: Option<String>,
    ) -> RpcResult<CommandResult> {
        let mut payload = json!({ "id": id });
        if let Some(key) = seller_ephemeral_public_key {
            payload["sellerEphemeralPublicKey"] = json!(key);
        }
        if let Some(key) = encrypted_content_key {
            payload["encryptedContentKey"] = json!(key);
        }
        self.submit("bid.accept", payload).await.map_err(claw_err)
    }

    async fn delivery_submit(&self, id: String, listing_id: String) -> RpcResult<CommandResult> {
        self.submit("delivery.submit", json!({ "id": id, "listingId": listing_id })).await.map_err(claw_err)
    }

    async fn delivery_reject(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("delivery.reject", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn delivery_confirm(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("delivery.confirm", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn contract_create(
        &self,
        id: String,
        client: String,
        provider: String,
        arbiter: Option<String>,
        total_amount: String,
        milestones: Vec<RpcMilestoneInput>,
        deadline: Option<i64>,
    ) -> RpcResult<CommandResult> {
        let mut payload = json!({
            "id": id,
            "client": client,
            "provider": provider,
            "totalAmount": total_amount,
            "milestones": milestones.into_iter().map(|m| json!({ "id": m.id, "amount": m.amount })).collect::<Vec<_>>(),
        });
        if let Some(arbiter) = arbiter {
            payload["arbiter"] = json!(arbiter);
        }
        if let Some(deadline) = deadline {
            payload["deadline"] = json!(deadline);
        }
        self.submit("contract.create", payload).await.map_err(claw_err)
    }

    async fn contract_sign(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("contract.sign", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn contract_fund(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("contract.fund", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn contract_milestone_submit(&self, id: String, milestone_id: String) -> RpcResult<CommandResult> {
        self.submit("contract.milestone.submit", json!({ "id": id, "milestoneId": milestone_id })).await.map_err(claw_err)
    }

    async fn contract_milestone_approve(&self, id: String, milestone_id: String) -> RpcResult<CommandResult> {
        self.submit("contract.milestone.approve", json!({ "id": id, "milestoneId": milestone_id })).await.map_err(claw_err)
    }

    async fn contract_milestone_reject(&self, id: String, milestone_id: String) -> RpcResult<CommandResult> {
        self.submit("contract.milestone.reject", json!({ "id": id, "milestoneId": milestone_id })).await.map_err(claw_err)
    }

    async fn contract_dispute(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("contract.dispute", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn contract_dispute_resolve(
        &self,
        id: String,
        release_to_beneficiary: String,
        refund_to_depositor: String,
    ) -> RpcResult<CommandResult> {
        self.submit(
            "contract.dispute.resolve",
            json!({ "id": id, "releaseToBeneficiary": release_to_beneficiary, "refundToDepositor": refund_to_depositor }),
        )
        .await
        .map_err(claw_err)
    }

    async fn contract_cancel(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("contract.cancel", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn contract_terminate(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("contract.terminate", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn contract_get(&self, id: String) -> RpcResult<Option<RpcContract>> {
        let state = self.pipeline.state().await;
        Ok(state.contracts.get(&id).map(contract_to_rpc))
    }

    async fn contract_list(&self) -> RpcResult<Vec<RpcContract>> {
        let state = self.pipeline.state().await;
        Ok(state.contracts.values().map(contract_to_rpc).collect())
    }

    async fn reputation_record(&self, subject: String, dimension: String, score: u8, reference: String, comment: Option<String>) -> RpcResult<CommandResult> {
        let mut payload = json!({ "subject": subject, "dimension": dimension, "score": score, "ref": reference });
        if let Some(comment) = comment {
            payload["comment"] = json!(comment);
        }
        self.submit("reputation.record", payload).await.map_err(claw_err)
    }

    async fn reputation_get(&self, subject: String) -> RpcResult<Option<RpcReputation>> {
        let state = self.pipeline.state().await;
        Ok(state.reputation.get(&Did(subject.clone())).map(|r| RpcReputation {
            subject,
            dimensions: r
                .dimensions
                .iter()
                .map(|(k, v)| (k.clone(), RpcReputationDimension { count: v.count, mean: v.mean }))
                .collect::<HashMap<_, _>>(),
        }))
    }

    async fn dao_proposal_create(&self, id: String, kind: String, action: serde_json::Value) -> RpcResult<CommandResult> {
        self.submit("dao.proposal.create", json!({ "id": id, "kind": kind, "action": action })).await.map_err(claw_err)
    }

    async fn dao_proposal_advance(&self, id: String) -> RpcResult<CommandResult> {
        self.submit("dao.proposal.advance", json!({ "id": id })).await.map_err(claw_err)
    }

    async fn dao_vote_cast(&self, id: String, support: bool) -> RpcResult<CommandResult> {
        self.submit("dao.vote.cast", json!({ "id": id, "support": support })).await.map_err(claw_err)
    }

    async fn dao_delegate_set(&self, to: String) -> RpcResult<CommandResult> {
        self.submit("dao.delegate.set", json!({ "to": to })).await.map_err(claw_err)
    }

    async fn dao_delegate_revoke(&self) -> RpcResult<CommandResult> {
        self.submit("dao.delegate.revoke", json!({})).await.map_err(claw_err)
    }

    async fn dao_treasury_deposit(&self, amount: String) -> RpcResult<CommandResult> {
        self.submit("dao.treasury.deposit", json!({ "amount": amount })).await.map_err(claw_err)
    }

    async fn dao_treasury_spend(&self, proposal_id: String, amount: String, to: String) -> RpcResult<CommandResult> {
        self.submit("dao.treasury.spend", json!({ "proposalId": proposal_id, "amount": amount, "to": to })).await.map_err(claw_err)
    }

    async fn dao_proposal_get(&self, id: String) -> RpcResult<Option<RpcProposal>> {
        let state = self.pipeline.state().await;
        Ok(state.dao.proposals.get(&id).map(proposal_to_rpc))
    }

    async fn dao_proposal_list(&self) -> RpcResult<Vec<RpcProposal>> {
        let state = self.pipeline.state().await;
        Ok(state.dao.proposals.values().map(proposal_to_rpc).collect())
    }

    async fn node_status(&self) -> RpcResult<RpcNodeStatus> {
        let log = self.pipeline.log();
        Ok(RpcNodeStatus {
            did: self.did().0,
            address: self.address().0,
            peer_multiaddr: self.peer_multiaddr.clone(),
            peers: self.peer_count.load(Ordering::Relaxed) as u32,
            cursor: Cursor(log.len()).to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: (now_ms() - self.started_at) / 1000,
        })
    }

    async fn range_from_cursor(&self, cursor: String, limit: u32) -> RpcResult<RpcRangePage> {
        let cursor = Cursor::from_str(&cursor).map_err(|e| claw_err(ClawError::SchemaViolation(e.to_string())))?;
        let log = self.pipeline.log();
        let (events, next_cursor) = log.range_from_cursor(cursor, limit as usize).map_err(claw_err)?;
        let done = events.len() < limit as usize;
        Ok(RpcRangePage {
            events: events.into_iter().map(|(_, bytes)| hex::encode(bytes)).collect(),
            next_cursor: next_cursor.to_string(),
            done,
        })
    }
}

fn listing_to_rpc(l: &claw_reducers::state::Listing) -> RpcListing {
    RpcListing {
        id: l.id.clone(),
        seller: l.seller.0.clone(),
        kind: format!("{:?}", l.kind).to_lowercase(),
        status: listing_status_str(l.status).to_string(),
        metadata: l.metadata.clone(),
        pricing: l.pricing.clone(),
        accepted_bid: l.accepted_bid.clone(),
        content_hash: l.content_hash.clone(),
        encrypted_content_key: l.encrypted_content_key.clone(),
        seller_ephemeral_public: l.seller_ephemeral_public.clone(),
    }
}

fn contract_to_rpc(c: &claw_reducers::state::Contract) -> RpcContract {
    RpcContract {
        id: c.id.clone(),
        client: c.client.0.clone(),
        provider: c.provider.0.clone(),
        arbiter: c.arbiter.as_ref().map(|d| d.0.clone()),
        total_amount: c.total_amount.to_string(),
        state: contract_state_str(c.state).to_string(),
        milestones: c
            .milestones
            .iter()
            .map(|m| RpcMilestone { id: m.id.clone(), amount: m.amount.to_string(), state: milestone_state_str(m.state).to_string() })
            .collect(),
        deadline: c.deadline,
    }
}

fn proposal_to_rpc(p: &claw_reducers::state::Proposal) -> RpcProposal {
    RpcProposal {
        id: p.id.clone(),
        kind: p.kind.clone(),
        proposer: p.proposer.0.clone(),
        state: proposal_state_str(p.state).to_string(),
        votes_for: p.votes_for,
        votes_against: p.votes_against,
        action: p.action.clone(),
    }
}
