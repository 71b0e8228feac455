use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    CommandResult, RpcContract, RpcEscrow, RpcIdentity, RpcListing, RpcMilestoneInput,
    RpcNodeStatus, RpcProposal, RpcRangePage, RpcReputation, RpcWalletBalance,
    RpcWalletHistoryEntry,
};

/// The node's typed command/query surface (§6.1). Every command method
/// builds, signs (with the node's own keystore key), and submits one
/// envelope, auto-filling `issuer`/`nonce`/`prev` — see [`crate::server`].
/// All method names are namespaced under "claw" via `namespace = "claw"`.
#[rpc(server, namespace = "claw")]
pub trait NodeApi {
    // ── Identity (§4.8.1) ────────────────────────────────────────────────────

    /// Register this node's own DID on the log.
    #[method(name = "identityRegister")]
    async fn identity_register(&self) -> RpcResult<CommandResult>;

    /// Rotate this node's signing key to a freshly generated one stored
    /// under `newKeyId`, signed by the currently active key.
    #[method(name = "identityRotateKey")]
    async fn identity_rotate_key(&self, new_key_id: String, new_passphrase: String) -> RpcResult<CommandResult>;

    #[method(name = "identityRevoke")]
    async fn identity_revoke(&self) -> RpcResult<CommandResult>;

    #[method(name = "identityCapabilityAdd")]
    async fn identity_capability_add(&self, capability: String) -> RpcResult<CommandResult>;

    #[method(name = "identityPlatformLinkAdd")]
    async fn identity_platform_link_add(&self, platform: String) -> RpcResult<CommandResult>;

    #[method(name = "identityResolve")]
    async fn identity_resolve(&self, did: String) -> RpcResult<Option<RpcIdentity>>;

    // ── Wallet (§4.8.2) ──────────────────────────────────────────────────────

    #[method(name = "walletMint")]
    async fn wallet_mint(&self, to: String, amount: String) -> RpcResult<CommandResult>;

    #[method(name = "walletTransfer")]
    async fn wallet_transfer(
        &self,
        to: String,
        amount: String,
        fee: Option<String>,
        memo: Option<String>,
    ) -> RpcResult<CommandResult>;

    #[method(name = "walletBalance")]
    async fn wallet_balance(&self, address: String) -> RpcResult<RpcWalletBalance>;

    #[method(name = "walletHistory")]
    async fn wallet_history(&self, address: String, limit: u32) -> RpcResult<Vec<RpcWalletHistoryEntry>>;

    // ── Escrow (§4.8.3) ──────────────────────────────────────────────────────

    #[method(name = "escrowCreate")]
    #[allow(clippy::too_many_arguments)]
    async fn escrow_create(
        &self,
        id: String,
        beneficiary: String,
        arbiter: Option<String>,
        amount: String,
        release_rules: String,
        expires_at: Option<i64>,
    ) -> RpcResult<CommandResult>;

    #[method(name = "escrowFund")]
    async fn escrow_fund(&self, id: String, amount: String) -> RpcResult<CommandResult>;

    #[method(name = "escrowRelease")]
    async fn escrow_release(&self, id: String, amount: String) -> RpcResult<CommandResult>;

    #[method(name = "escrowRefund")]
    async fn escrow_refund(&self, id: String, amount: String) -> RpcResult<CommandResult>;

    #[method(name = "escrowExpire")]
    async fn escrow_expire(&self, id: String) -> RpcResult<CommandResult>;

    #[method(name = "escrowDispute")]
    async fn escrow_dispute(&self, id: String) -> RpcResult<CommandResult>;

    #[method(name = "escrowResolve")]
    async fn escrow_resolve(
        &self,
        id: String,
        release_to_beneficiary: String,
        refund_to_depositor: String,
    ) -> RpcResult<CommandResult>;

    #[method(name = "escrowGet")]
    async fn escrow_get(&self, id: String) -> RpcResult<Option<RpcEscrow>>;

    // ── Markets (§4.8.4) ─────────────────────────────────────────────────────

    #[method(name = "listingPublish")]
    async fn listing_publish(
        &self,
        id: String,
        kind: String,
        metadata: serde_json::Value,
        pricing: serde_json::Value,
        content_hash: Option<String>,
    ) -> RpcResult<CommandResult>;

    #[method(name = "listingRemove")]
    async fn listing_remove(&self, id: String) -> RpcResult<CommandResult>;

    #[method(name = "listingGet")]
    async fn listing_get(&self, id: String) -> RpcResult<Option<RpcListing>>;

    /// Covers both `market.list` and `market.search`: `status`/`kind` narrow
    /// by the listing's own fields, `query` substring-matches the listing's
    /// metadata blob.
    #[method(name = "listingList")]
    async fn listing_list(&self, status: Option<String>, kind: Option<String>, query: Option<String>) -> RpcResult<Vec<RpcListing>>;

    #[method(name = "bidSubmit")]
    async fn bid_submit(
        &self,
        id: String,
        listing_id: String,
        amount: String,
        buyer_ephemeral_public_key: Option<String>,
    ) -> RpcResult<CommandResult>;

    #[method(name = "bidAccept")]
    async fn bid_accept(
        &self,
        id: String,
        seller_ephemeral_public_key: Option<String>,
        encrypted_content_key: Option<String>,
    ) -> RpcResult<CommandResult>;

    #[method(name = "deliverySubmit")]
    async fn delivery_submit(&self, id: String, listing_id: String) -> RpcResult<CommandResult>;

    #[method(name = "deliveryReject")]
    async fn delivery_reject(&self, id: String) -> RpcResult<CommandResult>;

    #[method(name = "deliveryConfirm")]
    async fn delivery_confirm(&self, id: String) -> RpcResult<CommandResult>;

    // ── Service contracts (§4.8.5) ───────────────────────────────────────────

    #[method(name = "contractCreate")]
    #[allow(clippy::too_many_arguments)]
    async fn contract_create(
        &self,
        id: String,
        client: String,
        provider: String,
        arbiter: Option<String>,
        total_amount: String,
        milestones: Vec<RpcMilestoneInput>,
        deadline: Option<i64>,
    ) -> RpcResult<CommandResult>;

    #[method(name = "contractSign")]
    async fn contract_sign(&self, id: String) -> RpcResult<CommandResult>;

    #[method(name = "contractFund")]
    async fn contract_fund(&self, id: String) -> RpcResult<CommandResult>;

    #[method(name = "contractMilestoneSubmit")]
    async fn contract_milestone_submit(&self, id: String, milestone_id: String) -> RpcResult<CommandResult>;

    #[method(name = "contractMilestoneApprove")]
    async fn contract_milestone_approve(&self, id: String, milestone_id: String) -> RpcResult<CommandResult>;

    #[method(name = "contractMilestoneReject")]
    async fn contract_milestone_reject(&self, id: String, milestone_id: String) -> RpcResult<CommandResult>;

    #[method(name = "contractDispute")]
    async fn contract_dispute(&self, id: String) -> RpcResult<CommandResult>;

    #[method(name = "contractDisputeResolve")]
    async fn contract_dispute_resolve(
        &self,
        id: String,
        release_to_beneficiary: String,
        refund_to_depositor: String,
    ) -> RpcResult<CommandResult>;

    #[method(name = "contractCancel")]
    async fn contract_cancel(&self, id: String) -> RpcResult<CommandResult>;

    #[method(name = "contractTerminate")]
    async fn contract_terminate(&self, id: String) -> RpcResult<CommandResult>;

    #[method(name = "contractGet")]
    async fn contract_get(&self, id: String) -> RpcResult<Option<RpcContract>>;

    #[method(name = "contractList")]
    async fn contract_list(&self) -> RpcResult<Vec<RpcContract>>;

    // ── Reputation (§4.8.6) ──────────────────────────────────────────────────

    #[method(name = "reputationRecord")]
    async fn reputation_record(
        &self,
        subject: String,
        dimension: String,
        score: u8,
        reference: String,
        comment: Option<String>,
    ) -> RpcResult<CommandResult>;

    #[method(name = "reputationGet")]
    async fn reputation_get(&self, subject: String) -> RpcResult<Option<RpcReputation>>;

    // ── DAO (§4.8.7) ─────────────────────────────────────────────────────────

    #[method(name = "daoProposalCreate")]
    async fn dao_proposal_create(&self, id: String, kind: String, action: serde_json::Value) -> RpcResult<CommandResult>;

    #[method(name = "daoProposalAdvance")]
    async fn dao_proposal_advance(&self, id: String) -> RpcResult<CommandResult>;

    #[method(name = "daoVoteCast")]
    async fn dao_vote_cast(&self, id: String, support: bool) -> RpcResult<CommandResult>;

    #[method(name = "daoDelegateSet")]
    async fn dao_delegate_set(&self, to: String) -> RpcResult<CommandResult>;

    #[method(name = "daoDelegateRevoke")]
    async fn dao_delegate_revoke(&self) -> RpcResult<CommandResult>;

    #[method(name = "daoTreasuryDeposit")]
    async fn dao_treasury_deposit(&self, amount: String) -> RpcResult<CommandResult>;

    #[method(name = "daoTreasurySpend")]
    async fn dao_treasury_spend(&self, proposal_id: String, amount: String, to: String) -> RpcResult<CommandResult>;

    #[method(name = "daoProposalGet")]
    async fn dao_proposal_get(&self, id: String) -> RpcResult<Option<RpcProposal>>;

    #[method(name = "daoProposalList")]
    async fn dao_proposal_list(&self) -> RpcResult<Vec<RpcProposal>>;

    // ── Node / log ───────────────────────────────────────────────────────────

    #[method(name = "nodeStatus")]
    async fn node_status(&self) -> RpcResult<RpcNodeStatus>;

    #[method(name = "rangeFromCursor")]
    async fn range_from_cursor(&self, cursor: String, limit: u32) -> RpcResult<RpcRangePage>;
}
