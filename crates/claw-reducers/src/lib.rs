//! Deterministic domain reducers (C8, §4.8): pure `apply`/`canApply`
//! functions mapping `(state, event) -> state'` for every event `type` the
//! protocol defines. Dispatch is by the dot-separated `type` prefix, mirroring
//! the event-domain-family grouping used throughout and in
//! `chronx-state/src/engine.rs`'s per-`Action`-variant `apply_action` match.

pub mod contracts;
pub mod dao;
pub mod escrow;
pub mod identity;
pub mod markets;
pub mod params;
pub mod payload;
pub mod reputation;
pub mod state;
pub mod wallet;

use claw_core::error::ClawError;
use claw_core::Envelope;

pub use params::ReducerParams;
pub use state::State;

fn domain_of(kind: &str) -> &str {
    kind.split('.').next().unwrap_or(kind)
}

/// `canApply(state, event) -> ok | error` (§4.8): dry-run every
/// precondition without mutating `state`.
pub fn can_apply(state: &State, env: &Envelope, params: &ReducerParams) -> Result<(), ClawError> {
    match domain_of(&env.kind) {
        "identity" => identity::can_apply(state, env),
        "wallet" => {
            if env.kind.starts_with("wallet.escrow.") {
                escrow::can_apply(state, env)
            } else {
                wallet::can_apply(state, env, params)
            }
        }
        "listing" | "bid" | "delivery" => markets::can_apply(state, env),
        "contract" => contracts::can_apply(state, env),
        "reputation" => reputation::can_apply(state, env),
        "dao" => dao::can_apply(state, env, params),
        other => Err(ClawError::SchemaViolation(format!("unknown event domain `{other}`"))),
    }
}

/// `apply(state, event) -> state'` (§4.8): `can_apply` is re-checked inside
/// each domain module immediately before mutation, so a caller that skips
/// the explicit `can_apply` pre-check still gets an atomic reject-or-commit.
pub fn apply(state: &mut State, env: &Envelope, params: &ReducerParams) -> Result<(), ClawError> {
    match domain_of(&env.kind) {
        "identity" => identity::apply(state, env),
        "wallet" => {
            if env.kind.starts_with("wallet.escrow.") {
                escrow::apply(state, env)
            } else {
                wallet::apply(state, env, params)
            }
        }
        "listing" | "bid" | "delivery" => markets::apply(state, env),
        "contract" => contracts::apply(state, env),
        "reputation" => reputation::apply(state, env),
        "dao" => dao::apply(state, env, params),
        other => Err(ClawError::SchemaViolation(format!("unknown event domain `{other}`"))),
    }
}

/// The resource a given event mutates, used by the validation pipeline to
/// look up `resourceHead` and to set `prev` on the next event for the same
/// resource (§4.7 step 4). Returns `None` for events with no resource chain
/// (e.g. `dao.vote.cast`, which is keyed by issuer+nonce alone).
pub fn resource_of(env: &Envelope) -> Option<claw_core::types::ResourceId> {
    resource_of_parts(&env.kind, &env.payload, &env.issuer)
}

/// Same as [`resource_of`] but over raw parts, for callers (e.g. the RPC
/// command surface) that need to know the target resource before an
/// envelope has been built — they must look up `resourceHead` to set `prev`
/// ahead of signing.
pub fn resource_of_parts(kind: &str, payload: &serde_json::Value, issuer: &claw_core::types::Did) -> Option<claw_core::types::ResourceId> {
    use claw_core::types::{ResourceId, ResourceKind};
    use serde_json::Value;

    let id_field = |f: &str| -> Option<String> {
        payload.get(f).and_then(Value::as_str).map(str::to_string)
    };

    match domain_of(kind) {
        "identity" => Some(ResourceId::new(ResourceKind::Identity, issuer.0.clone())),
        "wallet" if kind.starts_with("wallet.escrow.") => {
            id_field("id").map(|id| ResourceId::new(ResourceKind::Escrow, id))
        }
        "wallet" => Some(ResourceId::new(ResourceKind::Wallet, issuer.0.clone())),
        "listing" => id_field("id").map(|id| ResourceId::new(ResourceKind::Listing, id)),
        "bid" | "delivery" => id_field("id").map(|id| ResourceId::new(ResourceKind::Order, id)),
        "contract" => id_field("id").map(|id| ResourceId::new(ResourceKind::Contract, id)),
        "reputation" => id_field("subject").map(|s| ResourceId::new(ResourceKind::Reputation, s)),
        "dao" => id_field("id").map(|id| ResourceId::new(ResourceKind::DaoProposal, id)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_core::identity::{address_from_public_key, did_from_public_key};
    use claw_crypto::KeyPair;
    use serde_json::json;

    fn issuer() -> (KeyPair, claw_core::types::Did, claw_core::types::Address) {
        let kp = KeyPair::generate();
        let pk = kp.public_key_bytes();
        (kp, did_from_public_key(&pk), address_from_public_key(&pk))
    }

    fn envelope(kp: &KeyPair, did: &claw_core::types::Did, kind: &str, nonce: u64, payload: serde_json::Value) -> Envelope {
        let pk = kp.public_key_bytes();
        Envelope::build(kind, did.clone(), &pk, nonce, None, payload, 1_700_000_000_000, |b| kp.sign(b)).unwrap()
    }

    #[test]
    fn mint_then_transfer_conserves_balance() {
        let (kp, did, addr) = issuer();
        let (_, _, other_addr) = issuer();
        let mut state = State::default();
        let mut params = ReducerParams::default();
        params.mint_authorities.push(did.clone());

        let mint = envelope(&kp, &did, "wallet.mint", 1, json!({"to": addr.0, "amount": "1000"}));
        apply(&mut state, &mint, &params).unwrap();
        assert_eq!(state.wallet(&addr).available, 1000);

        let transfer = envelope(&kp, &did, "wallet.transfer", 2, json!({"to": other_addr.0, "amount": "300", "fee": "1"}));
        apply(&mut state, &transfer, &params).unwrap();
        assert_eq!(state.wallet(&addr).available, 699);
        assert_eq!(state.wallet(&other_addr).available, 300);
        assert_eq!(state.treasury, 1);
    }

    #[test]
    fn transfer_below_balance_plus_fee_is_rejected() {
        let (kp, did, addr) = issuer();
        let (_, _, other_addr) = issuer();
        let state = State::default();
        let params = ReducerParams::default();
        let transfer = envelope(&kp, &did, "wallet.transfer", 1, json!({"to": other_addr.0, "amount": "1", "fee": "1"}));
        let _ = addr;
        assert!(matches!(can_apply(&state, &transfer, &params), Err(ClawError::InsufficientBalance { .. })));
    }

    #[test]
    fn escrow_create_then_release_moves_locked_to_available() {
        let (kp, did, depositor) = issuer();
        let (_, _, beneficiary) = issuer();
        let mut state = State::default();
        let mut params = ReducerParams::default();
        params.mint_authorities.push(did.clone());
        let mint = envelope(&kp, &did, "wallet.mint", 1, json!({"to": depositor.0, "amount": "500"}));
        apply(&mut state, &mint, &params).unwrap();

        let create = envelope(&kp, &did, "wallet.escrow.create", 2, json!({
            "id": "esc1", "depositor": depositor.0, "beneficiary": beneficiary.0,
            "amount": "400", "releaseRules": "on-confirm",
        }));
        apply(&mut state, &create, &params).unwrap();
        assert_eq!(state.wallet(&depositor).available, 100);
        assert_eq!(state.wallet(&depositor).locked, 400);

        let release = envelope(&kp, &did, "wallet.escrow.release", 3, json!({"id": "esc1", "amount": "400"}));
        apply(&mut state, &release, &params).unwrap();
        assert_eq!(state.wallet(&depositor).locked, 0);
        assert_eq!(state.wallet(&beneficiary).available, 400);
        assert_eq!(state.escrows.get("esc1").unwrap().state as u8, crate::state::EscrowState::Released as u8);
    }

    #[test]
    fn contract_milestone_sum_mismatch_is_rejected() {
        let (kp, did, client) = issuer();
        let (_, _, provider) = issuer();
        let state = State::default();
        let params = ReducerParams::default();
        let create = envelope(&kp, &did, "contract.create", 1, json!({
            "id": "c1", "client": client.0, "provider": provider.0, "totalAmount": "100",
            "milestones": [{"id": "m1", "amount": "40"}, {"id": "m2", "amount": "40"}],
        }));
        assert!(matches!(
            can_apply(&state, &create, &params),
            Err(ClawError::MilestoneAmountsDoNotSumToTotal { expected: 100, got: 80 })
        ));
    }

    #[test]
    fn reputation_record_requires_distinct_issuer_and_subject() {
        let (kp, did, _) = issuer();
        let state = State::default();
        let params = ReducerParams::default();
        let record = envelope(&kp, &did, "reputation.record", 1, json!({
            "subject": did.0, "dimension": "quality", "score": 5, "ref": "contract:c1",
        }));
        assert!(matches!(can_apply(&state, &record, &params), Err(ClawError::SelfTransfer)));
    }

    #[test]
    fn duplicate_reputation_ref_dimension_is_rejected() {
        let (kp, did, _) = issuer();
        let (_, subject_did, _) = issuer();
        let mut state = State::default();
        let params = ReducerParams::default();
        let record = envelope(&kp, &did, "reputation.record", 1, json!({
            "subject": subject_did.0, "dimension": "quality", "score": 5, "ref": "contract:c1",
        }));
        apply(&mut state, &record, &params).unwrap();
        let dup = envelope(&kp, &did, "reputation.record", 2, json!({
            "subject": subject_did.0, "dimension": "quality", "score": 2, "ref": "contract:c1",
        }));
        assert!(matches!(can_apply(&state, &dup, &params), Err(ClawError::DuplicateReputationRecord)));
    }

    #[test]
    fn reputation_record_without_ref_is_accepted_and_never_dedups() {
        let (kp, did, _) = issuer();
        let (_, subject_did, _) = issuer();
        let mut state = State::default();
        let params = ReducerParams::default();
        let first = envelope(&kp, &did, "reputation.record", 1, json!({
            "subject": subject_did.0, "dimension": "quality", "score": 5,
        }));
        apply(&mut state, &first, &params).unwrap();
        let second = envelope(&kp, &did, "reputation.record", 2, json!({
            "subject": subject_did.0, "dimension": "quality", "score": 1,
        }));
        apply(&mut state, &second, &params).unwrap();
        let agg = state.reputation.get(&subject_did).unwrap().dimensions.get("quality").unwrap();
        assert_eq!(agg.count, 2);
    }

    #[test]
    fn contract_dispute_resolve_splits_escrow_between_parties() {
        let (client_kp, client_did, client_addr) = issuer();
        let (_, _, provider_addr) = issuer();
        let (arb_kp, arbiter_did, _) = issuer();
        let mut state = State::default();
        let mut params = ReducerParams::default();
        params.mint_authorities.push(client_did.clone());

        let mint = envelope(&client_kp, &client_did, "wallet.mint", 1, json!({"to": client_addr.0, "amount": "1000"}));
        apply(&mut state, &mint, &params).unwrap();

        let create = envelope(&client_kp, &client_did, "contract.create", 2, json!({
            "id": "c1", "client": client_addr.0, "provider": provider_addr.0, "arbiter": arbiter_did.0,
            "totalAmount": "1000", "milestones": [{"id": "m1", "amount": "1000"}],
        }));
        apply(&mut state, &create, &params).unwrap();

        let fund = envelope(&client_kp, &client_did, "contract.fund", 3, json!({"id": "c1"}));
        apply(&mut state, &fund, &params).unwrap();

        let dispute = envelope(&client_kp, &client_did, "contract.dispute", 4, json!({"id": "c1"}));
        apply(&mut state, &dispute, &params).unwrap();

        let resolve = envelope(&arb_kp, &arbiter_did, "contract.dispute.resolve", 1, json!({
            "id": "c1", "releaseToBeneficiary": "300", "refundToDepositor": "700",
        }));
        apply(&mut state, &resolve, &params).unwrap();

        assert_eq!(state.wallet(&provider_addr).available, 300);
        assert_eq!(state.wallet(&client_addr).locked, 0);
        assert_eq!(state.wallet(&client_addr).available, 700);
        let escrow_id = state.contracts.get("c1").unwrap().escrow_id.clone().unwrap();
        let escrow = state.escrows.get(&escrow_id).unwrap();
        assert_eq!(escrow.released_to_beneficiary, 300);
        assert_eq!(escrow.refunded_to_depositor, 700);
        assert_eq!(state.contracts.get("c1").unwrap().state as u8, crate::state::ContractState::Completed as u8);
    }

    #[test]
    fn info_listing_purchase_settles_immediately_and_reveals_content_key() {
        let (seller_kp, seller_did, seller_addr) = issuer();
        let (buyer_kp, buyer_did, buyer_addr) = issuer();
        let mut state = State::default();
        let mut params = ReducerParams::default();
        params.mint_authorities.push(buyer_did.clone());

        let mint = envelope(&buyer_kp, &buyer_did, "wallet.mint", 1, json!({"to": buyer_addr.0, "amount": "500"}));
        apply(&mut state, &mint, &params).unwrap();

        let publish = envelope(&seller_kp, &seller_did, "listing.publish", 1, json!({
            "id": "l1", "kind": "info", "seller": seller_addr.0,
            "contentHash": "11".repeat(32),
        }));
        apply(&mut state, &publish, &params).unwrap();

        let bid = envelope(&buyer_kp, &buyer_did, "bid.submit", 2, json!({
            "id": "b1", "listingId": "l1", "amount": "200",
            "buyerEphemeralPublicKey": "22".repeat(32),
        }));
        apply(&mut state, &bid, &params).unwrap();

        let accept = envelope(&seller_kp, &seller_did, "bid.accept", 2, json!({
            "id": "b1",
            "sellerEphemeralPublicKey": "33".repeat(32),
            "encryptedContentKey": "deadbeef",
        }));
        apply(&mut state, &accept, &params).unwrap();

        assert_eq!(state.wallet(&buyer_addr).available, 300);
        assert_eq!(state.wallet(&buyer_addr).locked, 0);
        assert_eq!(state.wallet(&seller_addr).available, 200);
        let listing = state.listings.get("l1").unwrap();
        assert_eq!(listing.encrypted_content_key.as_deref(), Some("deadbeef"));
        assert!(state.escrows.is_empty());
    }
}
