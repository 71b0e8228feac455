//! Escrow reducer (§4.8.3). Grounded on `chronx-core/src/account.rs`'s
//! `TimeLockStatus` state machine shape, generalized from a unilateral
//! claim/cancel lifecycle to depositor/beneficiary/arbiter-gated release,
//! refund, dispute, and resolve transitions.

use claw_core::error::ClawError;
use claw_core::identity::address_from_did;
use claw_core::types::{Address, Did};
use claw_core::Envelope;

use crate::payload::{get_str, get_str_opt, parse_amount};
use crate::state::{Escrow, EscrowState, State};

fn issuer_address(env: &Envelope) -> Result<Address, ClawError> {
    address_from_did(&env.issuer).map_err(|e| ClawError::Identity(e.to_string()))
}

fn require_escrow<'a>(state: &'a State, id: &str) -> Result<&'a Escrow, ClawError> {
    state
        .escrows
        .get(id)
        .ok_or_else(|| ClawError::NotFound { kind: "escrow".into(), id: id.into() })
}

fn is_terminal(s: EscrowState) -> bool {
    matches!(s, EscrowState::Released | EscrowState::Refunded | EscrowState::Expired)
}

pub fn can_apply(state: &State, env: &Envelope) -> Result<(), ClawError> {
    match env.kind.as_str() {
        "wallet.escrow.create" => {
            let id = get_str(&env.payload, "id")?;
            if state.escrows.contains_key(id) {
                return Err(ClawError::DuplicateCreate(id.into()));
            }
            let depositor = issuer_address(env)?;
            let stated_depositor = Address(get_str(&env.payload, "depositor")?.to_string());
            if depositor != stated_depositor {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: id.into() });
            }
            let amount = parse_amount(crate::payload::get_field(&env.payload, "amount")?, "amount")?;
            if amount == 0 {
                return Err(ClawError::ZeroAmount);
            }
            let rules = get_str(&env.payload, "releaseRules")?;
            if rules.is_empty() {
                return Err(ClawError::SchemaViolation("releaseRules must be non-empty".into()));
            }
            let wallet = state.wallet(&depositor);
            if wallet.available < amount {
                return Err(ClawError::InsufficientBalance { need: amount, have: wallet.available });
            }
            Ok(())
        }
        "wallet.escrow.fund" => {
            let escrow = require_escrow(state, get_str(&env.payload, "id")?)?;
            let depositor = issuer_address(env)?;
            if escrow.depositor != depositor {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: escrow.id.clone() });
            }
            if is_terminal(escrow.state) {
                return Err(ClawError::AlreadyTerminal(escrow.id.clone()));
            }
            let amount = parse_amount(crate::payload::get_field(&env.payload, "amount")?, "amount")?;
            let wallet = state.wallet(&depositor);
            if wallet.available < amount {
                return Err(ClawError::InsufficientBalance { need: amount, have: wallet.available });
            }
            Ok(())
        }
        "wallet.escrow.release" | "wallet.escrow.refund" => {
            let escrow = require_escrow(state, get_str(&env.payload, "id")?)?;
            let issuer_addr = issuer_address(env)?;
            let authorized = issuer_addr == escrow.depositor
                || escrow.arbiter.as_ref() == Some(&env.issuer);
            if !authorized {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: escrow.id.clone() });
            }
            if !matches!(escrow.state, EscrowState::Active) {
                return Err(ClawError::AlreadyTerminal(escrow.id.clone()));
            }
            let amount = parse_amount(crate::payload::get_field(&env.payload, "amount")?, "amount")?;
            let remaining = escrow.amount - escrow.released_to_beneficiary - escrow.refunded_to_depositor;
            if amount > remaining {
                return Err(ClawError::EscrowOverrelease(escrow.id.clone()));
            }
            Ok(())
        }
        "wallet.escrow.expire" => {
            let escrow = require_escrow(state, get_str(&env.payload, "id")?)?;
            if !matches!(escrow.state, EscrowState::Active) {
                return Err(ClawError::AlreadyTerminal(escrow.id.clone()));
            }
            match escrow.expires_at {
                Some(exp) if env.ts >= exp => Ok(()),
                Some(_) => Err(ClawError::InvalidTransition { from: "Active".into(), event: env.kind.clone() }),
                None => Err(ClawError::SchemaViolation("escrow has no expiresAt".into())),
            }
        }
        "wallet.escrow.dispute" => {
            let escrow = require_escrow(state, get_str(&env.payload, "id")?)?;
            let issuer_addr = issuer_address(env)?;
            let party = issuer_addr == escrow.depositor || issuer_addr == escrow.beneficiary;
            if !party {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: escrow.id.clone() });
            }
            if !matches!(escrow.state, EscrowState::Active) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", escrow.state), event: env.kind.clone() });
            }
            Ok(())
        }
        "wallet.escrow.resolve" => {
            let escrow = require_escrow(state, get_str(&env.payload, "id")?)?;
            if escrow.arbiter.as_ref() != Some(&env.issuer) {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: escrow.id.clone() });
            }
            if !matches!(escrow.state, EscrowState::Disputed) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", escrow.state), event: env.kind.clone() });
            }
            let released = parse_amount(crate::payload::get_field(&env.payload, "releaseToBeneficiary")?, "releaseToBeneficiary")?;
            let refunded = parse_amount(crate::payload::get_field(&env.payload, "refundToDepositor")?, "refundToDepositor")?;
            let remaining = escrow.amount - escrow.released_to_beneficiary - escrow.refunded_to_depositor;
            if released + refunded != remaining {
                return Err(ClawError::SchemaViolation(
                    "resolution must allocate exactly the remaining escrow amount".into(),
                ));
            }
            Ok(())
        }
        other => Err(ClawError::SchemaViolation(format!("unknown escrow event `{other}`"))),
    }
}

pub fn apply(state: &mut State, env: &Envelope) -> Result<(), ClawError> {
    can_apply(state, env)?;
    match env.kind.as_str() {
        "wallet.escrow.create" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let depositor = issuer_address(env)?;
            let beneficiary = Address(get_str(&env.payload, "beneficiary")?.to_string());
            let arbiter = get_str_opt(&env.payload, "arbiter").map(|s| Did(s.to_string()));
            let amount = parse_amount(crate::payload::get_field(&env.payload, "amount")?, "amount")?;
            let rules = get_str(&env.payload, "releaseRules")?.to_string();
            let expires_at = env.payload.get("expiresAt").and_then(|v| v.as_i64());

            state.wallet_mut(&depositor).available -= amount;
            state.wallet_mut(&depositor).locked += amount;
            state.escrows.insert(
                id.clone(),
                Escrow {
                    id,
                    depositor,
                    beneficiary,
                    arbiter,
                    amount,
                    released_to_beneficiary: 0,
                    refunded_to_depositor: 0,
                    state: EscrowState::Active,
                    release_rules: rules,
                    expires_at,
                    last_event_hash: env.hash,
                },
            );
        }
        "wallet.escrow.fund" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let amount = parse_amount(crate::payload::get_field(&env.payload, "amount")?, "amount")?;
            let depositor = state.escrows.get(&id).unwrap().depositor.clone();
            state.wallet_mut(&depositor).available -= amount;
            state.wallet_mut(&depositor).locked += amount;
            let escrow = state.escrows.get_mut(&id).unwrap();
            escrow.amount += amount;
            escrow.last_event_hash = env.hash;
        }
        "wallet.escrow.release" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let amount = parse_amount(crate::payload::get_field(&env.payload, "amount")?, "amount")?;
            let (depositor, beneficiary) = {
                let e = state.escrows.get(&id).unwrap();
                (e.depositor.clone(), e.beneficiary.clone())
            };
            state.wallet_mut(&depositor).locked -= amount;
            state.wallet_mut(&beneficiary).available += amount;
            state.wallet_mut(&beneficiary).total_in += amount;
            let escrow = state.escrows.get_mut(&id).unwrap();
            escrow.released_to_beneficiary += amount;
            if escrow.released_to_beneficiary + escrow.refunded_to_depositor == escrow.amount {
                escrow.state = EscrowState::Released;
            }
            escrow.last_event_hash = env.hash;
        }
        "wallet.escrow.refund" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let amount = parse_amount(crate::payload::get_field(&env.payload, "amount")?, "amount")?;
            let depositor = state.escrows.get(&id).unwrap().depositor.clone();
            state.wallet_mut(&depositor).locked -= amount;
            state.wallet_mut(&depositor).available += amount;
            let escrow = state.escrows.get_mut(&id).unwrap();
            escrow.refunded_to_depositor += amount;
            if escrow.released_to_beneficiary + escrow.refunded_to_depositor == escrow.amount {
                escrow.state = EscrowState::Refunded;
            }
            escrow.last_event_hash = env.hash;
        }
        "wallet.escrow.expire" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let (depositor, remaining) = {
                let e = state.escrows.get(&id).unwrap();
                (e.depositor.clone(), e.amount - e.released_to_beneficiary - e.refunded_to_depositor)
            };
            state.wallet_mut(&depositor).locked -= remaining;
            state.wallet_mut(&depositor).available += remaining;
            let escrow = state.escrows.get_mut(&id).unwrap();
            escrow.refunded_to_depositor += remaining;
            escrow.state = EscrowState::Expired;
            escrow.last_event_hash = env.hash;
        }
        "wallet.escrow.dispute" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let escrow = state.escrows.get_mut(&id).unwrap();
            escrow.state = EscrowState::Disputed;
            escrow.last_event_hash = env.hash;
        }
        "wallet.escrow.resolve" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let released = parse_amount(crate::payload::get_field(&env.payload, "releaseToBeneficiary")?, "releaseToBeneficiary")?;
            let refunded = parse_amount(crate::payload::get_field(&env.payload, "refundToDepositor")?, "refundToDepositor")?;
            let (depositor, beneficiary) = {
                let e = state.escrows.get(&id).unwrap();
                (e.depositor.clone(), e.beneficiary.clone())
            };
            if released > 0 {
                state.wallet_mut(&depositor).locked -= released;
                state.wallet_mut(&beneficiary).available += released;
                state.wallet_mut(&beneficiary).total_in += released;
            }
            if refunded > 0 {
                state.wallet_mut(&depositor).locked -= refunded;
                state.wallet_mut(&depositor).available += refunded;
            }
            let escrow = state.escrows.get_mut(&id).unwrap();
            escrow.released_to_beneficiary += released;
            escrow.refunded_to_depositor += refunded;
            escrow.state = if escrow.refunded_to_depositor == escrow.amount {
                EscrowState::Refunded
            } else {
                EscrowState::Released
            };
            escrow.last_event_hash = env.hash;
        }
        _ => unreachable!("validated above"),
    }
    Ok(())
}
