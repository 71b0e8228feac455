//! Wallet reducer (§4.8.2). Grounded on `chronx-state/src/engine.rs`'s
//! balance-check-then-debit-then-credit shape for `Action::Transfer`.

use claw_core::constants::MIN_FEE;
use claw_core::error::ClawError;
use claw_core::identity::address_from_did;
use claw_core::types::Address;
use claw_core::Envelope;

use crate::params::ReducerParams;
use crate::payload::{get_str, parse_amount};
use crate::state::State;

fn issuer_address(env: &Envelope) -> Result<Address, ClawError> {
    address_from_did(&env.issuer).map_err(|e| ClawError::Identity(e.to_string()))
}

pub fn can_apply(state: &State, env: &Envelope, params: &ReducerParams) -> Result<(), ClawError> {
    match env.kind.as_str() {
        "wallet.mint" => {
            if !params.can_mint(&env.issuer) {
                return Err(ClawError::Unauthorized {
                    issuer: env.issuer.0.clone(),
                    resource: "wallet.mint".into(),
                });
            }
            let amount = parse_amount(get_field(env, "amount")?, "amount")?;
            if amount == 0 {
                return Err(ClawError::ZeroAmount);
            }
            Ok(())
        }
        "wallet.transfer" => {
            let from = issuer_address(env)?;
            let to = Address(get_str(&env.payload, "to")?.to_string());
            if from == to {
                return Err(ClawError::SelfTransfer);
            }
            let amount = parse_amount(get_field(env, "amount")?, "amount")?;
            let fee = match env.payload.get("fee") {
                Some(v) => parse_amount(v, "fee")?,
                None => MIN_FEE,
            };
            if amount == 0 {
                return Err(ClawError::ZeroAmount);
            }
            if fee < MIN_FEE {
                return Err(ClawError::SchemaViolation(format!("fee below minimum {MIN_FEE}")));
            }
            let wallet = state.wallet(&from);
            let need = amount + fee;
            if wallet.available < need {
                return Err(ClawError::InsufficientBalance { need, have: wallet.available });
            }
            Ok(())
        }
        other => Err(ClawError::SchemaViolation(format!("unknown wallet event `{other}`"))),
    }
}

pub fn apply(state: &mut State, env: &Envelope, params: &ReducerParams) -> Result<(), ClawError> {
    can_apply(state, env, params)?;
    match env.kind.as_str() {
        "wallet.mint" => {
            let to = Address(get_str(&env.payload, "to")?.to_string());
            let amount = parse_amount(get_field(env, "amount")?, "amount")?;
            let w = state.wallet_mut(&to);
            w.available += amount;
            w.total_in += amount;
        }
        "wallet.transfer" => {
            let from = issuer_address(env)?;
            let to = Address(get_str(&env.payload, "to")?.to_string());
            let amount = parse_amount(get_field(env, "amount")?, "amount")?;
            let fee = match env.payload.get("fee") {
                Some(v) => parse_amount(v, "fee")?,
                None => MIN_FEE,
            };
            {
                let sender = state.wallet_mut(&from);
                sender.available -= amount + fee;
                sender.total_out += amount + fee;
            }
            {
                let recipient = state.wallet_mut(&to);
                recipient.available += amount;
                recipient.total_in += amount;
            }
            state.treasury += fee;
        }
        _ => unreachable!("validated above"),
    }
    Ok(())
}

fn get_field<'a>(env: &'a Envelope, field: &str) -> Result<&'a serde_json::Value, ClawError> {
    crate::payload::get_field(&env.payload, field)
}
