//! Minimal DAO reducer (§4.8.7). Grounded on `chronx-consensus`'s validator
//! 2/3-threshold voting pattern (`chronx-consensus/src/validator.rs`),
//! generalized to per-proposal-type configurable quorum/pass thresholds and a
//! single-level delegation graph instead of a fixed validator set.

use claw_core::error::ClawError;
use claw_core::identity::address_from_did;
use claw_core::types::{Address, Balance, Did};
use claw_core::Envelope;

use crate::params::ReducerParams;
use crate::payload::{get_field, get_str, parse_amount};
use crate::state::{Proposal, ProposalState, State};

fn issuer_address(env: &Envelope) -> Result<Address, ClawError> {
    address_from_did(&env.issuer).map_err(|e| ClawError::Identity(e.to_string()))
}

fn require<'a>(state: &'a State, id: &str) -> Result<&'a Proposal, ClawError> {
    state.dao.proposals.get(id).ok_or_else(|| ClawError::NotFound { kind: "proposal".into(), id: id.into() })
}

/// `sqrt(tokens) × reputationMultiplier`, excluding any power the issuer has
/// delegated away. `tokens` is the issuer's total wallet balance
/// (available+locked); the multiplier centers at 1.0 for a participant with
/// no reputation history and scales with their mean score across dimensions.
fn base_voting_power(state: &State, did: &Did) -> f64 {
    let addr = match address_from_did(did) {
        Ok(a) => a,
        Err(_) => return 0.0,
    };
    let wallet = state.wallet(&addr);
    let tokens = (wallet.available + wallet.locked) as f64;
    let multiplier = reputation_multiplier(state, did);
    tokens.sqrt() * multiplier
}

fn reputation_multiplier(state: &State, did: &Did) -> f64 {
    match state.reputation.get(did) {
        None => 1.0,
        Some(record) if record.dimensions.is_empty() => 1.0,
        Some(record) => {
            let overall: f64 = record.dimensions.values().map(|d| d.mean).sum::<f64>() / record.dimensions.len() as f64;
            0.5 + overall / 5.0
        }
    }
}

/// Total voting power: own base power (zero if delegated away) plus the
/// base power of everyone who delegated to `did`.
fn voting_power(state: &State, did: &Did) -> f64 {
    let delegated: f64 = state
        .dao
        .delegations
        .iter()
        .filter(|(_, to)| *to == did)
        .map(|(from, _)| base_voting_power(state, from))
        .sum();
    let own = if state.dao.delegations.contains_key(did) { 0.0 } else { base_voting_power(state, did) };
    own + delegated
}

fn total_voting_supply(state: &State) -> f64 {
    // Every address with a wallet is a potential voter; delegated power is
    // already folded into the delegate's total, so summing every address's
    // *own* base power once gives the denominator for quorum.
    state.wallets.keys().map(|addr| {
        let wallet = state.wallet(addr);
        ((wallet.available + wallet.locked) as f64).sqrt()
    }).sum()
}

pub fn can_apply(state: &State, env: &Envelope, params: &ReducerParams) -> Result<(), ClawError> {
    match env.kind.as_str() {
        "dao.proposal.create" => {
            let id = get_str(&env.payload, "id")?;
            if state.dao.proposals.contains_key(id) {
                return Err(ClawError::DuplicateCreate(id.into()));
            }
            get_str(&env.payload, "kind")?;
            Ok(())
        }
        "dao.proposal.advance" => {
            let p = require(state, get_str(&env.payload, "id")?)?;
            match p.state {
                ProposalState::Discussion | ProposalState::Voting | ProposalState::Passed => Ok(()),
                ProposalState::Queued => {
                    let ready_at = p.queued_at.unwrap_or(0) + p.timelock_delay_secs * 1000;
                    if env.ts < ready_at {
                        return Err(ClawError::InvalidTransition { from: "timelock not elapsed".into(), event: env.kind.clone() });
                    }
                    Ok(())
                }
                ProposalState::Rejected | ProposalState::Executed => {
                    Err(ClawError::AlreadyTerminal(p.id.clone()))
                }
            }
        }
        "dao.vote.cast" => {
            let p = require(state, get_str(&env.payload, "id")?)?;
            if !matches!(p.state, ProposalState::Voting) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", p.state), event: env.kind.clone() });
            }
            if p.voters.contains(&env.issuer) {
                return Err(ClawError::DuplicateNonce { issuer: env.issuer.0.clone(), nonce: env.nonce });
            }
            get_field(&env.payload, "support")?
                .as_bool()
                .ok_or_else(|| ClawError::SchemaViolation("support must be a bool".into()))?;
            Ok(())
        }
        "dao.delegate.set" => {
            let to = Did(get_str(&env.payload, "to")?.to_string());
            if to == env.issuer {
                return Err(ClawError::SelfTransfer);
            }
            Ok(())
        }
        "dao.delegate.revoke" => Ok(()),
        "dao.treasury.deposit" => {
            let amount = parse_amount(get_field(&env.payload, "amount")?, "amount")?;
            if amount == 0 {
                return Err(ClawError::ZeroAmount);
            }
            let addr = issuer_address(env)?;
            let wallet = state.wallet(&addr);
            if wallet.available < amount {
                return Err(ClawError::InsufficientBalance { need: amount, have: wallet.available });
            }
            Ok(())
        }
        "dao.treasury.spend" => {
            let proposal_id = get_str(&env.payload, "proposalId")?;
            let p = require(state, proposal_id)?;
            if p.kind != "treasurySpend" {
                return Err(ClawError::SchemaViolation("proposal is not a treasurySpend proposal".into()));
            }
            if !matches!(p.state, ProposalState::Queued) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", p.state), event: env.kind.clone() });
            }
            let ready_at = p.queued_at.unwrap_or(0) + p.timelock_delay_secs * 1000;
            if env.ts < ready_at {
                return Err(ClawError::InvalidTransition { from: "timelock not elapsed".into(), event: env.kind.clone() });
            }
            let amount = parse_amount(get_field(&env.payload, "amount")?, "amount")?;
            let action_amount = parse_amount(get_field(&p.action, "amount")?, "amount")?;
            if amount != action_amount {
                return Err(ClawError::SchemaViolation("amount does not match the queued proposal".into()));
            }
            if amount > state.dao.treasury {
                return Err(ClawError::InsufficientBalance { need: amount, have: state.dao.treasury });
            }
            Ok(())
        }
        other => Err(ClawError::SchemaViolation(format!("unknown DAO event `{other}`"))),
    }
}

pub fn apply(state: &mut State, env: &Envelope, params: &ReducerParams) -> Result<(), ClawError> {
    can_apply(state, env, params)?;
    match env.kind.as_str() {
        "dao.proposal.create" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let kind = get_str(&env.payload, "kind")?.to_string();
            let (quorum_bps, pass_threshold_bps) = params.dao_threshold_for(&kind);
            let action = env.payload.get("action").cloned().unwrap_or(serde_json::Value::Null);
            state.dao.proposals.insert(
                id.clone(),
                Proposal {
                    id,
                    kind,
                    proposer: env.issuer.clone(),
                    state: ProposalState::Discussion,
                    quorum_bps,
                    pass_threshold_bps,
                    votes_for: 0.0,
                    votes_against: 0.0,
                    voters: Default::default(),
                    action,
                    queued_at: None,
                    timelock_delay_secs: 86_400,
                },
            );
        }
        "dao.proposal.advance" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let total_supply = total_voting_supply(state);
            let p = state.dao.proposals.get_mut(&id).unwrap();
            match p.state {
                ProposalState::Discussion => p.state = ProposalState::Voting,
                ProposalState::Voting => {
                    let turnout = p.votes_for + p.votes_against;
                    let quorum_met = total_supply > 0.0 && turnout / total_supply >= p.quorum_bps as f64 / 10_000.0;
                    let passes = turnout > 0.0 && p.votes_for / turnout >= p.pass_threshold_bps as f64 / 10_000.0;
                    p.state = if quorum_met && passes { ProposalState::Passed } else { ProposalState::Rejected };
                }
                ProposalState::Passed => {
                    p.state = ProposalState::Queued;
                    p.queued_at = Some(env.ts);
                }
                ProposalState::Queued => {
                    p.state = ProposalState::Executed;
                }
                ProposalState::Rejected | ProposalState::Executed => unreachable!("validated above"),
            }
        }
        "dao.vote.cast" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let support = env.payload.get("support").and_then(|v| v.as_bool()).unwrap();
            let power = voting_power(state, &env.issuer);
            let p = state.dao.proposals.get_mut(&id).unwrap();
            if support {
                p.votes_for += power;
            } else {
                p.votes_against += power;
            }
            p.voters.insert(env.issuer.clone());
        }
        "dao.delegate.set" => {
            let to = Did(get_str(&env.payload, "to")?.to_string());
            state.dao.delegations.insert(env.issuer.clone(), to);
        }
        "dao.delegate.revoke" => {
            state.dao.delegations.remove(&env.issuer);
        }
        "dao.treasury.deposit" => {
            let amount = parse_amount(get_field(&env.payload, "amount")?, "amount")?;
            let addr = issuer_address(env)?;
            state.wallet_mut(&addr).available -= amount;
            state.wallet_mut(&addr).total_out += amount;
            state.dao.treasury += amount;
        }
        "dao.treasury.spend" => {
            let proposal_id = get_str(&env.payload, "proposalId")?.to_string();
            let amount: Balance = parse_amount(get_field(&env.payload, "amount")?, "amount")?;
            let to = Address(get_str(&env.payload, "to")?.to_string());
            state.dao.treasury -= amount;
            state.wallet_mut(&to).available += amount;
            state.wallet_mut(&to).total_in += amount;
            state.dao.proposals.get_mut(&proposal_id).unwrap().state = ProposalState::Executed;
        }
        _ => unreachable!("validated above"),
    }
    Ok(())
}
