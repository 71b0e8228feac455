//! Service contract reducer (§4.8.5): the milestone state machine. Grounded
//! on `chronx-core/src/account.rs`'s `TimeLockStatus`/`RecoveryDecisionStatus`
//! explicit state-enum convention and `chronx-state/src/engine.rs`'s
//! one-db-mutation-per-validated-precondition shape.

use claw_core::constants::MAX_MILESTONES;
use claw_core::error::ClawError;
use claw_core::identity::address_from_did;
use claw_core::types::{Address, Balance, Did};
use claw_core::Envelope;

use crate::payload::{get_field, get_str, get_str_opt, parse_amount};
use crate::state::{Contract, ContractState, Escrow, EscrowState, Milestone, MilestoneState, State};

fn issuer_address(env: &Envelope) -> Result<Address, ClawError> {
    address_from_did(&env.issuer).map_err(|e| ClawError::Identity(e.to_string()))
}

fn require<'a>(state: &'a State, id: &str) -> Result<&'a Contract, ClawError> {
    state.contracts.get(id).ok_or_else(|| ClawError::NotFound { kind: "contract".into(), id: id.into() })
}

fn parse_milestones(payload: &serde_json::Value) -> Result<Vec<Milestone>, ClawError> {
    let arr = get_field(payload, "milestones")?
        .as_array()
        .ok_or_else(|| ClawError::SchemaViolation("milestones must be an array".into()))?;
    if arr.is_empty() || arr.len() > MAX_MILESTONES {
        return Err(ClawError::SchemaViolation(format!(
            "milestones must have 1..={MAX_MILESTONES} entries"
        )));
    }
    arr.iter()
        .map(|m| {
            Ok(Milestone {
                id: get_str(m, "id")?.to_string(),
                amount: parse_amount(get_field(m, "amount")?, "amount")?,
                state: MilestoneState::Pending,
            })
        })
        .collect()
}

fn milestone_index(contract: &Contract, id: &str) -> Result<usize, ClawError> {
    contract
        .milestones
        .iter()
        .position(|m| m.id == id)
        .ok_or_else(|| ClawError::NotFound { kind: "milestone".into(), id: id.into() })
}

pub fn can_apply(state: &State, env: &Envelope) -> Result<(), ClawError> {
    match env.kind.as_str() {
        "contract.create" => {
            let id = get_str(&env.payload, "id")?;
            if state.contracts.contains_key(id) {
                return Err(ClawError::DuplicateCreate(id.into()));
            }
            let client = Address(get_str(&env.payload, "client")?.to_string());
            let provider = Address(get_str(&env.payload, "provider")?.to_string());
            if client == provider {
                return Err(ClawError::SelfTransfer);
            }
            let total: Balance = parse_amount(get_field(&env.payload, "totalAmount")?, "totalAmount")?;
            let milestones = parse_milestones(&env.payload)?;
            let sum: Balance = milestones.iter().map(|m| m.amount).sum();
            if sum != total {
                return Err(ClawError::MilestoneAmountsDoNotSumToTotal { expected: total, got: sum });
            }
            Ok(())
        }
        "contract.sign" => {
            let c = require(state, get_str(&env.payload, "id")?)?;
            if !matches!(c.state, ContractState::Draft) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", c.state), event: env.kind.clone() });
            }
            let who = issuer_address(env)?;
            if who != c.client && who != c.provider {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: c.id.clone() });
            }
            Ok(())
        }
        "contract.cancel" => {
            let c = require(state, get_str(&env.payload, "id")?)?;
            if !matches!(c.state, ContractState::Draft | ContractState::Signed) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", c.state), event: env.kind.clone() });
            }
            let who = issuer_address(env)?;
            if who != c.client && who != c.provider {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: c.id.clone() });
            }
            Ok(())
        }
        "contract.fund" => {
            let c = require(state, get_str(&env.payload, "id")?)?;
            if !matches!(c.state, ContractState::Signed) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", c.state), event: env.kind.clone() });
            }
            let who = issuer_address(env)?;
            if who != c.client {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: c.id.clone() });
            }
            let wallet = state.wallet(&c.client);
            if wallet.available < c.total_amount {
                return Err(ClawError::InsufficientBalance { need: c.total_amount, have: wallet.available });
            }
            Ok(())
        }
        "contract.milestone.submit" => {
            let c = require(state, get_str(&env.payload, "id")?)?;
            if !matches!(c.state, ContractState::Active) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", c.state), event: env.kind.clone() });
            }
            let who = issuer_address(env)?;
            if who != c.provider {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: c.id.clone() });
            }
            let idx = milestone_index(c, get_str(&env.payload, "milestoneId")?)?;
            if !matches!(c.milestones[idx].state, MilestoneState::Pending) {
                return Err(ClawError::InvalidTransition { from: "non-Pending milestone".into(), event: env.kind.clone() });
            }
            Ok(())
        }
        "contract.milestone.approve" | "contract.milestone.reject" => {
            let c = require(state, get_str(&env.payload, "id")?)?;
            if !matches!(c.state, ContractState::MilestoneInProgress) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", c.state), event: env.kind.clone() });
            }
            let who = issuer_address(env)?;
            let arbiter_ok = c.arbiter.as_ref() == Some(&env.issuer);
            if who != c.client && !arbiter_ok {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: c.id.clone() });
            }
            let idx = milestone_index(c, get_str(&env.payload, "milestoneId")?)?;
            if !matches!(c.milestones[idx].state, MilestoneState::InProgress) {
                return Err(ClawError::InvalidTransition { from: "non-InProgress milestone".into(), event: env.kind.clone() });
            }
            Ok(())
        }
        "contract.dispute" => {
            let c = require(state, get_str(&env.payload, "id")?)?;
            if !matches!(c.state, ContractState::Active | ContractState::MilestoneInProgress) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", c.state), event: env.kind.clone() });
            }
            let who = issuer_address(env)?;
            if who != c.client && who != c.provider {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: c.id.clone() });
            }
            Ok(())
        }
        "contract.dispute.resolve" => {
            let c = require(state, get_str(&env.payload, "id")?)?;
            if !matches!(c.state, ContractState::Disputed) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", c.state), event: env.kind.clone() });
            }
            if c.arbiter.as_ref() != Some(&env.issuer) {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: c.id.clone() });
            }
            let escrow = state.escrows.get(c.escrow_id.as_ref().expect("Disputed contract was funded")).unwrap();
            let remaining = escrow.amount - escrow.released_to_beneficiary - escrow.refunded_to_depositor;
            let released = parse_amount(get_field(&env.payload, "releaseToBeneficiary")?, "releaseToBeneficiary")?;
            let refunded = parse_amount(get_field(&env.payload, "refundToDepositor")?, "refundToDepositor")?;
            if released + refunded != remaining {
                return Err(ClawError::SchemaViolation(
                    "resolution must allocate exactly the remaining escrow amount".into(),
                ));
            }
            Ok(())
        }
        "contract.terminate" => {
            let c = require(state, get_str(&env.payload, "id")?)?;
            if !matches!(c.state, ContractState::Active) {
                return Err(ClawError::InvalidTransition { from: format!("{:?}", c.state), event: env.kind.clone() });
            }
            match c.deadline {
                Some(d) if env.ts >= d => Ok(()),
                Some(_) => Err(ClawError::InvalidTransition { from: "before deadline".into(), event: env.kind.clone() }),
                None => Err(ClawError::SchemaViolation("contract has no deadline".into())),
            }
        }
        "contract.complete" => Err(ClawError::SchemaViolation(
            "contract.complete is derived automatically on the last milestone approval".into(),
        )),
        other => Err(ClawError::SchemaViolation(format!("unknown contract event `{other}`"))),
    }
}

pub fn apply(state: &mut State, env: &Envelope) -> Result<(), ClawError> {
    can_apply(state, env)?;
    match env.kind.as_str() {
        "contract.create" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let client = Address(get_str(&env.payload, "client")?.to_string());
            let provider = Address(get_str(&env.payload, "provider")?.to_string());
            let arbiter = get_str_opt(&env.payload, "arbiter").map(|s| Did(s.to_string()));
            let total_amount = parse_amount(get_field(&env.payload, "totalAmount")?, "totalAmount")?;
            let milestones = parse_milestones(&env.payload)?;
            let deadline = env.payload.get("deadline").and_then(|v| v.as_i64());
            state.contracts.insert(
                id.clone(),
                Contract {
                    id,
                    client,
                    provider,
                    arbiter,
                    total_amount,
                    milestones,
                    state: ContractState::Draft,
                    signatures: Default::default(),
                    escrow_id: None,
                    deadline,
                    last_event_hash: env.hash,
                },
            );
        }
        "contract.sign" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let who = issuer_address(env)?;
            let c = state.contracts.get_mut(&id).unwrap();
            if who == c.client {
                c.signatures.client = true;
            } else {
                c.signatures.provider = true;
            }
            if c.signatures.client && c.signatures.provider {
                c.state = ContractState::Signed;
            }
            c.last_event_hash = env.hash;
        }
        "contract.cancel" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let c = state.contracts.get_mut(&id).unwrap();
            c.state = ContractState::Cancelled;
            c.last_event_hash = env.hash;
        }
        "contract.fund" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let (client, total_amount) = {
                let c = state.contracts.get(&id).unwrap();
                (c.client.clone(), c.total_amount)
            };
            state.wallet_mut(&client).available -= total_amount;
            state.wallet_mut(&client).locked += total_amount;
            let escrow_id = format!("escrow:contract:{id}");
            let beneficiary = state.contracts.get(&id).unwrap().provider.clone();
            state.escrows.insert(
                escrow_id.clone(),
                Escrow {
                    id: escrow_id.clone(),
                    depositor: client,
                    beneficiary,
                    arbiter: state.contracts.get(&id).unwrap().arbiter.clone(),
                    amount: total_amount,
                    released_to_beneficiary: 0,
                    refunded_to_depositor: 0,
                    state: EscrowState::Active,
                    release_rules: "milestone-approval".to_string(),
                    expires_at: None,
                    last_event_hash: env.hash,
                },
            );
            let c = state.contracts.get_mut(&id).unwrap();
            c.escrow_id = Some(escrow_id);
            c.state = ContractState::Active;
            c.last_event_hash = env.hash;
        }
        "contract.milestone.submit" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let milestone_id = get_str(&env.payload, "milestoneId")?.to_string();
            let c = state.contracts.get_mut(&id).unwrap();
            let idx = milestone_index(c, &milestone_id).unwrap();
            c.milestones[idx].state = MilestoneState::InProgress;
            c.state = ContractState::MilestoneInProgress;
            c.last_event_hash = env.hash;
        }
        "contract.milestone.approve" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let milestone_id = get_str(&env.payload, "milestoneId")?.to_string();
            let (escrow_id, amount, depositor, beneficiary) = {
                let c = state.contracts.get(&id).unwrap();
                let idx = milestone_index(c, &milestone_id).unwrap();
                let escrow_id = c.escrow_id.clone().expect("Active contract is funded");
                let escrow = state.escrows.get(&escrow_id).unwrap();
                (escrow_id, c.milestones[idx].amount, escrow.depositor.clone(), escrow.beneficiary.clone())
            };
            state.wallet_mut(&depositor).locked -= amount;
            state.wallet_mut(&beneficiary).available += amount;
            state.wallet_mut(&beneficiary).total_in += amount;
            let escrow = state.escrows.get_mut(&escrow_id).unwrap();
            escrow.released_to_beneficiary += amount;
            if escrow.released_to_beneficiary == escrow.amount {
                escrow.state = EscrowState::Released;
            }

            let c = state.contracts.get_mut(&id).unwrap();
            let idx = milestone_index(c, &milestone_id).unwrap();
            c.milestones[idx].state = MilestoneState::Approved;
            if c.milestones.iter().all(|m| matches!(m.state, MilestoneState::Approved)) {
                c.state = ContractState::Completed;
            } else {
                c.state = ContractState::Active;
            }
            c.last_event_hash = env.hash;
        }
        "contract.milestone.reject" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let milestone_id = get_str(&env.payload, "milestoneId")?.to_string();
            let c = state.contracts.get_mut(&id).unwrap();
            let idx = milestone_index(c, &milestone_id).unwrap();
            c.milestones[idx].state = MilestoneState::Pending;
            c.state = ContractState::Active;
            c.last_event_hash = env.hash;
        }
        "contract.dispute" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let c = state.contracts.get_mut(&id).unwrap();
            c.state = ContractState::Disputed;
            c.last_event_hash = env.hash;
        }
        "contract.dispute.resolve" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let released = parse_amount(get_field(&env.payload, "releaseToBeneficiary")?, "releaseToBeneficiary")?;
            let refunded = parse_amount(get_field(&env.payload, "refundToDepositor")?, "refundToDepositor")?;
            let (escrow_id, depositor, beneficiary) = {
                let c = state.contracts.get(&id).unwrap();
                let escrow_id = c.escrow_id.clone().expect("Disputed contract was funded");
                let escrow = state.escrows.get(&escrow_id).unwrap();
                (escrow_id, escrow.depositor.clone(), escrow.beneficiary.clone())
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
            let escrow = state.escrows.get_mut(&escrow_id).unwrap();
            escrow.released_to_beneficiary += released;
            escrow.refunded_to_depositor += refunded;
            escrow.state = if escrow.refunded_to_depositor == escrow.amount {
                EscrowState::Refunded
            } else {
                EscrowState::Released
            };
            let final_state = escrow.state;
            let c = state.contracts.get_mut(&id).unwrap();
            c.state = match final_state {
                EscrowState::Refunded => ContractState::Cancelled,
                _ => ContractState::Completed,
            };
            c.last_event_hash = env.hash;
        }
        "contract.terminate" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let (escrow_id, depositor, remaining) = {
                let c = state.contracts.get(&id).unwrap();
                let escrow_id = c.escrow_id.clone().expect("Active contract was funded");
                let escrow = state.escrows.get(&escrow_id).unwrap();
                let remaining = escrow.amount - escrow.released_to_beneficiary - escrow.refunded_to_depositor;
                (escrow_id, escrow.depositor.clone(), remaining)
            };
            state.wallet_mut(&depositor).locked -= remaining;
            state.wallet_mut(&depositor).available += remaining;
            let escrow = state.escrows.get_mut(&escrow_id).unwrap();
            escrow.refunded_to_depositor += remaining;
            escrow.state = EscrowState::Refunded;
            let c = state.contracts.get_mut(&id).unwrap();
            c.state = ContractState::Cancelled;
            c.last_event_hash = env.hash;
        }
        _ => unreachable!("validated above"),
    }
    Ok(())
}
