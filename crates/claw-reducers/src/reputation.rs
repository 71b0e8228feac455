//! Reputation reducer (§4.8.6). Grounded on `chronx-state/src/engine.rs`'s
//! oracle-snapshot recompute-on-submission pattern, re-purposed from a
//! pair-level price oracle to a per-subject, per-dimension running mean.

use claw_core::error::ClawError;
use claw_core::types::Did;
use claw_core::Envelope;

use crate::payload::{get_str, get_str_opt};
use crate::state::{ReputationRecord, State, REPUTATION_DIMENSIONS};

pub fn can_apply(state: &State, env: &Envelope) -> Result<(), ClawError> {
    if env.kind != "reputation.record" {
        return Err(ClawError::SchemaViolation(format!("unknown reputation event `{}`", env.kind)));
    }
    let subject = Did(get_str(&env.payload, "subject")?.to_string());
    if subject == env.issuer {
        return Err(ClawError::SelfTransfer);
    }
    let dimension = get_str(&env.payload, "dimension")?;
    if !REPUTATION_DIMENSIONS.contains(&dimension) {
        return Err(ClawError::SchemaViolation(format!("unknown reputation dimension `{dimension}`")));
    }
    let score = env
        .payload
        .get("score")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ClawError::SchemaViolation("score must be an integer".into()))?;
    if !(1..=5).contains(&score) {
        return Err(ClawError::SchemaViolation("score must be in 1..=5".into()));
    }
    if let Some(reference) = get_str_opt(&env.payload, "ref") {
        if let Some(record) = state.reputation.get(&subject) {
            let key = (reference.to_string(), dimension.to_string());
            if record.seen_refs.contains(&key) {
                return Err(ClawError::DuplicateReputationRecord);
            }
        }
    }
    Ok(())
}

pub fn apply(state: &mut State, env: &Envelope) -> Result<(), ClawError> {
    can_apply(state, env)?;
    let subject = Did(get_str(&env.payload, "subject")?.to_string());
    let dimension = get_str(&env.payload, "dimension")?.to_string();
    let score = env.payload.get("score").and_then(|v| v.as_u64()).unwrap();
    let reference = get_str_opt(&env.payload, "ref").map(|s| s.to_string());
    let _comment = get_str_opt(&env.payload, "comment");

    let record = state.reputation.entry(subject.clone()).or_insert_with(|| ReputationRecord {
        subject: Some(subject),
        ..Default::default()
    });
    if let Some(reference) = reference {
        record.seen_refs.insert((reference, dimension.clone()));
    }
    let agg = record.dimensions.entry(dimension).or_default();
    agg.count += 1;
    agg.sum += score;
    agg.mean = agg.sum as f64 / agg.count as f64;
    Ok(())
}
