//! The validation pipeline (C7, §4.7): envelope integrity → schema → nonce
//! rule → resource chain → domain precondition → commit. Grounded on
//! `chronx-state/src/engine.rs`'s `StateEngine::apply` (explicit `now:
//! Timestamp` parameter, staged-mutation-then-commit shape) and
//! `chronx-dag/src/validation.rs`'s ordered integrity-check-then-reject
//! style.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use claw_core::constants::{FUTURE_NONCE_TTL_SECS, MAX_FUTURE_NONCES};
use claw_core::error::ClawError;
use claw_core::types::{Cursor, Did, EventHash, Nonce, Timestamp};
use claw_core::Envelope;
use claw_log::EventLog;
use claw_reducers::{ReducerParams, State};
use tokio::sync::RwLock;
use tracing::{debug, info};

struct Buffered {
    envelope: Envelope,
    buffered_at: Timestamp,
}

/// The single-writer committer (§5): one `Pipeline` owns exclusive write
/// access to the log, the per-issuer out-of-order buffer, and the derived
/// state cache. Readers take `state()` (a `tokio::sync::RwLock` read guard) —
/// the copy-on-write-per-map refinement is a node-level (C10) concern layered
/// on top of this coarser lock.
pub struct Pipeline {
    log: Arc<EventLog>,
    state: RwLock<State>,
    params: ReducerParams,
    future_buffer: std::sync::Mutex<HashMap<Did, BTreeMap<Nonce, Buffered>>>,
}

/// The outcome of a single `submit` call, distinguishing an immediate commit
/// from an event parked in the out-of-order buffer awaiting its predecessor.
#[derive(Debug)]
pub enum Outcome {
    Committed { cursor: Cursor, hash: EventHash },
    Buffered { head: Nonce, got: Nonce },
}

impl Pipeline {
    pub fn new(log: Arc<EventLog>, params: ReducerParams) -> Self {
        Self {
            log,
            state: RwLock::new(State::default()),
            params,
            future_buffer: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn state(&self) -> tokio::sync::RwLockReadGuard<'_, State> {
        self.state.read().await
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    /// Rebuild the derived state cache from scratch by replaying every
    /// committed event in log order. A fresh `Pipeline` starts with empty
    /// state (§9: the cache is derived, never authoritative), so a node
    /// restarting against an existing log must call this once before serving
    /// reads or accepting new submissions — `submit`'s own idempotent
    /// resubmission path only re-links the log, it does not re-run a
    /// reducer for events already committed.
    pub async fn rebuild_state_from_log(&self) -> Result<(), ClawError> {
        let mut state = self.state.write().await;
        *state = State::default();
        let mut cursor = Cursor::START;
        loop {
            let (events, next) = self.log.range_from_cursor(cursor, 1024)?;
            if events.is_empty() {
                break;
            }
            for (hash, bytes) in &events {
                let envelope: Envelope = serde_json::from_slice(bytes)
                    .map_err(|e| ClawError::Serialization(e.to_string()))?;
                claw_reducers::apply(&mut state, &envelope, &self.params)
                    .unwrap_or_else(|e| panic!("replaying already-committed event {hash}: {e}"));
            }
            if next == cursor {
                break;
            }
            cursor = next;
        }
        info!(cursor = %cursor, "rebuilt derived state from log");
        Ok(())
    }

    /// Run the full pipeline for one envelope. `now` is the committer's wall
    /// clock, threaded explicitly so tests are deterministic.
    pub async fn submit(&self, envelope: Envelope, now: Timestamp) -> Result<Outcome, ClawError> {
        // 1. Envelope integrity.
        envelope.verify()?;

        // 2. Type schema: a domain-qualified `type` and an object payload.
        if !envelope.kind.contains('.') {
            return Err(ClawError::SchemaViolation(format!("`type` must be dot-separated, got `{}`", envelope.kind)));
        }
        if !envelope.payload.is_object() && !envelope.payload.is_null() {
            return Err(ClawError::SchemaViolation("`payload` must be a JSON object".into()));
        }

        let outcome = self.commit_or_buffer(envelope, now).await?;
        if let Outcome::Committed { .. } = &outcome {
            self.drain_buffer(now).await?;
        }
        Ok(outcome)
    }

    async fn commit_or_buffer(&self, envelope: Envelope, now: Timestamp) -> Result<Outcome, ClawError> {
        if envelope.nonce == 0 {
            return Err(ClawError::SchemaViolation("nonce must start at 1".into()));
        }

        // 3. Nonce rule.
        let head = self.log.issuer_head(&envelope.issuer)?;
        if envelope.nonce <= head {
            match self.log.hash_at_nonce(&envelope.issuer, envelope.nonce)? {
                Some(committed) if committed == envelope.hash => {
                    // Re-submission of an already-committed event: idempotent.
                    let cursor = self
                        .log
                        .append(&envelope.issuer, envelope.nonce, claw_reducers::resource_of(&envelope).as_ref(), envelope.hash, &envelope.canonical_bytes()?)?;
                    return Ok(Outcome::Committed { cursor, hash: envelope.hash });
                }
                Some(committed) => {
                    return Err(ClawError::NonceConflict {
                        issuer: envelope.issuer.0.clone(),
                        nonce: envelope.nonce,
                        incoming: envelope.hash,
                        committed,
                    });
                }
                None => {
                    return Err(ClawError::DuplicateNonce { issuer: envelope.issuer.0.clone(), nonce: envelope.nonce });
                }
            }
        }
        if envelope.nonce > head + 1 {
            return self.buffer(envelope, head, now);
        }

        self.commit(envelope).await
    }

    fn buffer(&self, envelope: Envelope, head: Nonce, now: Timestamp) -> Result<Outcome, ClawError> {
        let mut buf = self.future_buffer.lock().expect("future buffer mutex poisoned");
        let per_issuer = buf.entry(envelope.issuer.clone()).or_default();
        if per_issuer.len() >= MAX_FUTURE_NONCES {
            return Err(ClawError::FutureNonceBufferFull(envelope.issuer.0.clone()));
        }
        let got = envelope.nonce;
        per_issuer.insert(envelope.nonce, Buffered { envelope, buffered_at: now });
        Ok(Outcome::Buffered { head, got })
    }

    /// Drains every issuer's buffer whose next expected nonce is now
    /// satisfiable, and evicts entries older than `FUTURE_NONCE_TTL_SECS`.
    async fn drain_buffer(&self, now: Timestamp) -> Result<(), ClawError> {
        loop {
            let ready = {
                let mut buf = self.future_buffer.lock().expect("future buffer mutex poisoned");
                let mut ready = None;
                for (issuer, per_issuer) in buf.iter_mut() {
                    per_issuer.retain(|_, b| now - b.buffered_at <= FUTURE_NONCE_TTL_SECS * 1000);
                    let head = self.log.issuer_head(issuer).unwrap_or(0);
                    if let Some((&nonce, _)) = per_issuer.iter().next() {
                        if nonce == head + 1 {
                            ready = Some((issuer.clone(), nonce));
                            break;
                        }
                    }
                }
                ready
            };
            let Some((issuer, nonce)) = ready else { break };
            let envelope = {
                let mut buf = self.future_buffer.lock().expect("future buffer mutex poisoned");
                buf.get_mut(&issuer).and_then(|m| m.remove(&nonce)).map(|b| b.envelope)
            };
            if let Some(envelope) = envelope {
                debug!(issuer = %issuer.0, nonce, "draining buffered event");
                self.commit(envelope).await?;
            }
        }
        Ok(())
    }

    async fn commit(&self, envelope: Envelope) -> Result<Outcome, ClawError> {
        let resource = claw_reducers::resource_of(&envelope);

        // 4. Resource chain.
        if let Some(r) = &resource {
            let expected = self.log.resource_head(r)?;
            if envelope.prev != expected {
                return Err(ClawError::StaleResource {
                    resource: r.index_key(),
                    expected,
                    got: envelope.prev,
                });
            }
        }

        // 5. Domain precondition, 6. Commit.
        let mut state = self.state.write().await;
        claw_reducers::can_apply(&state, &envelope, &self.params)?;
        let canonical = envelope.canonical_bytes()?;
        let cursor = self
            .log
            .append(&envelope.issuer, envelope.nonce, resource.as_ref(), envelope.hash, &canonical)?;
        claw_reducers::apply(&mut state, &envelope, &self.params).expect("can_apply just succeeded");
        info!(kind = %envelope.kind, issuer = %envelope.issuer.0, nonce = envelope.nonce, %cursor, "committed event");
        Ok(Outcome::Committed { cursor, hash: envelope.hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_core::identity::{address_from_public_key, did_from_public_key};
    use claw_crypto::KeyPair;
    use serde_json::json;

    fn temp_log() -> Arc<EventLog> {
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!("claw-validate-test-{}-{}", std::process::id(), nanos));
        Arc::new(EventLog::open(p).unwrap())
    }

    fn issuer() -> (KeyPair, claw_core::types::Did, claw_core::types::Address) {
        let kp = KeyPair::generate();
        let pk = kp.public_key_bytes();
        (kp, did_from_public_key(&pk), address_from_public_key(&pk))
    }

    fn build(kp: &KeyPair, did: &claw_core::types::Did, kind: &str, nonce: u64, prev: Option<EventHash>, payload: serde_json::Value) -> Envelope {
        let pk = kp.public_key_bytes();
        Envelope::build(kind, did.clone(), &pk, nonce, prev, payload, 1_700_000_000_000, |b| kp.sign(b)).unwrap()
    }

    #[tokio::test]
    async fn in_order_events_commit_immediately() {
        let (kp, did, addr) = issuer();
        let mut params = ReducerParams::default();
        params.mint_authorities.push(did.clone());
        let pipeline = Pipeline::new(temp_log(), params);

        let mint = build(&kp, &did, "wallet.mint", 1, None, json!({"to": addr.0, "amount": "100"}));
        let outcome = pipeline.submit(mint, 1_700_000_000_000).await.unwrap();
        assert!(matches!(outcome, Outcome::Committed { .. }));
        assert_eq!(pipeline.state().await.wallet(&addr).available, 100);
    }

    #[tokio::test]
    async fn out_of_order_event_buffers_then_drains() {
        let (kp, did, addr) = issuer();
        let mut params = ReducerParams::default();
        params.mint_authorities.push(did.clone());
        let pipeline = Pipeline::new(temp_log(), params);

        let second = build(&kp, &did, "wallet.mint", 2, None, json!({"to": addr.0, "amount": "50"}));
        let outcome = pipeline.submit(second, 1_700_000_000_000).await.unwrap();
        assert!(matches!(outcome, Outcome::Buffered { .. }));
        assert_eq!(pipeline.state().await.wallet(&addr).available, 0);

        let first = build(&kp, &did, "wallet.mint", 1, None, json!({"to": addr.0, "amount": "100"}));
        pipeline.submit(first, 1_700_000_000_001).await.unwrap();
        assert_eq!(pipeline.state().await.wallet(&addr).available, 150);
    }

    #[tokio::test]
    async fn stale_resource_prev_is_rejected() {
        let (kp, did, depositor) = issuer();
        let (_, _, beneficiary) = issuer();
        let mut params = ReducerParams::default();
        params.mint_authorities.push(did.clone());
        let pipeline = Pipeline::new(temp_log(), params);

        let mint = build(&kp, &did, "wallet.mint", 1, None, json!({"to": depositor.0, "amount": "500"}));
        pipeline.submit(mint, 1_700_000_000_000).await.unwrap();

        let create = build(&kp, &did, "wallet.escrow.create", 2, None, json!({
            "id": "esc1", "depositor": depositor.0, "beneficiary": beneficiary.0,
            "amount": "100", "releaseRules": "on-confirm",
        }));
        pipeline.submit(create, 1_700_000_000_001).await.unwrap();

        let bogus_prev = Some(EventHash::from_bytes([9u8; 32]));
        let fund = build(&kp, &did, "wallet.escrow.fund", 3, bogus_prev, json!({"id": "esc1", "amount": "50"}));
        let result = pipeline.submit(fund, 1_700_000_000_002).await;
        assert!(matches!(result, Err(ClawError::StaleResource { .. })));
    }

    #[tokio::test]
    async fn duplicate_hash_resubmission_is_idempotent() {
        let (kp, did, addr) = issuer();
        let mut params = ReducerParams::default();
        params.mint_authorities.push(did.clone());
        let pipeline = Pipeline::new(temp_log(), params);

        let mint = build(&kp, &did, "wallet.mint", 1, None, json!({"to": addr.0, "amount": "100"}));
        pipeline.submit(mint.clone(), 1_700_000_000_000).await.unwrap();
        let outcome = pipeline.submit(mint, 1_700_000_000_001).await.unwrap();
        assert!(matches!(outcome, Outcome::Committed { .. }));
        assert_eq!(pipeline.state().await.wallet(&addr).available, 100);
    }
}
