//! Identity reducer (§4.8.1). Grounded on `chronx-dag/src/validation.rs`'s
//! signature-verification-against-stored-key shape, re-purposed from
//! per-transaction auth checking to the old-key-authorizes-new-key rotation
//! rule.

use claw_core::error::ClawError;
use claw_core::types::Did;
use claw_core::Envelope;

use crate::payload::get_str;
use crate::state::{IdentityRecord, State};

pub fn can_apply(state: &State, env: &Envelope) -> Result<(), ClawError> {
    match env.kind.as_str() {
        "identity.register" => {
            if state.identities.contains_key(&env.issuer) {
                return Err(ClawError::DuplicateCreate(env.issuer.0.clone()));
            }
            Ok(())
        }
        "identity.rotateKey" => {
            let record = require_live(state, &env.issuer)?;
            verify_rotation_signature(record, env)?;
            Ok(())
        }
        "identity.revoke" => {
            require_live(state, &env.issuer)?;
            Ok(())
        }
        "identity.capability.add" | "identity.platformLink.add" => {
            require_live(state, &env.issuer)?;
            Ok(())
        }
        other => Err(ClawError::SchemaViolation(format!("unknown identity event `{other}`"))),
    }
}

pub fn apply(state: &mut State, env: &Envelope) -> Result<(), ClawError> {
    can_apply(state, env)?;
    match env.kind.as_str() {
        "identity.register" => {
            state.identities.insert(
                env.issuer.clone(),
                IdentityRecord {
                    did: env.issuer.clone(),
                    public_key: env.public_key.clone(),
                    capabilities: Vec::new(),
                    platform_links: Vec::new(),
                    revoked: false,
                    last_event_hash: env.hash,
                },
            );
        }
        "identity.rotateKey" => {
            let record = state.identities.get_mut(&env.issuer).expect("checked by can_apply");
            record.public_key = get_str(&env.payload, "newPub")?.to_string();
            record.last_event_hash = env.hash;
        }
        "identity.revoke" => {
            let record = state.identities.get_mut(&env.issuer).expect("checked by can_apply");
            record.revoked = true;
            record.last_event_hash = env.hash;
        }
        "identity.capability.add" => {
            let cap = get_str(&env.payload, "capability")?.to_string();
            let record = state.identities.get_mut(&env.issuer).expect("checked by can_apply");
            if !record.capabilities.contains(&cap) {
                record.capabilities.push(cap);
            }
            record.last_event_hash = env.hash;
        }
        "identity.platformLink.add" => {
            let link = get_str(&env.payload, "platform")?.to_string();
            let record = state.identities.get_mut(&env.issuer).expect("checked by can_apply");
            if !record.platform_links.contains(&link) {
                record.platform_links.push(link);
            }
            record.last_event_hash = env.hash;
        }
        _ => unreachable!("validated above"),
    }
    Ok(())
}

fn require_live<'a>(state: &'a State, did: &Did) -> Result<&'a IdentityRecord, ClawError> {
    let record = state
        .identities
        .get(did)
        .ok_or_else(|| ClawError::NotFound { kind: "identity".into(), id: did.0.clone() })?;
    if record.revoked {
        return Err(ClawError::AlreadyTerminal(did.0.clone()));
    }
    Ok(record)
}

/// `identity.rotateKey`'s payload carries the new public key plus a
/// signature, made with the *old* key, over the canonical bytes of
/// `{"newPub": <multibase>}` — the old key authorizing its own replacement.
fn verify_rotation_signature(record: &IdentityRecord, env: &Envelope) -> Result<(), ClawError> {
    let new_pub = get_str(&env.payload, "newPub")?;
    let old_sig_hex = get_str(&env.payload, "oldKeySig")?;
    let old_pub_bytes = decode_multibase(&record.public_key)
        .ok_or_else(|| ClawError::SchemaViolation("stored public key is not valid multibase".into()))?;
    let sig_bytes = hex::decode(old_sig_hex)
        .map_err(|_| ClawError::SchemaViolation("oldKeySig is not valid hex".into()))?;
    let message = serde_json::json!({ "newPub": new_pub });
    let signing_bytes = claw_crypto::jcs::canonicalize(&message)?;
    let ok = claw_crypto::keypair::verify(&old_pub_bytes, &signing_bytes, &sig_bytes)?;
    if !ok {
        return Err(ClawError::SignatureMismatch { issuer: record.did.0.clone() });
    }
    Ok(())
}

fn decode_multibase(s: &str) -> Option<[u8; 32]> {
    let rest = s.strip_prefix('z')?;
    let bytes = bs58::decode(rest).into_vec().ok()?;
    bytes.try_into().ok()
}
