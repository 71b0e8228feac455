//! The append-only event log and its secondary indexes (C5, §4.5). Grounded
//! on `chronx-state/src/db.rs`'s sled-tree-per-concern layout; generalized
//! from account/vertex/timelock storage to hash-addressed envelope storage
//! with issuer-nonce and resource-head indexes plus a log cursor.

use std::path::Path;

use claw_core::error::ClawError;
use claw_core::types::{Cursor, Did, EventHash, Nonce, ResourceId};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventMeta {
    issuer: String,
    nonce: u64,
    resource_key: Option<String>,
}

/// The durable event log plus the indexes maintained atomically with it.
///
/// Named trees:
///   events        — hash(32B)         → canonical envelope bytes
///   event_meta    — hash(32B)         → bincode(EventMeta), used for rebuild
///   event_cursor  — hash(32B)         → cursor (8B be), for idempotent append
///   cursor_hash    — cursor(8B be)     → hash(32B), for ordered range scan
///   issuer_nonce  — "<did>:<nonce>"   → hash(32B)
///   issuer_head   — did bytes         → nonce (8B be)
///   resource_head — resource index key → hash(32B)
///   meta          — "next_cursor"     → cursor (8B be)
pub struct EventLog {
    db: sled::Db,
    events: sled::Tree,
    event_meta: sled::Tree,
    event_cursor: sled::Tree,
    cursor_hash: sled::Tree,
    issuer_nonce: sled::Tree,
    issuer_head: sled::Tree,
    resource_head: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: impl ToString) -> ClawError {
    ClawError::Storage(e.to_string())
}

impl EventLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ClawError> {
        let db = sled::open(path).map_err(storage_err)?;
        Ok(Self {
            events: db.open_tree("events").map_err(storage_err)?,
            event_meta: db.open_tree("event_meta").map_err(storage_err)?,
            event_cursor: db.open_tree("event_cursor").map_err(storage_err)?,
            cursor_hash: db.open_tree("cursor_hash").map_err(storage_err)?,
            issuer_nonce: db.open_tree("issuer_nonce").map_err(storage_err)?,
            issuer_head: db.open_tree("issuer_head").map_err(storage_err)?,
            resource_head: db.open_tree("resource_head").map_err(storage_err)?,
            meta: db.open_tree("meta").map_err(storage_err)?,
            db,
        })
    }

    fn issuer_nonce_key(issuer: &Did, nonce: Nonce) -> Vec<u8> {
        format!("{}:{:020}", issuer.0, nonce).into_bytes()
    }

    fn next_cursor(&self) -> Result<Cursor, ClawError> {
        let raw = self
            .meta
            .get(b"next_cursor")
            .map_err(storage_err)?;
        Ok(match raw {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_ref().try_into().map_err(|_| ClawError::Storage("corrupt next_cursor".into()))?;
                Cursor(u64::from_be_bytes(arr))
            }
            None => Cursor::START,
        })
    }

    /// Idempotent append: re-appending an already-committed hash is a no-op
    /// that returns the hash's original cursor. Updates the issuer-nonce and
    /// resource-head indexes atomically with the log entry.
    pub fn append(
        &self,
        issuer: &Did,
        nonce: Nonce,
        resource: Option<&ResourceId>,
        hash: EventHash,
        canonical_bytes: &[u8],
    ) -> Result<Cursor, ClawError> {
        if let Some(existing) = self.event_cursor.get(hash.as_bytes()).map_err(storage_err)? {
            let arr: [u8; 8] = existing.as_ref().try_into().map_err(|_| ClawError::Storage("corrupt event_cursor".into()))?;
            debug!(hash = %hash, "append is idempotent no-op");
            return Ok(Cursor(u64::from_be_bytes(arr)));
        }

        let cursor = self.next_cursor()?;
        let meta = EventMeta {
            issuer: issuer.0.clone(),
            nonce,
            resource_key: resource.map(ResourceId::index_key),
        };
        let meta_bytes = bincode::serialize(&meta).map_err(storage_err)?;

        // Ordered so a crash mid-append leaves at worst a dangling `events`
        // entry with no cursor pointing at it yet, never a cursor or index
        // entry referencing a hash that isn't durably stored. `next_cursor`
        // is bumped last so a retried append after a crash recomputes the
        // same cursor value and overwrites idempotently.
        self.events.insert(hash.as_bytes().as_slice(), canonical_bytes).map_err(storage_err)?;
        self.event_meta.insert(hash.as_bytes().as_slice(), meta_bytes.as_slice()).map_err(storage_err)?;
        self.event_cursor.insert(hash.as_bytes().as_slice(), &cursor.0.to_be_bytes()).map_err(storage_err)?;
        self.cursor_hash.insert(&cursor.0.to_be_bytes(), hash.as_bytes().as_slice()).map_err(storage_err)?;
        self.issuer_nonce
            .insert(Self::issuer_nonce_key(issuer, nonce), hash.as_bytes().as_slice())
            .map_err(storage_err)?;
        self.issuer_head
            .insert(issuer.0.as_bytes(), &nonce.to_be_bytes())
            .map_err(storage_err)?;
        if let Some(r) = resource {
            self.resource_head
                .insert(r.index_key().as_bytes(), hash.as_bytes().as_slice())
                .map_err(storage_err)?;
        }
        self.meta
            .insert(b"next_cursor".as_slice(), &cursor.next().0.to_be_bytes())
            .map_err(storage_err)?;

        Ok(cursor)
    }

    pub fn get(&self, hash: &EventHash) -> Result<Option<Vec<u8>>, ClawError> {
        Ok(self.events.get(hash.as_bytes()).map_err(storage_err)?.map(|v| v.to_vec()))
    }

    /// Highest committed nonce for `issuer`, or 0 if none.
    pub fn issuer_head(&self, issuer: &Did) -> Result<Nonce, ClawError> {
        match self.issuer_head.get(issuer.0.as_bytes()).map_err(storage_err)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_ref().try_into().map_err(|_| ClawError::Storage("corrupt issuer_head".into()))?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    pub fn resource_head(&self, resource: &ResourceId) -> Result<Option<EventHash>, ClawError> {
        match self
            .resource_head
            .get(resource.index_key().as_bytes())
            .map_err(storage_err)?
        {
            Some(bytes) => {
                let arr: [u8; 32] = bytes.as_ref().try_into().map_err(|_| ClawError::Storage("corrupt resource_head".into()))?;
                Ok(Some(EventHash::from_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// Look up the committed hash for a given `(issuer, nonce)`, used by the
    /// pipeline to detect `NonceConflict` (same nonce, different hash).
    pub fn hash_at_nonce(&self, issuer: &Did, nonce: Nonce) -> Result<Option<EventHash>, ClawError> {
        match self
            .issuer_nonce
            .get(Self::issuer_nonce_key(issuer, nonce))
            .map_err(storage_err)?
        {
            Some(bytes) => {
                let arr: [u8; 32] = bytes.as_ref().try_into().map_err(|_| ClawError::Storage("corrupt issuer_nonce".into()))?;
                Ok(Some(EventHash::from_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// `(events, nextCursor)` starting at `from` (inclusive), up to `limit`
    /// entries. Unknown/past-the-end cursors return an empty page whose
    /// `nextCursor` equals `from`.
    pub fn range_from_cursor(&self, from: Cursor, limit: usize) -> Result<(Vec<(EventHash, Vec<u8>)>, Cursor), ClawError> {
        let mut out = Vec::with_capacity(limit.min(1024));
        let mut cursor = from;
        for item in self.cursor_hash.range(from.0.to_be_bytes()..) {
            if out.len() >= limit {
                break;
            }
            let (key, hash_bytes) = item.map_err(storage_err)?;
            let key_arr: [u8; 8] = key.as_ref().try_into().map_err(|_| ClawError::Storage("corrupt cursor key".into()))?;
            let hash_arr: [u8; 32] = hash_bytes.as_ref().try_into().map_err(|_| ClawError::Storage("corrupt cursor value".into()))?;
            let hash = EventHash::from_bytes(hash_arr);
            let bytes = self.get(&hash)?.ok_or_else(|| ClawError::Storage("dangling cursor entry".into()))?;
            out.push((hash, bytes));
            cursor = Cursor(u64::from_be_bytes(key_arr)).next();
        }
        Ok((out, cursor))
    }

    pub fn flush(&self) -> Result<(), ClawError> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    /// Re-derive `issuer_nonce`/`issuer_head`/`resource_head` from the
    /// durable `events`/`event_meta`/`cursor_hash` trees. Used after a crash
    /// that may have left the cheaper, non-transactional reader caches
    /// (none currently exist) inconsistent, and exercised directly in tests
    /// to assert index-rebuild equals live indexing.
    pub fn rebuild_indexes(&self) -> Result<(), ClawError> {
        self.issuer_nonce.clear().map_err(storage_err)?;
        self.issuer_head.clear().map_err(storage_err)?;
        self.resource_head.clear().map_err(storage_err)?;

        for item in self.cursor_hash.iter() {
            let (_, hash_bytes) = item.map_err(storage_err)?;
            let hash_arr: [u8; 32] = hash_bytes.as_ref().try_into().map_err(|_| ClawError::Storage("corrupt cursor_hash".into()))?;
            let meta_bytes = self
                .event_meta
                .get(&hash_arr)
                .map_err(storage_err)?
                .ok_or_else(|| ClawError::Storage("missing event_meta during rebuild".into()))?;
            let meta: EventMeta = bincode::deserialize(&meta_bytes).map_err(storage_err)?;

            self.issuer_nonce
                .insert(format!("{}:{:020}", meta.issuer, meta.nonce).into_bytes(), hash_arr.as_slice())
                .map_err(storage_err)?;
            self.issuer_head
                .insert(meta.issuer.as_bytes(), &meta.nonce.to_be_bytes())
                .map_err(storage_err)?;
            if let Some(key) = meta.resource_key {
                self.resource_head.insert(key.as_bytes(), hash_arr.as_slice()).map_err(storage_err)?;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.events.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_core::types::ResourceKind;

    fn temp_log() -> EventLog {
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!("claw-log-test-{}-{}", std::process::id(), nanos));
        EventLog::open(p).unwrap()
    }

    fn hash_of(n: u8) -> EventHash {
        EventHash::from_bytes([n; 32])
    }

    #[test]
    fn append_is_idempotent() {
        let log = temp_log();
        let did = Did("did:claw:zTest".to_string());
        let resource = ResourceId::new(ResourceKind::Wallet, "clawAlice");
        let c1 = log.append(&did, 1, Some(&resource), hash_of(1), b"bytes-a").unwrap();
        let c2 = log.append(&did, 1, Some(&resource), hash_of(1), b"bytes-a").unwrap();
        assert_eq!(c1, c2);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn issuer_head_and_resource_head_advance() {
        let log = temp_log();
        let did = Did("did:claw:zTest".to_string());
        let resource = ResourceId::new(ResourceKind::Wallet, "clawAlice");
        log.append(&did, 1, Some(&resource), hash_of(1), b"a").unwrap();
        log.append(&did, 2, Some(&resource), hash_of(2), b"b").unwrap();
        assert_eq!(log.issuer_head(&did).unwrap(), 2);
        assert_eq!(log.resource_head(&resource).unwrap(), Some(hash_of(2)));
    }

    #[test]
    fn range_from_cursor_paginates_in_append_order() {
        let log = temp_log();
        let did = Did("did:claw:zTest".to_string());
        for i in 1..=5u8 {
            log.append(&did, i as u64, None, hash_of(i), format!("bytes-{i}").as_bytes()).unwrap();
        }
        let (page1, cursor) = log.range_from_cursor(Cursor::START, 2).unwrap();
        assert_eq!(page1.len(), 2);
        let (page2, _) = log.range_from_cursor(cursor, 10).unwrap();
        assert_eq!(page2.len(), 3);
    }

    #[test]
    fn rebuild_indexes_matches_live_indexing() {
        let log = temp_log();
        let did = Did("did:claw:zTest".to_string());
        let resource = ResourceId::new(ResourceKind::Wallet, "clawAlice");
        log.append(&did, 1, Some(&resource), hash_of(1), b"a").unwrap();
        log.append(&did, 2, Some(&resource), hash_of(2), b"b").unwrap();
        let before_head = log.issuer_head(&did).unwrap();
        let before_resource = log.resource_head(&resource).unwrap();
        log.rebuild_indexes().unwrap();
        assert_eq!(log.issuer_head(&did).unwrap(), before_head);
        assert_eq!(log.resource_head(&resource).unwrap(), before_resource);
    }

    #[test]
    fn hash_at_nonce_detects_conflict_candidates() {
        let log = temp_log();
        let did = Did("did:claw:zTest".to_string());
        log.append(&did, 1, None, hash_of(1), b"a").unwrap();
        assert_eq!(log.hash_at_nonce(&did, 1).unwrap(), Some(hash_of(1)));
        assert_eq!(log.hash_at_nonce(&did, 2).unwrap(), None);
    }
}
