//! Peer scoring (§4.9): every peer accumulates a score from valid/invalid
//! events delivered, duplicate rate, and malformed framing. A score below
//! `PEER_SCORE_BAN_THRESHOLD` triggers disconnection and a timed ban.

use std::collections::HashMap;

use claw_core::constants::{
    PEER_SCORE_BAN_SECS, PEER_SCORE_BAN_THRESHOLD, PEER_SCORE_DUPLICATE_PENALTY,
    PEER_SCORE_INITIAL, PEER_SCORE_INVALID_EVENT_PENALTY, PEER_SCORE_MALFORMED_FRAMING_PENALTY,
    PEER_SCORE_VALID_EVENT_REWARD,
};
use claw_core::types::Timestamp;
use libp2p::PeerId;

struct Entry {
    score: i64,
    banned_until: Option<Timestamp>,
}

impl Default for Entry {
    fn default() -> Self {
        Self { score: PEER_SCORE_INITIAL, banned_until: None }
    }
}

/// Tracks every known peer's running score and ban state.
#[derive(Default)]
pub struct PeerScoreBook {
    peers: HashMap<PeerId, Entry>,
}

impl PeerScoreBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn adjust(&mut self, peer: PeerId, delta: i64, now: Timestamp) {
        let entry = self.peers.entry(peer).or_default();
        entry.score += delta;
        if entry.score <= PEER_SCORE_BAN_THRESHOLD {
            entry.banned_until = Some(now + PEER_SCORE_BAN_SECS * 1000);
        }
    }

    pub fn note_valid_event(&mut self, peer: PeerId, now: Timestamp) {
        self.adjust(peer, PEER_SCORE_VALID_EVENT_REWARD, now);
    }

    pub fn note_invalid_event(&mut self, peer: PeerId, now: Timestamp) {
        self.adjust(peer, PEER_SCORE_INVALID_EVENT_PENALTY, now);
    }

    pub fn note_duplicate_event(&mut self, peer: PeerId, now: Timestamp) {
        self.adjust(peer, PEER_SCORE_DUPLICATE_PENALTY, now);
    }

    pub fn note_malformed_framing(&mut self, peer: PeerId, now: Timestamp) {
        self.adjust(peer, PEER_SCORE_MALFORMED_FRAMING_PENALTY, now);
    }

    /// A future-nonce buffer entry aged past its TTL without being drained
    /// counts against the issuing peer's score (§5).
    pub fn note_future_nonce_evicted(&mut self, peer: PeerId, now: Timestamp) {
        self.adjust(peer, PEER_SCORE_DUPLICATE_PENALTY, now);
    }

    pub fn score(&self, peer: &PeerId) -> i64 {
        self.peers.get(peer).map(|e| e.score).unwrap_or(PEER_SCORE_INITIAL)
    }

    /// Whether `peer` is currently under a timed ban. Clears an expired ban
    /// as a side effect so a stale `banned_until` doesn't linger forever.
    pub fn is_banned(&mut self, peer: &PeerId, now: Timestamp) -> bool {
        let Some(entry) = self.peers.get_mut(peer) else { return false };
        match entry.banned_until {
            Some(until) if now < until => true,
            Some(_) => {
                entry.banned_until = None;
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_invalid_events_trigger_a_ban() {
        let mut book = PeerScoreBook::new();
        let peer = PeerId::random();
        for _ in 0..15 {
            book.note_invalid_event(peer, 1_000);
        }
        assert!(book.score(&peer) <= PEER_SCORE_BAN_THRESHOLD);
        assert!(book.is_banned(&peer, 1_000));
    }

    #[test]
    fn ban_expires_after_duration() {
        let mut book = PeerScoreBook::new();
        let peer = PeerId::random();
        for _ in 0..15 {
            book.note_invalid_event(peer, 1_000);
        }
        assert!(book.is_banned(&peer, 1_000));
        assert!(!book.is_banned(&peer, 1_000 + PEER_SCORE_BAN_SECS * 1000 + 1));
    }

    #[test]
    fn valid_events_accumulate_positive_score() {
        let mut book = PeerScoreBook::new();
        let peer = PeerId::random();
        book.note_valid_event(peer, 1_000);
        book.note_valid_event(peer, 1_000);
        assert_eq!(book.score(&peer), 2 * PEER_SCORE_VALID_EVENT_REWARD);
        assert!(!book.is_banned(&peer, 1_000));
    }
}
