//! Duplicate detection for sink-bound audio chunks.
//!
//! Synthesized speech can reach the tap twice (retransmission or duplicate
//! delivery from an upstream stage); feeding the same chunk twice would
//! double-drive the motion synthesizer. Digests are scoped to one speaking
//! turn and the set is bounded two ways: a hard capacity enforced on every
//! insert, and a checkpoint every `PRUNE_INTERVAL` insertions that truncates
//! down to the most recent `RETAIN_CEILING` entries.

use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};

/// Insertions between prune checkpoints
pub const PRUNE_INTERVAL: usize = 1000;
/// Entries kept after a prune checkpoint fires
pub const RETAIN_CEILING: usize = 100;
/// Hard capacity: oldest entries are evicted as soon as this is exceeded
pub const MAX_DIGESTS: usize = 1024;

/// 128-bit content fingerprint of a chunk's bytes.
pub type ChunkDigest = [u8; 16];

pub fn chunk_digest(data: &[u8]) -> ChunkDigest {
    let hash = Sha256::digest(data);
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&hash[..16]);
    digest
}

/// Insertion-ordered set of chunk digests seen in the current speaking turn.
#[derive(Debug, Default)]
pub struct SeenChunks {
    set: HashSet<ChunkDigest>,
    order: VecDeque<ChunkDigest>,
    inserts_since_prune: usize,
}

impl SeenChunks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a digest. Returns `true` when it has not been seen this turn,
    /// i.e. the chunk should be forwarded to the motion sink.
    pub fn insert(&mut self, digest: ChunkDigest) -> bool {
        if self.set.contains(&digest) {
            return false;
        }
        self.set.insert(digest);
        self.order.push_back(digest);
        if self.order.len() > MAX_DIGESTS {
            self.evict_oldest();
        }

        self.inserts_since_prune += 1;
        if self.inserts_since_prune >= PRUNE_INTERVAL {
            if self.order.len() > RETAIN_CEILING {
                while self.order.len() > RETAIN_CEILING {
                    self.evict_oldest();
                }
            }
            self.inserts_since_prune = 0;
        }
        true
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            self.set.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Turn boundary: forget every digest. The checkpoint counter keeps
    /// running so the periodic prune stays independent of turn length.
    pub fn clear(&mut self) {
        self.set.clear();
        self.order.clear();
    }

    /// Session boundary: forget everything, checkpoint counter included.
    pub fn reset(&mut self) {
        self.clear();
        self.inserts_since_prune = 0;
    }
}
