//! Snapshot Hashing for Verification
//!
//! Provides deterministic digests of serialized game state for:
//! - Audit logging of saves, restores and rollbacks
//! - Verifying that a restored version matches what was written

use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type SnapshotHash = [u8; 32];

/// Domain separator for serialized game snapshots.
const SNAPSHOT_DOMAIN: &[u8] = b"TURNKEEP_SNAPSHOT_V1";

/// Incremental hasher with a domain separator.
pub struct SnapshotHasher {
    hasher: Sha256,
}

impl SnapshotHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for snapshot payloads.
    pub fn for_snapshot() -> Self {
        Self::new(SNAPSHOT_DOMAIN)
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a length-prefixed string.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u32(value.len() as u32);
        self.hasher.update(value.as_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> SnapshotHash {
        self.hasher.finalize().into()
    }
}

/// Digest of one stored version: game id, save id and payload.
pub fn snapshot_digest(game_id: &str, save_id: u32, payload: &str) -> SnapshotHash {
    let mut hasher = SnapshotHasher::for_snapshot();
    hasher.update_str(game_id);
    hasher.update_u32(save_id);
    hasher.update_str(payload);
    hasher.finalize()
}

/// Short hex form of a digest for log lines.
pub fn short_hex(hash: &SnapshotHash) -> String {
    hex::encode(&hash[..6])
}
