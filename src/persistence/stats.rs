//! Process-lifetime save counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the save coordinator. Reset only on restart.
#[derive(Debug, Default)]
pub struct SaveStatistics {
    save_count: AtomicU64,
    save_error_count: AtomicU64,
    conflict_undo: AtomicU64,
    conflict_normal: AtomicU64,
}

/// Point-in-time copy of [`SaveStatistics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaveCounts {
    pub saves: u64,
    pub errors: u64,
    pub conflicts_undo: u64,
    pub conflicts_normal: u64,
}

impl SaveCounts {
    /// Conflicts of both kinds.
    pub fn conflicts(&self) -> u64 {
        self.conflicts_undo + self.conflicts_normal
    }
}

impl SaveStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_save(&self) {
        self.save_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.save_error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a write that overwrote an existing version.
    pub fn record_conflict(&self, undo_enabled: bool) {
        let counter = if undo_enabled {
            &self.conflict_undo
        } else {
            &self.conflict_normal
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SaveCounts {
        SaveCounts {
            saves: self.save_count.load(Ordering::Relaxed),
            errors: self.save_error_count.load(Ordering::Relaxed),
            conflicts_undo: self.conflict_undo.load(Ordering::Relaxed),
            conflicts_normal: self.conflict_normal.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_split_by_undo() {
        let stats = SaveStatistics::new();
        stats.record_save();
        stats.record_save();
        stats.record_conflict(true);
        stats.record_conflict(false);
        stats.record_conflict(false);
        stats.record_error();

        let counts = stats.snapshot();
        assert_eq!(counts.saves, 2);
        assert_eq!(counts.errors, 1);
        assert_eq!(counts.conflicts_undo, 1);
        assert_eq!(counts.conflicts_normal, 2);
        assert_eq!(counts.conflicts(), 3);
    }
}
