use serde::{Deserialize, Serialize};

/// Counts reported by a finished reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Remote items fetched
    pub fetched: u64,
    /// Items added remotely
    pub added: u64,
    /// Items removed remotely
    pub removed: u64,
    /// Items left out after a failed or abandoned operation
    pub skipped: u64,
}

impl SyncReport {
    /// Folds another container's report into this one.
    pub fn absorb(&mut self, other: SyncReport) {
        self.fetched += other.fetched;
        self.added += other.added;
        self.removed += other.removed;
        self.skipped += other.skipped;
    }

    pub fn changed(&self) -> u64 {
        self.added + self.removed
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fetched {}, added {}, removed {}, skipped {}",
            self.fetched, self.added, self.removed, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_sums_counts() {
        let mut total = SyncReport {
            fetched: 10,
            added: 1,
            ..Default::default()
        };
        total.absorb(SyncReport {
            fetched: 5,
            added: 2,
            removed: 3,
            skipped: 1,
        });
        assert_eq!(
            total,
            SyncReport {
                fetched: 15,
                added: 3,
                removed: 3,
                skipped: 1
            }
        );
        assert_eq!(total.changed(), 6);
        assert_eq!(total.to_string(), "fetched 15, added 3, removed 3, skipped 1");
    }
}
