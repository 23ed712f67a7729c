use std::collections::HashMap;

use crate::domain::{Frontier, Partition};
use crate::store::Store;

/// In-memory high-water marks, one per partition.
#[derive(Debug, Default)]
pub struct PartitionTracker {
    frontiers: HashMap<Partition, Frontier>,
}

impl PartitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the store's newest markers for `partitions` in one round trip.
    ///
    /// Fails open: when the store cannot answer, known frontiers are kept and
    /// unknown partitions stay `Empty`. Returns whether the lookup succeeded.
    pub fn load(&mut self, store: &dyn Store, partitions: &[Partition]) -> bool {
        match store.latest_frontiers(partitions) {
            Ok(found) => {
                for (partition, frontier) in found {
                    self.advance(&partition, frontier);
                }
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    partitions = partitions.len(),
                    "Frontier lookup failed, continuing with in-memory state"
                );
                false
            }
        }
    }

    pub fn frontier(&self, partition: &Partition) -> Frontier {
        self.frontiers.get(partition).cloned().unwrap_or_default()
    }

    /// Move the frontier forward. Candidates that are not strictly newer are
    /// ignored.
    pub fn advance(&mut self, partition: &Partition, candidate: Frontier) -> bool {
        let current = self.frontiers.entry(partition.clone()).or_default();
        if candidate.is_newer_than(current) {
            *current = candidate;
            true
        } else {
            false
        }
    }
}
