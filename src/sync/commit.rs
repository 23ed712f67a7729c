use std::collections::HashSet;
use std::sync::Arc;

use crate::app::Result;
use crate::domain::{Item, Platform};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Stored,
    Duplicate,
}

/// Ids already known to be stored, seeded from the store once per session.
#[derive(Debug, Default)]
pub struct SessionDedupSet {
    ids: HashSet<String>,
}

impl SessionDedupSet {
    /// Seed from the store. A failed load yields an empty set; the primary
    /// key still rejects duplicates, just with an extra round trip each.
    pub fn load(store: &dyn Store, platform: Platform) -> Self {
        match store.item_ids(platform) {
            Ok(ids) => {
                tracing::debug!(%platform, known = ids.len(), "Loaded session dedup set");
                Self { ids }
            }
            Err(e) => {
                tracing::warn!(%platform, error = %e, "Could not load stored ids");
                Self::default()
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Store-if-absent with a session cache in front.
pub struct Committer {
    store: Arc<dyn Store>,
    seen: SessionDedupSet,
}

impl Committer {
    pub fn new(store: Arc<dyn Store>, platform: Platform) -> Self {
        let seen = SessionDedupSet::load(store.as_ref(), platform);
        Self { store, seen }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn seen(&self) -> &SessionDedupSet {
        &self.seen
    }

    pub fn commit(&mut self, item: &Item) -> Result<CommitOutcome> {
        if self.seen.contains(item.id()) {
            return Ok(CommitOutcome::Duplicate);
        }

        let outcome = match self.store.insert_if_absent(item) {
            Ok(0) => CommitOutcome::Duplicate,
            Ok(_) => CommitOutcome::Stored,
            Err(e) if e.is_unique_violation() => CommitOutcome::Duplicate,
            Err(e) => return Err(e),
        };
        self.seen.insert(item.id());
        Ok(outcome)
    }
}
