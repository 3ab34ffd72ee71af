//! Concurrent record-id deduplication.
use std::sync::Arc;

use dashmap::DashSet;

/// Set of identifiers already admitted to the aggregate.
///
/// Clones share the same set. `DashSet::insert` reports whether the id was
/// new, so two tasks racing on one id can never both admit it.
#[derive(Clone, Debug, Default)]
pub struct Deduplicator {
    seen: Arc<DashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn add(&self, id: impl Into<String>) {
        self.seen.insert(id.into());
    }

    /// Ids not seen before, in input order; each is marked seen.
    pub fn filter_new<I, S>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter()
            .map(Into::into)
            .filter(|id| self.seen.insert(id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&self) {
        self.seen.clear();
    }
}
