use crate::db::instance::{EntityInstance, LocalId};
use derive_more::Deref;
use std::collections::HashSet;

///
/// PendingSet
///
/// Ordered staging area for instances awaiting flush. Insertion order is
/// preserved for deterministic dependency-respecting writes; membership is
/// deduplicated by local id, so persist is idempotent.
///

#[derive(Default, Deref)]
pub struct PendingSet {
    #[deref]
    items: Vec<EntityInstance>,
    seen: HashSet<LocalId>,
}

impl PendingSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance unless it is already pending. Returns whether the
    /// instance was inserted.
    pub fn insert(&mut self, instance: EntityInstance) -> bool {
        if !self.seen.insert(instance.local_id()) {
            return false;
        }

        self.items.push(instance);
        true
    }

    #[must_use]
    pub fn contains(&self, local_id: LocalId) -> bool {
        self.seen.contains(&local_id)
    }

    /// Look up a pending instance by local id.
    #[must_use]
    pub fn find(&self, local_id: LocalId) -> Option<&EntityInstance> {
        self.items.iter().find(|item| item.local_id() == local_id)
    }

    /// Remove one instance without writing it.
    pub fn detach(&mut self, local_id: LocalId) -> Option<EntityInstance> {
        if !self.seen.remove(&local_id) {
            return None;
        }

        let index = self
            .items
            .iter()
            .position(|item| item.local_id() == local_id)?;

        Some(self.items.remove(index))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut EntityInstance> {
        self.items.iter_mut()
    }

    /// Drop every pending instance (flush success or forced close).
    pub(crate) fn clear(&mut self) {
        self.items.clear();
        self.seen.clear();
    }
}
