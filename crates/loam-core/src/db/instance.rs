use crate::{
    db::store::RowFields,
    model::entity::EntityModel,
    value::{RecordRef, Value},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};
use ulid::Ulid;

///
/// RecordId
///
/// Storage-assigned stable identity; per-entity autoincrement sequence.
///

pub type RecordId = u64;

///
/// LocalId
///
/// Handle an instance carries from construction until flush assigns its
/// record id. Local ids only ever resolve inside one pending set.
///

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize,
)]
pub struct LocalId(Ulid);

impl LocalId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

///
/// EntityInstance
///
/// In-memory record: a field map plus relation collections. Owned
/// collections added before persist drive cascade expansion; after a find,
/// the same map holds populated children.
///

#[derive(Clone, Debug)]
pub struct EntityInstance {
    model: &'static EntityModel,
    local_id: LocalId,
    record_id: Option<RecordId>,
    fields: RowFields,
    related: BTreeMap<String, Vec<EntityInstance>>,
}

impl EntityInstance {
    #[must_use]
    pub fn new(model: &'static EntityModel) -> Self {
        Self {
            model,
            local_id: LocalId::new(),
            record_id: None,
            fields: BTreeMap::new(),
            related: BTreeMap::new(),
        }
    }

    /// Rebuild an instance from a stored row.
    #[must_use]
    pub(crate) fn materialize(
        model: &'static EntityModel,
        record_id: RecordId,
        fields: RowFields,
    ) -> Self {
        Self {
            model,
            local_id: LocalId::new(),
            record_id: Some(record_id),
            fields,
            related: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn model(&self) -> &'static EntityModel {
        self.model
    }

    #[must_use]
    pub const fn local_id(&self) -> LocalId {
        self.local_id
    }

    #[must_use]
    pub const fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.record_id.is_some()
    }

    /// Reference other instances use to point at this one.
    #[must_use]
    pub const fn reference(&self) -> RecordRef {
        match self.record_id {
            Some(id) => RecordRef::Persisted(id),
            None => RecordRef::Local(self.local_id),
        }
    }

    /// Set a field value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    /// Point this instance's back-reference field at its owner.
    pub fn set_owner(&mut self, fk_field: impl Into<String>, owner: &Self) {
        self.set(fk_field, Value::Ref(owner.reference()));
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    #[must_use]
    pub const fn fields(&self) -> &RowFields {
        &self.fields
    }

    /// Add a child to an owned collection (drives cascade on persist).
    pub fn add_related(&mut self, relation: impl Into<String>, child: Self) {
        self.related.entry(relation.into()).or_default().push(child);
    }

    /// Borrow a relation's collection (owned before persist, populated
    /// after a find). Empty when the relation was never filled.
    #[must_use]
    pub fn related(&self, relation: &str) -> &[Self] {
        self.related.get(relation).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn take_related(&mut self, relation: &str) -> Vec<Self> {
        self.related.remove(relation).unwrap_or_default()
    }

    pub(crate) fn put_related(&mut self, relation: impl Into<String>, children: Vec<Self>) {
        self.related.insert(relation.into(), children);
    }

    /// Assign the flush-reserved identity. Called once, on commit success.
    pub(crate) fn assign_record_id(&mut self, id: RecordId) {
        debug_assert!(
            self.record_id.is_none(),
            "record id assigned more than once"
        );
        self.record_id = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{DRILL, SCREENING};

    #[test]
    fn fresh_instances_carry_distinct_local_ids() {
        let a = EntityInstance::new(&SCREENING);
        let b = EntityInstance::new(&SCREENING);

        assert_ne!(a.local_id(), b.local_id());
        assert!(!a.is_persisted());
    }

    #[test]
    fn reference_tracks_persistence_state() {
        let mut drill = EntityInstance::new(&DRILL);
        assert_eq!(drill.reference(), RecordRef::Local(drill.local_id()));

        drill.assign_record_id(7);
        assert_eq!(drill.reference(), RecordRef::Persisted(7));
        assert!(drill.is_persisted());
    }

    #[test]
    fn set_owner_writes_the_back_reference_field() {
        let screening = EntityInstance::new(&SCREENING);
        let mut drill = EntityInstance::new(&DRILL);
        drill.set_owner("screening", &screening);

        assert_eq!(
            drill.get("screening"),
            Some(&Value::Ref(RecordRef::Local(screening.local_id())))
        );
    }

    #[test]
    fn related_is_empty_until_filled() {
        let mut screening = EntityInstance::new(&SCREENING);
        assert!(screening.related("drills").is_empty());

        screening.add_related("drills", EntityInstance::new(&DRILL));
        assert_eq!(screening.related("drills").len(), 1);
    }
}
