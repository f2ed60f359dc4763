//! Shared test fixtures: a `screening` entity owning ordered `drill`
//! children, graded by a closed enum set. Mirrors a small assessment app.

use crate::{
    db::{
        flush,
        instance::{EntityInstance, LocalId, RecordId},
        pending::PendingSet,
        query::Predicate,
        registry::EntityRegistry,
        session::{ConnectionConfig, Session},
        store::{MemoryStore, RowFields, StoragePort, StoredRow},
    },
    error::EngineError,
    model::{
        entity::EntityModel,
        field::{FieldKind, FieldModel},
        index::IndexModel,
        projection::ProjectionModel,
        relation::{RelationKind, RelationModel},
    },
    value::Value,
};
use std::sync::Arc;

pub(crate) const GRADES: &[&str] = &["1", "2", "3", "4", "5", "6"];
pub(crate) const SCREENING_KINDS: &[&str] =
    &["adjust_volume", "compare_images", "compare_numbers"];

static GRADE: FieldKind = FieldKind::Enum { members: GRADES };

pub(crate) static SCREENING: EntityModel = EntityModel {
    entity_name: "screening",
    identity: "id",
    fields: &[
        FieldModel::new("title", FieldKind::Text),
        FieldModel::new(
            "kind",
            FieldKind::Enum {
                members: SCREENING_KINDS,
            },
        ),
        FieldModel::new("grades", FieldKind::List(&GRADE)),
    ],
    relations: &[RelationModel {
        name: "drills",
        kind: RelationKind::OwningMany,
        target: "drill",
        fk_field: "screening",
        ordering: Some("position"),
        cascade: true,
    }],
    indexes: &[],
    projections: &[],
};

pub(crate) static DRILL: EntityModel = EntityModel {
    entity_name: "drill",
    identity: "id",
    fields: &[
        FieldModel::new("position", FieldKind::Uint),
        FieldModel::new("grades", FieldKind::List(&GRADE)),
        FieldModel::new(
            "screening",
            FieldKind::Ref {
                relation: "screening",
            },
        ),
    ],
    relations: &[RelationModel {
        name: "screening",
        kind: RelationKind::OwnedByOne,
        target: "screening",
        fk_field: "screening",
        ordering: None,
        cascade: false,
    }],
    indexes: &[IndexModel::new(&["position", "screening"], true)],
    projections: &[ProjectionModel {
        name: "kind",
        relation: "screening",
        source_field: "kind",
    }],
};

pub(crate) fn registry() -> EntityRegistry {
    let mut registry = EntityRegistry::new();
    registry
        .register(&SCREENING)
        .expect("screening registration should succeed");
    registry
        .register(&DRILL)
        .expect("drill registration should succeed");

    registry
}

pub(crate) fn registry_arc() -> Arc<EntityRegistry> {
    Arc::new(registry())
}

pub(crate) fn open_session() -> Session<MemoryStore> {
    Session::open(registry_arc(), ConnectionConfig::memory("assessments"))
        .expect("session should open")
}

pub(crate) fn grades_value(grades: &[&str]) -> Value {
    Value::List(
        grades
            .iter()
            .map(|grade| Value::Enum((*grade).to_string()))
            .collect(),
    )
}

pub(crate) fn screening(title: &str, kind: &str, grades: &[&str]) -> EntityInstance {
    EntityInstance::new(&SCREENING)
        .with("title", Value::Text(title.to_string()))
        .with("kind", Value::Enum(kind.to_string()))
        .with("grades", grades_value(grades))
}

pub(crate) fn drill(position: u64, grades: &[&str]) -> EntityInstance {
    EntityInstance::new(&DRILL)
        .with("position", Value::Uint(position))
        .with("grades", grades_value(grades))
}

pub(crate) fn screening_fields(title: &str, kind: &str, grades: &[&str]) -> RowFields {
    screening(title, kind, grades).fields().clone()
}

/// Containment predicate in list-needle form, as query callers write it.
pub(crate) fn screening_contains(grade: &str) -> Predicate {
    Predicate::contains(
        "grades",
        Value::List(vec![Value::Enum(grade.to_string())]),
    )
}

/// A pending set holding one screening root and `children` drills wired to
/// it by local reference, in insertion order root-first.
pub(crate) fn pending_graph(children: u64) -> (PendingSet, LocalId) {
    let root = screening("Screening One", "compare_images", &["4", "5"]);
    let root_id = root.local_id();

    let mut drills = Vec::new();
    for position in 1..=children {
        let mut child = drill(position, &["4", "5"]);
        child.set_owner("screening", &root);
        drills.push(child);
    }

    let mut pending = PendingSet::new();
    pending.insert(root);
    for child in drills {
        pending.insert(child);
    }

    (pending, root_id)
}

///
/// FailingStore
///
/// Port wrapper that injects a commit failure, for atomicity tests.
///

pub(crate) struct FailingStore {
    inner: MemoryStore,
}

impl FailingStore {
    pub(crate) fn fail_commit() -> Self {
        Self {
            inner: MemoryStore::new(),
        }
    }

    pub(crate) const fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl StoragePort for FailingStore {
    fn native_containment(&self) -> bool {
        self.inner.native_containment()
    }

    fn reserve_record_id(&mut self, entity: &str) -> RecordId {
        self.inner.reserve_record_id(entity)
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        self.inner.begin()
    }

    fn stage(
        &mut self,
        entity: &str,
        id: RecordId,
        fields: &RowFields,
    ) -> Result<(), EngineError> {
        self.inner.stage(entity, id, fields)
    }

    fn commit(&mut self) -> Result<u64, EngineError> {
        self.inner.rollback();

        Err(EngineError::store_internal("injected commit failure"))
    }

    fn rollback(&mut self) {
        self.inner.rollback();
    }

    fn get(&self, entity: &str, id: RecordId) -> Result<StoredRow, EngineError> {
        self.inner.get(entity, id)
    }

    fn scan(&self, entity: &str) -> Result<Vec<StoredRow>, EngineError> {
        self.inner.scan(entity)
    }

    fn scan_containing(
        &self,
        entity: &str,
        field: &str,
        needle: &Value,
    ) -> Result<Vec<StoredRow>, EngineError> {
        self.inner.scan_containing(entity, field, needle)
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn row_count(&self, entity: &str) -> u64 {
        self.inner.row_count(entity)
    }
}

///
/// NoNativeStore
///
/// Port wrapper without a native membership operator; the translator must
/// decide containment by enumerating candidate rows.
///

pub(crate) struct NoNativeStore {
    inner: MemoryStore,
}

impl NoNativeStore {
    /// A store pre-seeded with one flushed screening graph of three drills.
    pub(crate) fn seeded() -> Self {
        let mut inner = MemoryStore::new();
        let (mut pending, _) = pending_graph(3);
        flush::execute(&mut inner, &mut pending, None).expect("seed flush should succeed");

        Self { inner }
    }
}

impl StoragePort for NoNativeStore {
    fn native_containment(&self) -> bool {
        false
    }

    fn reserve_record_id(&mut self, entity: &str) -> RecordId {
        self.inner.reserve_record_id(entity)
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        self.inner.begin()
    }

    fn stage(
        &mut self,
        entity: &str,
        id: RecordId,
        fields: &RowFields,
    ) -> Result<(), EngineError> {
        self.inner.stage(entity, id, fields)
    }

    fn commit(&mut self) -> Result<u64, EngineError> {
        self.inner.commit()
    }

    fn rollback(&mut self) {
        self.inner.rollback();
    }

    fn get(&self, entity: &str, id: RecordId) -> Result<StoredRow, EngineError> {
        self.inner.get(entity, id)
    }

    fn scan(&self, entity: &str) -> Result<Vec<StoredRow>, EngineError> {
        self.inner.scan(entity)
    }

    fn scan_containing(
        &self,
        _entity: &str,
        _field: &str,
        _needle: &Value,
    ) -> Result<Vec<StoredRow>, EngineError> {
        Err(EngineError::store_internal(
            "containment pushdown on an engine without a native membership operator",
        ))
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn row_count(&self, entity: &str) -> u64 {
        self.inner.row_count(entity)
    }
}
