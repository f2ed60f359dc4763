use crate::{
    db::{
        instance::{EntityInstance, LocalId, RecordId},
        pending::PendingSet,
        store::{RowFields, StoragePort, StoredRow},
    },
    error::{EngineError, ErrorClass, ErrorOrigin},
    model::entity::EntityModel,
    obs::sink::{self, MetricsEvent},
    validate::{ValidateError, validate_row},
    value::{RecordRef, Value, compare_eq},
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    time::Instant,
};
use thiserror::Error as ThisError;

///
/// FlushReport
///
/// Outcome of one successful flush: identities assigned per local id.
///

#[derive(Clone, Debug, Default)]
pub struct FlushReport {
    pub assigned: BTreeMap<LocalId, RecordId>,
    pub rows_written: u64,
    pub rows_by_entity: BTreeMap<&'static str, u64>,
}

///
/// FlushError
///
/// Flush is all-or-nothing: every variant below leaves the batch rolled
/// back, the pending set unchanged, and no identity assigned.
///

#[derive(Debug, ThisError)]
pub enum FlushError {
    #[error("cyclic ownership among pending instances: {entities}")]
    CyclicOwnership { entities: String },

    #[error("field '{field}' on '{entity}' references an instance that is neither pending nor persisted")]
    DanglingOwner { entity: String, field: String },

    #[error(transparent)]
    Validate(#[from] ValidateError),

    #[error("unique index violation: {entity} {index}")]
    UniqueViolation { entity: String, index: String },

    #[error("flush deadline expired; batch rolled back")]
    DeadlineExpired,

    #[error("flush failed; batch rolled back: {source}")]
    Failed {
        #[source]
        source: EngineError,
    },
}

impl FlushError {
    pub(crate) fn class(&self) -> ErrorClass {
        match self {
            Self::CyclicOwnership { .. } | Self::DanglingOwner { .. } => {
                ErrorClass::InvariantViolation
            }
            Self::Validate(err) => err.class(),
            Self::UniqueViolation { .. } => ErrorClass::Conflict,
            Self::DeadlineExpired => ErrorClass::Internal,
            Self::Failed { source } => source.class,
        }
    }
}

impl From<FlushError> for EngineError {
    fn from(err: FlushError) -> Self {
        Self::new(err.class(), ErrorOrigin::Pending, err.to_string())
    }
}

impl From<EngineError> for FlushError {
    fn from(source: EngineError) -> Self {
        Self::Failed { source }
    }
}

///
/// BatchGuard
///
/// Holds the open staged batch; dropping the guard without `commit` rolls
/// the batch back, so every early return in flush leaves storage untouched.
///

struct BatchGuard<'a, P: StoragePort + ?Sized> {
    port: &'a mut P,
    finished: bool,
}

impl<'a, P: StoragePort + ?Sized> BatchGuard<'a, P> {
    fn open(port: &'a mut P) -> Result<Self, EngineError> {
        port.begin()?;

        Ok(Self {
            port,
            finished: false,
        })
    }

    fn reserve(&mut self, entity: &str) -> RecordId {
        self.port.reserve_record_id(entity)
    }

    fn stage(&mut self, entity: &str, id: RecordId, fields: &RowFields) -> Result<(), EngineError> {
        self.port.stage(entity, id, fields)
    }

    fn get(&self, entity: &str, id: RecordId) -> Result<StoredRow, EngineError> {
        self.port.get(entity, id)
    }

    fn scan(&self, entity: &str) -> Result<Vec<StoredRow>, EngineError> {
        self.port.scan(entity)
    }

    fn commit(mut self) -> Result<u64, EngineError> {
        self.finished = true;

        let result = self.port.commit();
        if result.is_err() {
            // Close the batch window so the caller can retry the flush.
            self.port.rollback();
        }

        result
    }
}

impl<P: StoragePort + ?Sized> Drop for BatchGuard<'_, P> {
    fn drop(&mut self) {
        if !self.finished {
            self.port.rollback();
        }
    }
}

/// Write the pending set in one atomic batch.
///
/// Owners are written before the children that need their identity; on any
/// failure the batch is rolled back and the pending set is left unchanged.
pub(crate) fn execute<P: StoragePort + ?Sized>(
    port: &mut P,
    pending: &mut PendingSet,
    deadline: Option<Instant>,
) -> Result<FlushReport, FlushError> {
    // Re-flushing an already-flushed, empty pending set is a no-op.
    if pending.is_empty() {
        return Ok(FlushReport::default());
    }

    // Phase 1: dependency-respecting write order.
    let order = write_order(pending)?;

    // Phase 2: stage every row inside one batch window.
    let mut guard = BatchGuard::open(port)?;
    let mut assigned: BTreeMap<LocalId, RecordId> = BTreeMap::new();
    let mut rows_by_entity: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut staged_unique: HashSet<(String, Vec<u8>)> = HashSet::new();

    for &index in &order {
        if expired(deadline) {
            return Err(FlushError::DeadlineExpired);
        }

        let instance = &pending[index];
        let model = instance.model();
        let mut fields = instance.fields().clone();

        rewrite_owner_refs(&guard, instance, &mut fields, &assigned)?;
        validate_row(model, &fields)?;

        let id = guard.reserve(model.entity_name);
        assigned.insert(instance.local_id(), id);

        enforce_unique(&guard, model, &fields, &mut staged_unique)?;
        guard.stage(model.entity_name, id, &fields)?;
        *rows_by_entity.entry(model.entity_name).or_insert(0) += 1;
    }

    if expired(deadline) {
        return Err(FlushError::DeadlineExpired);
    }
    let rows_written = guard.commit()?;

    // Phase 3: success — assign identities exactly once, then clear.
    let report = FlushReport {
        assigned,
        rows_written,
        rows_by_entity,
    };
    for instance in pending.iter_mut() {
        if let Some(id) = report.assigned.get(&instance.local_id()) {
            instance.assign_record_id(*id);
        }
    }
    pending.clear();

    Ok(report)
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

// Topological walk over ownership edges (Kahn), preferring the lowest
// original index so the write order is deterministic.
fn write_order(pending: &PendingSet) -> Result<Vec<usize>, FlushError> {
    let index_of: HashMap<LocalId, usize> = pending
        .iter()
        .enumerate()
        .map(|(index, instance)| (instance.local_id(), index))
        .collect();

    let len = pending.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); len];
    let mut indegree = vec![0usize; len];

    for (index, instance) in pending.iter().enumerate() {
        for (field, value) in instance.fields() {
            let Value::Ref(RecordRef::Local(local_id)) = value else {
                continue;
            };
            let Some(&owner) = index_of.get(local_id) else {
                return Err(FlushError::DanglingOwner {
                    entity: instance.model().entity_name.to_string(),
                    field: field.clone(),
                });
            };
            dependents[owner].push(index);
            indegree[index] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| index)
        .collect();
    let mut order = Vec::with_capacity(len);

    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);

        for &child in &dependents[next] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() < len {
        let entities = indegree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(index, _)| pending[index].model().entity_name)
            .collect::<Vec<_>>()
            .join(", ");

        return Err(FlushError::CyclicOwnership { entities });
    }

    Ok(order)
}

// Rewrite local owner references to their reserved identities and verify
// persisted references still resolve.
fn rewrite_owner_refs<P: StoragePort + ?Sized>(
    guard: &BatchGuard<'_, P>,
    instance: &EntityInstance,
    fields: &mut RowFields,
    assigned: &BTreeMap<LocalId, RecordId>,
) -> Result<(), FlushError> {
    let model = instance.model();

    for (field, value) in fields.iter_mut() {
        match value {
            Value::Ref(RecordRef::Local(local_id)) => {
                // Write order puts owners first, so the id is reserved.
                let Some(&id) = assigned.get(local_id) else {
                    return Err(FlushError::DanglingOwner {
                        entity: model.entity_name.to_string(),
                        field: field.clone(),
                    });
                };
                *value = Value::Ref(RecordRef::Persisted(id));
            }
            Value::Ref(RecordRef::Persisted(id)) => {
                let Some(relation) = model
                    .relations
                    .iter()
                    .find(|relation| relation.is_owned_by_one() && relation.fk_field == field.as_str())
                else {
                    continue;
                };
                let lookup = guard.get(relation.target, *id);
                match lookup {
                    Ok(_) => {}
                    Err(err) if err.is_not_found() => {
                        return Err(FlushError::DanglingOwner {
                            entity: model.entity_name.to_string(),
                            field: field.clone(),
                        });
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            _ => {}
        }
    }

    Ok(())
}

// Enforce composite unique indexes against both the staged batch and the
// committed rows. Tuples with null members never collide.
fn enforce_unique<P: StoragePort + ?Sized>(
    guard: &BatchGuard<'_, P>,
    model: &EntityModel,
    fields: &RowFields,
    staged_unique: &mut HashSet<(String, Vec<u8>)>,
) -> Result<(), FlushError> {
    for index in model.indexes.iter().filter(|index| index.unique) {
        let tuple: Vec<Value> = index
            .fields
            .iter()
            .map(|field| fields.get(*field).cloned().unwrap_or(Value::Null))
            .collect();
        if tuple.iter().any(Value::is_null) {
            continue;
        }

        let violation = || {
            sink::record(MetricsEvent::UniqueViolation {
                entity: model.entity_name,
            });
            FlushError::UniqueViolation {
                entity: model.entity_name.to_string(),
                index: index.to_string(),
            }
        };

        let key = serde_cbor::to_vec(&tuple)
            .map_err(|err| EngineError::serialize_internal(format!("index key encode failed: {err}")))?;
        if !staged_unique.insert((format!("{}{index}", model.entity_name), key)) {
            return Err(violation());
        }

        for row in guard.scan(model.entity_name)? {
            let collides = index.fields.iter().zip(&tuple).all(|(field, wanted)| {
                row.fields
                    .get(*field)
                    .is_some_and(|stored| compare_eq(stored, wanted).unwrap_or(false))
            });
            if collides {
                return Err(violation());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::store::MemoryStore,
        test_support::{FailingStore, drill, pending_graph, screening},
    };
    use std::time::Duration;

    #[test]
    fn empty_pending_set_flushes_as_a_no_op() {
        let mut store = MemoryStore::new();
        let mut pending = PendingSet::new();

        let report = execute(&mut store, &mut pending, None).expect("no-op flush succeeds");
        assert!(report.assigned.is_empty());
        assert_eq!(report.rows_written, 0);
    }

    #[test]
    fn owners_are_written_before_children_and_refs_rewritten() {
        let mut store = MemoryStore::new();
        let (mut pending, root_id) = pending_graph(3);

        let report = execute(&mut store, &mut pending, None).expect("flush should succeed");
        assert_eq!(report.rows_written, 4);
        assert!(pending.is_empty());

        let screening_id = report.assigned[&root_id];
        let rows = store.scan("drill").expect("drill scan succeeds");
        assert_eq!(rows.len(), 3);
        for row in rows {
            assert_eq!(
                row.fields.get("screening"),
                Some(&Value::Ref(RecordRef::Persisted(screening_id)))
            );
        }
    }

    #[test]
    fn flush_is_atomic_under_storage_failure() {
        let mut store = FailingStore::fail_commit();
        let (mut pending, _) = pending_graph(2);
        let before = pending.len();

        let err = execute(&mut store, &mut pending, None).expect_err("commit failure surfaces");
        assert!(matches!(err, FlushError::Failed { .. }));

        // No identity assigned, pending untouched, nothing visible in storage.
        assert_eq!(pending.len(), before);
        assert!(pending.iter().all(|instance| !instance.is_persisted()));
        assert_eq!(store.inner().row_count("screening"), 0);
        assert_eq!(store.inner().row_count("drill"), 0);
    }

    #[test]
    fn dangling_local_reference_fails_flush() {
        let mut store = MemoryStore::new();
        let mut pending = PendingSet::new();
        let orphan_owner = screening("Screening One", "compare_images", &["4"]);
        let mut child = drill(1, &["4"]);
        child.set_owner("screening", &orphan_owner);
        pending.insert(child);

        let err = execute(&mut store, &mut pending, None).expect_err("dangling ref fails");
        assert!(matches!(err, FlushError::DanglingOwner { .. }));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn dangling_persisted_reference_fails_flush() {
        let mut store = MemoryStore::new();
        let mut pending = PendingSet::new();
        let mut child = drill(1, &["4"]);
        child.set("screening", Value::Ref(RecordRef::Persisted(99)));
        pending.insert(child);

        let err = execute(&mut store, &mut pending, None).expect_err("stale ref fails");
        assert!(matches!(err, FlushError::DanglingOwner { .. }));
        assert_eq!(store.row_count("drill"), 0);
    }

    #[test]
    fn cyclic_ownership_is_rejected() {
        let mut store = MemoryStore::new();
        let mut pending = PendingSet::new();
        let mut first = drill(1, &["4"]);
        let mut second = drill(2, &["4"]);
        first.set_owner("screening", &second);
        second.set_owner("screening", &first);
        pending.insert(first);
        pending.insert(second);

        let err = execute(&mut store, &mut pending, None).expect_err("cycle fails");
        assert!(matches!(err, FlushError::CyclicOwnership { .. }));
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn duplicate_unique_tuple_in_one_batch_is_rejected() {
        let mut store = MemoryStore::new();
        let root = screening("Screening One", "compare_images", &["4"]);
        let mut pending = PendingSet::new();
        let mut first = drill(1, &["4"]);
        let mut second = drill(1, &["4"]);
        first.set_owner("screening", &root);
        second.set_owner("screening", &root);
        pending.insert(root);
        pending.insert(first);
        pending.insert(second);

        let err = execute(&mut store, &mut pending, None).expect_err("duplicate tuple fails");
        assert!(matches!(err, FlushError::UniqueViolation { .. }));
        assert_eq!(store.row_count("drill"), 0);
    }

    #[test]
    fn duplicate_unique_tuple_across_batches_is_rejected() {
        let mut store = MemoryStore::new();
        let (mut pending, root_id) = pending_graph(1);
        let report = execute(&mut store, &mut pending, None).expect("first flush succeeds");
        let screening_id = report.assigned[&root_id];

        let mut duplicate = drill(1, &["4"]);
        duplicate.set(
            "screening",
            Value::Ref(RecordRef::Persisted(screening_id)),
        );
        let mut pending = PendingSet::new();
        pending.insert(duplicate);

        let err = execute(&mut store, &mut pending, None).expect_err("cross-batch dup fails");
        assert!(matches!(err, FlushError::UniqueViolation { .. }));
        assert_eq!(store.row_count("drill"), 1);
    }

    #[test]
    fn expired_deadline_rolls_the_batch_back() {
        let mut store = MemoryStore::new();
        let (mut pending, _) = pending_graph(2);
        let deadline = Instant::now() - Duration::from_millis(1);

        let err = execute(&mut store, &mut pending, Some(deadline))
            .expect_err("expired deadline fails");
        assert!(matches!(err, FlushError::DeadlineExpired));
        assert_eq!(store.row_count("screening"), 0);
        assert_eq!(pending.len(), 3);
        assert!(store.begin().is_ok(), "batch window must be closed again");
    }

    #[test]
    fn reflushing_after_success_is_a_no_op() {
        let mut store = MemoryStore::new();
        let (mut pending, _) = pending_graph(2);

        execute(&mut store, &mut pending, None).expect("first flush succeeds");
        let report = execute(&mut store, &mut pending, None).expect("re-flush succeeds");
        assert!(report.assigned.is_empty());
        assert_eq!(store.row_count("drill"), 2);
    }
}
