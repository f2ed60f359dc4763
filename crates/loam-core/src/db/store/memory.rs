use crate::{
    db::{
        instance::RecordId,
        store::{
            RowFields, StoragePort, StoredRow,
            row::RawRow,
        },
    },
    error::EngineError,
    value::{RecordRef, Value},
};
use std::collections::BTreeMap;
use std::ops::Bound;

///
/// RowKey
///
/// Composite key: rows sort by entity kind, then identity.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
struct RowKey {
    entity: String,
    id: RecordId,
}

impl RowKey {
    fn new(entity: &str, id: RecordId) -> Self {
        Self {
            entity: entity.to_string(),
            id,
        }
    }
}

///
/// MemoryStore
///
/// In-process reference engine behind `StoragePort`. Rows are CBOR-encoded
/// and keyed by (entity kind, record id); array membership is decided
/// natively.
///

#[derive(Default)]
pub struct MemoryStore {
    rows: BTreeMap<RowKey, RawRow>,
    sequences: BTreeMap<String, RecordId>,
    batch: Option<Vec<(RowKey, RawRow)>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entity_range(&self, entity: &str) -> impl Iterator<Item = (&RowKey, &RawRow)> {
        let start = Bound::Included(RowKey::new(entity, 0));
        let end = Bound::Included(RowKey::new(entity, RecordId::MAX));

        self.rows.range((start, end))
    }

    fn decode(key: &RowKey, row: &RawRow) -> Result<StoredRow, EngineError> {
        let fields = row.try_decode()?;

        Ok(StoredRow {
            id: key.id,
            fields,
        })
    }
}

// Local references must never reach storage; flush rewrites them first.
fn reject_local_refs(fields: &RowFields) -> Result<(), EngineError> {
    fn check(value: &Value) -> Result<(), EngineError> {
        match value {
            Value::Ref(RecordRef::Local(local_id)) => Err(EngineError::store_invariant(format!(
                "local reference reached storage: {local_id}"
            ))),
            Value::List(items) => items.iter().try_for_each(check),
            _ => Ok(()),
        }
    }

    fields.values().try_for_each(check)
}

impl StoragePort for MemoryStore {
    fn native_containment(&self) -> bool {
        true
    }

    fn reserve_record_id(&mut self, entity: &str) -> RecordId {
        let sequence = self.sequences.entry(entity.to_string()).or_insert(0);
        *sequence += 1;

        *sequence
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        if self.batch.is_some() {
            return Err(EngineError::store_invariant(
                "staged batch already open before begin",
            ));
        }
        self.batch = Some(Vec::new());

        Ok(())
    }

    fn stage(
        &mut self,
        entity: &str,
        id: RecordId,
        fields: &RowFields,
    ) -> Result<(), EngineError> {
        reject_local_refs(fields)?;
        let row = RawRow::encode(fields)?;

        let Some(batch) = self.batch.as_mut() else {
            return Err(EngineError::store_invariant("stage without an open batch"));
        };
        batch.push((RowKey::new(entity, id), row));

        Ok(())
    }

    fn commit(&mut self) -> Result<u64, EngineError> {
        let Some(batch) = self.batch.take() else {
            return Err(EngineError::store_invariant("commit without an open batch"));
        };

        let rows = batch.len() as u64;
        for (key, row) in batch {
            self.rows.insert(key, row);
        }

        Ok(rows)
    }

    fn rollback(&mut self) {
        self.batch = None;
    }

    fn get(&self, entity: &str, id: RecordId) -> Result<StoredRow, EngineError> {
        let key = RowKey::new(entity, id);

        let row = self
            .rows
            .get(&key)
            .ok_or_else(|| EngineError::store_not_found(format!("{entity}/{id}")))?;

        Self::decode(&key, row)
    }

    fn scan(&self, entity: &str) -> Result<Vec<StoredRow>, EngineError> {
        self.entity_range(entity)
            .map(|(key, row)| Self::decode(key, row))
            .collect()
    }

    fn scan_containing(
        &self,
        entity: &str,
        field: &str,
        needle: &Value,
    ) -> Result<Vec<StoredRow>, EngineError> {
        let mut out = Vec::new();
        for (key, row) in self.entity_range(entity) {
            let decoded = Self::decode(key, row)?;
            let matched = decoded
                .fields
                .get(field)
                .is_some_and(|value| crate::value::contains(value, needle));
            if matched {
                out.push(decoded);
            }
        }

        Ok(out)
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.sequences.clear();
        self.batch = None;
    }

    fn row_count(&self, entity: &str) -> u64 {
        self.entity_range(entity).count() as u64
    }
}
