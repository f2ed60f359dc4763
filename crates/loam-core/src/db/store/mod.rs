//! Storage boundary.
//!
//! `StoragePort` is the only surface the engine relies on from its storage
//! collaborator: identity sequences, one staged batch at a time with
//! all-or-nothing commit, and row scans. `MemoryStore` is the in-process
//! reference engine.

mod memory;
mod row;

pub use memory::MemoryStore;
pub use row::{RawRow, RowFields};

use crate::{db::instance::RecordId, error::EngineError, value::Value};

///
/// StoredRow
///
/// Decoded row surfaced by storage reads.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredRow {
    pub id: RecordId,
    pub fields: RowFields,
}

///
/// StoragePort
///
/// Contract:
/// - `reserve_record_id` hands out identities that survive rollback;
///   sequences are unique and monotonic, not dense.
/// - at most one staged batch is open; `commit` applies every staged row or
///   none, `rollback` discards the batch.
/// - staged rows are invisible to `get`/`scan` until commit.
///

pub trait StoragePort {
    /// Whether the engine natively decides array-membership predicates.
    fn native_containment(&self) -> bool;

    /// Reserve the next identity for an entity kind.
    fn reserve_record_id(&mut self, entity: &str) -> RecordId;

    /// Open a staged batch.
    fn begin(&mut self) -> Result<(), EngineError>;

    /// Stage one row into the open batch.
    fn stage(&mut self, entity: &str, id: RecordId, fields: &RowFields)
    -> Result<(), EngineError>;

    /// Apply the staged batch. Returns the number of rows written.
    fn commit(&mut self) -> Result<u64, EngineError>;

    /// Discard the staged batch.
    fn rollback(&mut self);

    /// Fetch one row by identity.
    fn get(&self, entity: &str, id: RecordId) -> Result<StoredRow, EngineError>;

    /// Scan every committed row of an entity kind in identity order.
    fn scan(&self, entity: &str) -> Result<Vec<StoredRow>, EngineError>;

    /// Narrow a scan with the engine's native array-membership operator.
    /// Only called when `native_containment` reports true.
    fn scan_containing(
        &self,
        entity: &str,
        field: &str,
        needle: &Value,
    ) -> Result<Vec<StoredRow>, EngineError>;

    /// Drop every row and reset identity sequences.
    fn clear(&mut self);

    /// Committed row count for an entity kind.
    fn row_count(&self, entity: &str) -> u64;
}
