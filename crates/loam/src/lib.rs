//! Loam — an embedded entity mapper with cascade-on-persist and
//! array-containment queries.
//!
//! ## Crate layout
//! - `core`: runtime data model, unit of work, cascade expansion, query
//!   translation, storage boundary, and observability.
//!
//! The `prelude` module mirrors the runtime surface used by application
//! code.

pub use loam_core as core;

pub use loam_core::Error;

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use crate::core::{
        db::{
            DbError,
            flush::{FlushError, FlushReport},
            query::QueryError,
            session::{CloseError, ConnectionError, PersistError},
            store::{MemoryStore, StoragePort},
        },
        obs::{MetricsSink, metrics_report, metrics_reset_all},
        prelude::*,
    };
}
