//! Core runtime for Loam: entity models, values, the unit of work, cascade
//! expansion, query translation, and the session facade.
#![warn(unreachable_pub)]

pub mod db;
pub mod error;
pub mod model;
pub mod obs;
pub mod validate;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

pub use error::EngineError as Error;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No executors, stores, or sinks are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{
            instance::{EntityInstance, LocalId, RecordId},
            query::{FindOptions, Predicate},
            registry::EntityRegistry,
            session::{ConnectionConfig, Driver, Session},
        },
        model::{
            entity::EntityModel,
            field::{FieldKind, FieldModel},
            index::IndexModel,
            projection::ProjectionModel,
            relation::{RelationKind, RelationModel},
        },
        value::{RecordRef, Value},
    };
}
