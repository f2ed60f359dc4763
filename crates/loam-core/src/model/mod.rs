//! Runtime entity metadata.
//!
//! Types in `model` are the declarative descriptors the engine plans
//! against: entities, fields, relations, indexes, and projections. They are
//! plain static data built once at startup — metadata is never embedded
//! behavior.

pub mod entity;
pub mod field;
pub mod index;
pub mod projection;
pub mod relation;
