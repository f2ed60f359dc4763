//! Engine modules: registry, unit of work, cascade, storage, queries, and
//! the session facade.

pub mod cascade;
pub mod flush;
pub mod instance;
pub mod pending;
pub mod query;
pub mod registry;
pub mod session;
pub mod store;

use thiserror::Error as ThisError;

///
/// DbError
///
/// Catch-all for callers that do not branch on the typed per-call errors.
///

#[derive(Debug, ThisError)]
pub enum DbError {
    #[error(transparent)]
    Cascade(#[from] cascade::CascadeError),

    #[error(transparent)]
    Connection(#[from] session::ConnectionError),

    #[error(transparent)]
    Flush(#[from] flush::FlushError),

    #[error(transparent)]
    Persist(#[from] session::PersistError),

    #[error(transparent)]
    Query(#[from] query::QueryError),

    #[error(transparent)]
    Registry(#[from] registry::RegistryError),

    #[error(transparent)]
    Validate(#[from] crate::validate::ValidateError),
}
