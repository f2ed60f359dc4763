//! Query surface: predicate trees, translation, and execution.
//!
//! The translator is stateless and validates every referenced field and
//! relation before a single row is read; the executor routes containment
//! through the storage engine's native membership operator when one is
//! advertised, and enumerates candidate rows otherwise.

pub(crate) mod execute;
pub mod predicate;
pub mod translate;

pub use predicate::Predicate;
pub use translate::TranslateError;

use crate::{
    db::registry::RegistryError,
    error::{EngineError, ErrorClass, ErrorOrigin},
};
use thiserror::Error as ThisError;

///
/// QueryError
///

#[derive(Debug, ThisError)]
pub enum QueryError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error("query execution failed: {source}")]
    Execute {
        #[from]
        source: EngineError,
    },

    #[error("unknown projection '{projection}' on '{entity}'")]
    UnknownProjection { entity: String, projection: String },
}

impl QueryError {
    pub(crate) fn class(&self) -> ErrorClass {
        match self {
            Self::Registry(err) => err.class(),
            Self::Translate(err) => err.class(),
            Self::Execute { source } => source.class,
            Self::UnknownProjection { .. } => ErrorClass::NotFound,
        }
    }
}

impl From<QueryError> for EngineError {
    fn from(err: QueryError) -> Self {
        Self::new(err.class(), ErrorOrigin::Query, err.to_string())
    }
}

///
/// FindOptions
///
/// Eager-load directives for `find`.
///
/// `populate` names owning-many relations fetched for each matched root.
/// `populate_where` is a second, independent predicate applied to the
/// relation target — never to the root — so a matching root can come back
/// with an empty populated collection.
///

#[derive(Clone, Debug, Default)]
pub struct FindOptions {
    populate: Vec<String>,
    populate_where: Option<Predicate>,
}

impl FindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Eagerly fetch a relation for each matched root.
    #[must_use]
    pub fn populate(mut self, relation: impl Into<String>) -> Self {
        self.populate.push(relation.into());
        self
    }

    /// Constrain which related rows are eagerly fetched.
    #[must_use]
    pub fn populate_where(mut self, predicate: Predicate) -> Self {
        self.populate_where = Some(predicate);
        self
    }

    pub(crate) fn populate_list(&self) -> &[String] {
        &self.populate
    }

    pub(crate) const fn populate_filter(&self) -> Option<&Predicate> {
        self.populate_where.as_ref()
    }
}
