use crate::{
    db::instance::{EntityInstance, LocalId},
    error::{EngineError, ErrorClass, ErrorOrigin},
    value::{Value, compare_order},
};
use std::{cmp::Ordering, collections::HashSet};
use thiserror::Error as ThisError;

///
/// CascadeError
///

#[derive(Debug, ThisError)]
pub enum CascadeError {
    #[error("relation '{relation}' on '{entity}' expects '{expected}' children, found '{found}'")]
    TargetMismatch {
        entity: String,
        relation: String,
        expected: String,
        found: String,
    },
}

impl CascadeError {
    pub(crate) const fn class(&self) -> ErrorClass {
        ErrorClass::InvariantViolation
    }
}

impl From<CascadeError> for EngineError {
    fn from(err: CascadeError) -> Self {
        Self::new(err.class(), ErrorOrigin::Cascade, err.to_string())
    }
}

///
/// CascadeResolver
///
/// Expands the owned graph of a persisted root into a flat, owner-first
/// write list. The visited set is keyed by local id: re-persisting an
/// instance already seen in this resolver's lifetime expands to nothing,
/// which keeps the walk cycle-safe and persist idempotent.
///

pub(crate) struct CascadeResolver {
    visited: HashSet<LocalId>,
}

impl CascadeResolver {
    pub(crate) fn new() -> Self {
        Self {
            visited: HashSet::new(),
        }
    }

    /// Expand `root` and every cascade-owned descendant, root first.
    ///
    /// Children are taken out of the root's owned collections, stamped with
    /// the owner back-reference when unset, and ordered by the relation's
    /// ordering field (ties and unordered values keep insertion order).
    pub(crate) fn expand(
        &mut self,
        root: EntityInstance,
    ) -> Result<Vec<EntityInstance>, CascadeError> {
        if !self.visited.insert(root.local_id()) {
            return Ok(Vec::new());
        }

        let mut root = root;
        let mut descendants = Vec::new();

        for relation in root.model().relations {
            if !relation.is_owning_many() || !relation.cascade {
                continue;
            }

            let mut children = root.take_related(relation.name);
            if children.is_empty() {
                continue;
            }

            for child in &mut children {
                if child.model().entity_name != relation.target {
                    return Err(CascadeError::TargetMismatch {
                        entity: root.model().entity_name.to_string(),
                        relation: relation.name.to_string(),
                        expected: relation.target.to_string(),
                        found: child.model().entity_name.to_string(),
                    });
                }

                let back_reference = child.get(relation.fk_field);
                if back_reference.is_none() || back_reference == Some(&Value::Null) {
                    child.set_owner(relation.fk_field, &root);
                }
            }

            if let Some(ordering) = relation.ordering {
                children.sort_by(|a, b| {
                    match (a.get(ordering), b.get(ordering)) {
                        (Some(lhs), Some(rhs)) => {
                            compare_order(lhs, rhs).unwrap_or(Ordering::Equal)
                        }
                        _ => Ordering::Equal,
                    }
                });
            }

            for child in children {
                descendants.extend(self.expand(child)?);
            }
        }

        let mut out = vec![root];
        out.append(&mut descendants);

        Ok(out)
    }
}
