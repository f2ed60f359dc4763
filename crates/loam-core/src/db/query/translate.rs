use crate::{
    db::{query::predicate::Predicate, registry::EntityRegistry},
    error::{EngineError, ErrorClass, ErrorOrigin},
    model::entity::EntityModel,
    value::Value,
};
use thiserror::Error as ThisError;

///
/// TranslateError
/// Malformed predicates, rejected before any row is read.
///

#[derive(Debug, ThisError)]
pub enum TranslateError {
    #[error("unknown field '{field}' on '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("field '{field}' on '{entity}' is not filterable")]
    UnfilterableField { entity: String, field: String },

    #[error("containment requires a list field: '{field}' on '{entity}'")]
    ContainsOnNonList { entity: String, field: String },

    #[error("unknown relation '{relation}' on '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    #[error("related predicates nest one level deep at most (on '{entity}')")]
    NestedRelated { entity: String },

    #[error("populate requires an owning-many relation: '{relation}' on '{entity}'")]
    PopulateNotOwningMany { entity: String, relation: String },
}

impl TranslateError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownField { .. } | Self::UnknownRelation { .. } => ErrorClass::NotFound,
            _ => ErrorClass::Unsupported,
        }
    }
}

impl From<TranslateError> for EngineError {
    fn from(err: TranslateError) -> Self {
        Self::new(err.class(), ErrorOrigin::Query, err.to_string())
    }
}

///
/// TranslatedPredicate
///
/// A predicate validated against one entity model. The translator is
/// stateless; a translated predicate is reusable across executions.
///

#[derive(Clone, Debug)]
pub(crate) struct TranslatedPredicate {
    model: &'static EntityModel,
    root: Predicate,
}

impl TranslatedPredicate {
    pub(crate) const fn model(&self) -> &'static EntityModel {
        self.model
    }

    pub(crate) const fn root(&self) -> &Predicate {
        &self.root
    }

    /// First containment conjunct eligible for storage pushdown: either the
    /// whole predicate, or a direct member of a top-level `And`.
    ///
    /// Pushdown narrows candidates only; the full predicate is still
    /// evaluated per row, so residual conjuncts stay correct.
    pub(crate) fn containment_pushdown(&self) -> Option<(&str, &Value)> {
        fn as_containment(predicate: &Predicate) -> Option<(&str, &Value)> {
            match predicate {
                Predicate::Contains { field, needle } => Some((field.as_str(), needle)),
                _ => None,
            }
        }

        match &self.root {
            Predicate::And(children) => children.iter().find_map(as_containment),
            root => as_containment(root),
        }
    }
}

/// Validate a predicate tree against an entity model.
pub(crate) fn translate(
    registry: &EntityRegistry,
    model: &'static EntityModel,
    predicate: &Predicate,
) -> Result<TranslatedPredicate, TranslateError> {
    check(registry, model, predicate, false)?;

    Ok(TranslatedPredicate {
        model,
        root: predicate.clone(),
    })
}

/// Validate a predicate applied inside a relation scope (populate filters);
/// `Related` is not available there.
pub(crate) fn translate_scoped(
    registry: &EntityRegistry,
    model: &'static EntityModel,
    predicate: &Predicate,
) -> Result<TranslatedPredicate, TranslateError> {
    check(registry, model, predicate, true)?;

    Ok(TranslatedPredicate {
        model,
        root: predicate.clone(),
    })
}

/// Validate populate directives: each name must be an owning-many relation.
pub(crate) fn validate_populate(
    model: &'static EntityModel,
    relations: &[String],
) -> Result<(), TranslateError> {
    for name in relations {
        let Some(relation) = model.relation(name) else {
            return Err(TranslateError::UnknownRelation {
                entity: model.entity_name.to_string(),
                relation: name.clone(),
            });
        };
        if !relation.is_owning_many() {
            return Err(TranslateError::PopulateNotOwningMany {
                entity: model.entity_name.to_string(),
                relation: name.clone(),
            });
        }
    }

    Ok(())
}

fn check(
    registry: &EntityRegistry,
    model: &'static EntityModel,
    predicate: &Predicate,
    in_relation: bool,
) -> Result<(), TranslateError> {
    match predicate {
        Predicate::True | Predicate::False => Ok(()),

        Predicate::And(children) | Predicate::Or(children) => children
            .iter()
            .try_for_each(|child| check(registry, model, child, in_relation)),

        Predicate::Not(inner) => check(registry, model, inner, in_relation),

        Predicate::Eq { field, .. } => {
            let descriptor = model.field(field).ok_or_else(|| TranslateError::UnknownField {
                entity: model.entity_name.to_string(),
                field: field.clone(),
            })?;
            if !descriptor.kind.is_filterable() {
                return Err(TranslateError::UnfilterableField {
                    entity: model.entity_name.to_string(),
                    field: field.clone(),
                });
            }
            Ok(())
        }

        Predicate::Contains { field, .. } => {
            let descriptor = model.field(field).ok_or_else(|| TranslateError::UnknownField {
                entity: model.entity_name.to_string(),
                field: field.clone(),
            })?;
            if !descriptor.kind.is_list() {
                return Err(TranslateError::ContainsOnNonList {
                    entity: model.entity_name.to_string(),
                    field: field.clone(),
                });
            }
            Ok(())
        }

        Predicate::Related {
            relation,
            predicate,
        } => {
            if in_relation {
                return Err(TranslateError::NestedRelated {
                    entity: model.entity_name.to_string(),
                });
            }
            let descriptor =
                model
                    .relation(relation)
                    .ok_or_else(|| TranslateError::UnknownRelation {
                        entity: model.entity_name.to_string(),
                        relation: relation.clone(),
                    })?;
            let target = registry.describe(descriptor.target).map_err(|_| {
                TranslateError::UnknownRelation {
                    entity: model.entity_name.to_string(),
                    relation: relation.clone(),
                }
            })?;

            check(registry, target, predicate, true)
        }
    }
}
