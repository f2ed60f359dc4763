use crate::{
    error::{EngineError, ErrorClass, ErrorOrigin},
    model::{entity::EntityModel, field::FieldKind},
};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// RegistryError
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("entity kind '{0}' is not registered")]
    UnknownEntityKind(String),

    #[error("entity kind '{0}' is already registered")]
    DuplicateEntityKind(String),

    #[error("entity kind '{entity}': index {index} references unknown field '{field}'")]
    IndexFieldUnknown {
        entity: String,
        index: String,
        field: String,
    },

    #[error("entity kind '{entity}': projection '{projection}' references unknown relation '{relation}'")]
    ProjectionRelationUnknown {
        entity: String,
        projection: String,
        relation: String,
    },

    #[error("entity kind '{entity}': projection '{projection}' must read through an owned-by-one relation")]
    ProjectionNotOwnedByOne { entity: String, projection: String },

    #[error("relation '{relation}' on '{entity}': back-reference field '{field}' is missing")]
    RelationFkMissing {
        entity: String,
        relation: String,
        field: String,
    },

    #[error("relation '{relation}' on '{entity}': back-reference field '{field}' must be a ref field")]
    RelationFkNotRef {
        entity: String,
        relation: String,
        field: String,
    },

    #[error("relation '{relation}' on '{entity}' targets unregistered kind '{target}'")]
    RelationTargetUnknown {
        entity: String,
        relation: String,
        target: String,
    },

    #[error("relation '{relation}' on '{entity}': ordering field '{field}' is missing on '{target}'")]
    RelationOrderingMissing {
        entity: String,
        relation: String,
        target: String,
        field: String,
    },
}

impl RegistryError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownEntityKind(_) => ErrorClass::NotFound,
            _ => ErrorClass::InvariantViolation,
        }
    }
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        Self::new(err.class(), ErrorOrigin::Registry, err.to_string())
    }
}

///
/// EntityRegistry
///
/// Process-wide descriptor table: populated once at startup, read-only
/// thereafter. Sessions share it behind `Arc`.
///

#[derive(Debug, Default)]
pub struct EntityRegistry {
    models: BTreeMap<&'static str, &'static EntityModel>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one entity kind.
    ///
    /// Checks the model's local shape (indexes, projections, owned-side
    /// back-reference fields); cross-entity checks run in
    /// [`Self::validate_relations`] once every kind is registered.
    pub fn register(&mut self, model: &'static EntityModel) -> Result<(), RegistryError> {
        if self.models.contains_key(model.entity_name) {
            return Err(RegistryError::DuplicateEntityKind(
                model.entity_name.to_string(),
            ));
        }

        validate_local_shape(model)?;
        self.models.insert(model.entity_name, model);

        Ok(())
    }

    /// Look up a descriptor by kind name.
    pub fn describe(&self, kind: &str) -> Result<&'static EntityModel, RegistryError> {
        self.models
            .get(kind)
            .copied()
            .ok_or_else(|| RegistryError::UnknownEntityKind(kind.to_string()))
    }

    /// Iterate registered descriptors in kind-name order.
    pub fn iter(&self) -> impl Iterator<Item = &'static EntityModel> + '_ {
        self.models.values().copied()
    }

    /// Cross-entity relation checks: every relation target is registered,
    /// owning-many back-reference and ordering fields exist on the target.
    pub fn validate_relations(&self) -> Result<(), RegistryError> {
        for model in self.iter() {
            for relation in model.relations {
                let target = self.describe(relation.target).map_err(|_| {
                    RegistryError::RelationTargetUnknown {
                        entity: model.entity_name.to_string(),
                        relation: relation.name.to_string(),
                        target: relation.target.to_string(),
                    }
                })?;

                if relation.is_owning_many() {
                    match target.field(relation.fk_field) {
                        None => {
                            return Err(RegistryError::RelationFkMissing {
                                entity: relation.target.to_string(),
                                relation: relation.name.to_string(),
                                field: relation.fk_field.to_string(),
                            });
                        }
                        Some(field) if !matches!(field.kind, FieldKind::Ref { .. }) => {
                            return Err(RegistryError::RelationFkNotRef {
                                entity: relation.target.to_string(),
                                relation: relation.name.to_string(),
                                field: relation.fk_field.to_string(),
                            });
                        }
                        Some(_) => {}
                    }

                    if let Some(ordering) = relation.ordering
                        && target.field(ordering).is_none()
                    {
                        return Err(RegistryError::RelationOrderingMissing {
                            entity: model.entity_name.to_string(),
                            relation: relation.name.to_string(),
                            target: relation.target.to_string(),
                            field: ordering.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

// Local (single-model) shape checks run at registration.
fn validate_local_shape(model: &'static EntityModel) -> Result<(), RegistryError> {
    for index in model.indexes {
        for field in index.fields {
            if model.field(field).is_none() {
                return Err(RegistryError::IndexFieldUnknown {
                    entity: model.entity_name.to_string(),
                    index: index.to_string(),
                    field: (*field).to_string(),
                });
            }
        }
    }

    for projection in model.projections {
        let Some(relation) = model.relation(projection.relation) else {
            return Err(RegistryError::ProjectionRelationUnknown {
                entity: model.entity_name.to_string(),
                projection: projection.name.to_string(),
                relation: projection.relation.to_string(),
            });
        };
        if !relation.is_owned_by_one() {
            return Err(RegistryError::ProjectionNotOwnedByOne {
                entity: model.entity_name.to_string(),
                projection: projection.name.to_string(),
            });
        }
    }

    for relation in model.relations {
        if relation.is_owned_by_one() {
            match model.field(relation.fk_field) {
                None => {
                    return Err(RegistryError::RelationFkMissing {
                        entity: model.entity_name.to_string(),
                        relation: relation.name.to_string(),
                        field: relation.fk_field.to_string(),
                    });
                }
                Some(field) if !matches!(field.kind, FieldKind::Ref { .. }) => {
                    return Err(RegistryError::RelationFkNotRef {
                        entity: model.entity_name.to_string(),
                        relation: relation.name.to_string(),
                        field: relation.fk_field.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}
