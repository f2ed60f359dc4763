use crate::model::{
    field::FieldModel, index::IndexModel, projection::ProjectionModel, relation::RelationModel,
};

///
/// EntityModel
/// Minimal runtime descriptor for one entity kind.
///

#[derive(Debug)]
pub struct EntityModel {
    /// Stable external kind name used in keys and routing.
    pub entity_name: &'static str,
    /// Name of the storage-assigned identity field.
    pub identity: &'static str,
    /// Ordered field list (authoritative for validation and planning).
    pub fields: &'static [FieldModel],
    /// Relation descriptors (field order is not significant).
    pub relations: &'static [RelationModel],
    /// Composite indexes enforced at flush time.
    pub indexes: &'static [IndexModel],
    /// Derived owner-mirroring fields.
    pub projections: &'static [ProjectionModel],
}

impl EntityModel {
    /// Look up a field descriptor by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldModel> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Look up a relation descriptor by name.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&'static RelationModel> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Look up a projection descriptor by name.
    #[must_use]
    pub fn projection(&self, name: &str) -> Option<&'static ProjectionModel> {
        self.projections
            .iter()
            .find(|projection| projection.name == name)
    }
}
