///
/// RelationKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelationKind {
    /// This entity owns an ordered collection of the target kind.
    OwningMany,
    /// This entity is owned by one record of the target kind.
    OwnedByOne,
}

///
/// RelationModel
///
/// Declarative relation descriptor. The foreign-key field always lives on
/// the owned side; the back-reference is a lookup association and never
/// drives lifecycle.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RelationModel {
    /// Relation name as used in predicates and populate directives.
    pub name: &'static str,
    pub kind: RelationKind,
    /// Target entity kind name.
    pub target: &'static str,
    /// Foreign-key field on the owned side.
    pub fk_field: &'static str,
    /// Ordering field on the owned side (OwningMany only).
    pub ordering: Option<&'static str>,
    /// Whether persisting the owner cascades over this relation.
    pub cascade: bool,
}

impl RelationModel {
    #[must_use]
    pub const fn is_owning_many(&self) -> bool {
        matches!(self.kind, RelationKind::OwningMany)
    }

    #[must_use]
    pub const fn is_owned_by_one(&self) -> bool {
        matches!(self.kind, RelationKind::OwnedByOne)
    }
}
