///
/// ProjectionModel
///
/// Derived read-only field that mirrors a field of the record's owner.
/// Projections are re-evaluated on read and never stored, so there is no
/// second copy to keep consistent.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProjectionModel {
    /// Projection name as exposed to readers.
    pub name: &'static str,
    /// Owned-by-one relation the projection reads through.
    pub relation: &'static str,
    /// Field on the relation target whose value is mirrored.
    pub source_field: &'static str,
}
