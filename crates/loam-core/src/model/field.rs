///
/// FieldModel
/// Runtime field metadata used by validation and query translation.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldModel {
    /// Field name as used in predicates and stored rows.
    pub name: &'static str,
    /// Runtime type shape.
    pub kind: FieldKind,
    /// Whether the field accepts an absent/null value.
    pub nullable: bool,
}

impl FieldModel {
    #[must_use]
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    #[must_use]
    pub const fn nullable(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }
}

///
/// FieldKind
///
/// Minimal type surface needed by the validator and the query translator.
/// Aligned with `Value` variants.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Bool,
    Int,
    Uint,
    Text,
    /// Symbolic enum column; `members` is the closed set of legal symbols.
    Enum { members: &'static [&'static str] },
    /// Ordered collection of one element kind.
    List(&'static FieldKind),
    /// Back-reference to an owning record, named by the relation it serves.
    Ref { relation: &'static str },

    /// Marker for fields that are not filterable or storable.
    Unsupported,
}

impl FieldKind {
    /// Short label for diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Text => "text",
            Self::Enum { .. } => "enum",
            Self::List(_) => "list",
            Self::Ref { .. } => "ref",
            Self::Unsupported => "unsupported",
        }
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    #[must_use]
    pub const fn is_filterable(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}
