use crate::value::Value;

///
/// Predicate
///
/// Structured filter tree over one entity kind.
///
/// Semantics:
/// - `Eq` matches when the field value equals the operand; invalid
///   comparisons (variant mismatch) never match.
/// - `Contains` matches array-valued fields: a scalar needle by membership,
///   a list needle when every member is present (an empty list needle never
///   matches).
/// - `Related` matches when at least one related instance satisfies the
///   inner predicate; one relation level deep.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Matches every row (the empty filter).
    True,
    /// Matches no row.
    False,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Eq {
        field: String,
        value: Value,
    },
    Contains {
        field: String,
        needle: Value,
    },
    Related {
        relation: String,
        predicate: Box<Predicate>,
    },
}

impl Predicate {
    #[must_use]
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::Eq {
            field: field.into(),
            value,
        }
    }

    #[must_use]
    pub fn contains(field: impl Into<String>, needle: Value) -> Self {
        Self::Contains {
            field: field.into(),
            needle,
        }
    }

    #[must_use]
    pub fn related(relation: impl Into<String>, predicate: Self) -> Self {
        Self::Related {
            relation: relation.into(),
            predicate: Box::new(predicate),
        }
    }

    #[must_use]
    pub fn and(predicates: impl IntoIterator<Item = Self>) -> Self {
        Self::And(predicates.into_iter().collect())
    }

    #[must_use]
    pub fn or(predicates: impl IntoIterator<Item = Self>) -> Self {
        Self::Or(predicates.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(predicate: Self) -> Self {
        Self::Not(Box::new(predicate))
    }
}
