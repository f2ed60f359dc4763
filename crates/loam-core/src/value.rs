use crate::db::instance::{LocalId, RecordId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

///
/// RecordRef
///
/// Reference to an owning record held in an entity's back-reference field.
///
/// Local       → the owner has not been flushed; resolves within one PendingSet.
/// Persisted   → stable storage identity of the owner.
///
/// Local refs never reach storage; flush rewrites them to Persisted.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum RecordRef {
    Local(LocalId),
    Persisted(RecordId),
}

///
/// Value
///
/// Dynamic field value carried by entity instances and stored rows.
///
/// Null → the field's value is absent (nullable fields only).
///

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Text(String),
    /// Symbolic member of a declared enum field.
    Enum(String),
    /// Ordered list of values. List order is preserved.
    List(Vec<Self>),
    /// Back-reference to an owning record.
    Ref(RecordRef),
    Null,
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_list(&self) -> Option<&Vec<Self>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_ref_value(&self) -> Option<RecordRef> {
        match self {
            Self::Ref(reference) => Some(*reference),
            _ => None,
        }
    }

    /// Short variant label for diagnostics.
    #[must_use]
    pub const fn type_label(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Text(_) => "text",
            Self::Enum(_) => "enum",
            Self::List(_) => "list",
            Self::Ref(_) => "ref",
            Self::Null => "null",
        }
    }
}

/// Compare two values for equality.
///
/// Returns `None` when the comparison is invalid (mismatched variants);
/// callers treat that as a non-match. `Int` and `Uint` are bridged
/// numerically; no other cross-variant comparison is defined.
#[must_use]
pub fn compare_eq(lhs: &Value, rhs: &Value) -> Option<bool> {
    match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => Some(a == b),
        (Value::Int(a), Value::Int(b)) => Some(a == b),
        (Value::Uint(a), Value::Uint(b)) => Some(a == b),
        (Value::Int(a), Value::Uint(b)) => Some(u64::try_from(*a) == Ok(*b)),
        (Value::Uint(a), Value::Int(b)) => Some(Ok(*a) == u64::try_from(*b)),
        (Value::Text(a), Value::Text(b)) => Some(a == b),
        (Value::Enum(a), Value::Enum(b)) => Some(a == b),
        (Value::Ref(a), Value::Ref(b)) => Some(a == b),
        (Value::Null, Value::Null) => Some(true),
        (Value::List(a), Value::List(b)) => {
            if a.len() != b.len() {
                return Some(false);
            }
            let mut all = true;
            for (x, y) in a.iter().zip(b) {
                match compare_eq(x, y) {
                    Some(true) => {}
                    Some(false) => all = false,
                    None => return None,
                }
            }
            Some(all)
        }
        _ => None,
    }
}

/// Order two values for sorting (relation ordering fields).
///
/// Returns `None` for unordered pairs; sorters keep the incoming order for
/// those.
#[must_use]
pub fn compare_order(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Uint(a), Value::Uint(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Uint(b)) => Some(match u64::try_from(*a) {
            Ok(a) => a.cmp(b),
            Err(_) => Ordering::Less,
        }),
        (Value::Uint(a), Value::Int(b)) => Some(match u64::try_from(*b) {
            Ok(b) => a.cmp(&b),
            Err(_) => Ordering::Greater,
        }),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Enum(a), Value::Enum(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Check whether a list-valued field contains a needle.
///
/// CONTRACT:
/// - a scalar needle matches when any element equals it
/// - a list needle matches when every element of the needle is present
///   (contains-all), and an empty list needle never matches — not even
///   against an empty list field
/// - a non-list haystack never matches
#[must_use]
pub fn contains(haystack: &Value, needle: &Value) -> bool {
    let Value::List(items) = haystack else {
        return false;
    };

    match needle {
        Value::List(wanted) => {
            if wanted.is_empty() {
                return false;
            }
            wanted.iter().all(|needed| {
                items
                    .iter()
                    .any(|item| compare_eq(item, needed).unwrap_or(false))
            })
        }
        _ => items
            .iter()
            .any(|item| compare_eq(item, needle).unwrap_or(false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grades(members: &[&str]) -> Value {
        Value::List(members.iter().map(|m| Value::Enum((*m).to_string())).collect())
    }

    #[test]
    fn cross_variant_equality_is_invalid() {
        assert_eq!(
            compare_eq(&Value::Text("4".into()), &Value::Enum("4".into())),
            None
        );
        assert_eq!(compare_eq(&Value::Bool(true), &Value::Int(1)), None);
    }

    #[test]
    fn int_uint_equality_is_bridged() {
        assert_eq!(compare_eq(&Value::Int(4), &Value::Uint(4)), Some(true));
        assert_eq!(compare_eq(&Value::Uint(4), &Value::Int(-4)), Some(false));
    }

    #[test]
    fn contains_scalar_needle_is_membership() {
        let field = grades(&["4", "5"]);

        assert!(contains(&field, &Value::Enum("4".into())));
        assert!(!contains(&field, &Value::Enum("6".into())));
    }

    #[test]
    fn contains_list_needle_requires_every_member() {
        let field = grades(&["4", "5"]);

        assert!(contains(&field, &grades(&["4"])));
        assert!(contains(&field, &grades(&["5", "4"])));
        assert!(!contains(&field, &grades(&["4", "6"])));
    }

    #[test]
    fn empty_list_needle_never_matches() {
        assert!(!contains(&grades(&["4", "5"]), &grades(&[])));
        assert!(!contains(&grades(&[]), &grades(&[])));
    }

    #[test]
    fn non_list_haystack_never_matches() {
        assert!(!contains(&Value::Text("45".into()), &Value::Text("4".into())));
        assert!(!contains(&Value::Null, &Value::Null));
    }

    #[test]
    fn ordering_covers_order_fields() {
        assert_eq!(
            compare_order(&Value::Uint(1), &Value::Uint(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_order(&Value::Uint(2), &Value::Int(-1)),
            Some(Ordering::Greater)
        );
        assert_eq!(compare_order(&Value::Null, &Value::Uint(1)), None);
    }

    // Bounded scalar strategy; lists are exercised through the containment
    // properties below rather than deep recursion.
    fn scalar_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<u64>().prop_map(Value::Uint),
            "[a-z]{0,8}".prop_map(Value::Text),
            "[a-z]{1,8}".prop_map(Value::Enum),
        ]
    }

    proptest! {
        #[test]
        fn equality_is_reflexive(value in scalar_value()) {
            prop_assert_eq!(compare_eq(&value, &value), Some(true));
        }

        #[test]
        fn equality_is_symmetric(a in scalar_value(), b in scalar_value()) {
            prop_assert_eq!(compare_eq(&a, &b), compare_eq(&b, &a));
        }

        #[test]
        fn membership_follows_insertion(item in scalar_value(), rest in proptest::collection::vec(scalar_value(), 0..6)) {
            let mut items = rest;
            items.push(item.clone());

            prop_assert!(contains(&Value::List(items), &item));
        }
    }
}
