use crate::{
    error::{EngineError, ErrorClass, ErrorOrigin},
    model::{entity::EntityModel, field::FieldKind},
    value::Value,
    db::store::RowFields,
};
use thiserror::Error as ThisError;

///
/// ValidateError
///
/// Shape violations found while checking row fields against an entity
/// model. Raised before the commit window; a failed row aborts the batch.
///

#[derive(Debug, ThisError)]
pub enum ValidateError {
    #[error("unknown field '{field}' on '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("field '{field}' on '{entity}' must not be null")]
    NullNotAllowed { entity: String, field: String },

    #[error("field '{field}' on '{entity}': expected {expected}, found {found}")]
    KindMismatch {
        entity: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field '{field}' on '{entity}': '{member}' is not a declared enum member")]
    UnknownEnumMember {
        entity: String,
        field: String,
        member: String,
    },
}

impl ValidateError {
    pub(crate) const fn class(&self) -> ErrorClass {
        ErrorClass::InvariantViolation
    }
}

impl From<ValidateError> for EngineError {
    fn from(err: ValidateError) -> Self {
        Self::new(err.class(), ErrorOrigin::Pending, err.to_string())
    }
}

/// Validate one row's fields against an entity model.
///
/// Every provided field must be declared; every non-nullable declared field
/// must be present and non-null; values must match their declared kind.
pub fn validate_row(model: &EntityModel, fields: &RowFields) -> Result<(), ValidateError> {
    // Phase 1: no undeclared fields.
    for name in fields.keys() {
        if model.field(name).is_none() {
            return Err(ValidateError::UnknownField {
                entity: model.entity_name.to_string(),
                field: name.clone(),
            });
        }
    }

    // Phase 2: declared fields are present, nullable where absent, and
    // kind-correct.
    for field in model.fields {
        match fields.get(field.name) {
            None | Some(Value::Null) => {
                if !field.nullable {
                    return Err(ValidateError::NullNotAllowed {
                        entity: model.entity_name.to_string(),
                        field: field.name.to_string(),
                    });
                }
            }
            Some(value) => {
                validate_value(model.entity_name, field.name, &field.kind, value)?;
            }
        }
    }

    Ok(())
}

// Validate a single value against a field kind.
fn validate_value(
    entity: &str,
    field: &str,
    kind: &FieldKind,
    value: &Value,
) -> Result<(), ValidateError> {
    let mismatch = || ValidateError::KindMismatch {
        entity: entity.to_string(),
        field: field.to_string(),
        expected: kind.label(),
        found: value.type_label(),
    };

    match (kind, value) {
        (FieldKind::Bool, Value::Bool(_))
        | (FieldKind::Int, Value::Int(_))
        | (FieldKind::Uint, Value::Uint(_))
        | (FieldKind::Text, Value::Text(_))
        | (FieldKind::Ref { .. }, Value::Ref(_)) => Ok(()),

        (FieldKind::Enum { members }, Value::Enum(member)) => {
            if members.contains(&member.as_str()) {
                Ok(())
            } else {
                Err(ValidateError::UnknownEnumMember {
                    entity: entity.to_string(),
                    field: field.to_string(),
                    member: member.clone(),
                })
            }
        }

        (FieldKind::List(inner), Value::List(items)) => {
            for item in items {
                validate_value(entity, field, inner, item)?;
            }
            Ok(())
        }

        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{DRILL, SCREENING, screening_fields};
    use crate::value::RecordRef;

    #[test]
    fn well_formed_row_passes() {
        let fields = screening_fields("Screening One", "compare_images", &["4", "5"]);

        assert!(validate_row(&SCREENING, &fields).is_ok());
    }

    #[test]
    fn undeclared_field_is_rejected() {
        let mut fields = screening_fields("Screening One", "compare_images", &["4"]);
        fields.insert("surprise".to_string(), Value::Bool(true));

        let err = validate_row(&SCREENING, &fields).expect_err("undeclared field should fail");
        assert!(matches!(err, ValidateError::UnknownField { .. }));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let mut fields = screening_fields("Screening One", "compare_images", &["4"]);
        fields.remove("title");

        let err = validate_row(&SCREENING, &fields).expect_err("missing title should fail");
        assert!(matches!(err, ValidateError::NullNotAllowed { .. }));
    }

    #[test]
    fn enum_member_outside_declared_set_is_rejected() {
        let fields = screening_fields("Screening One", "compare_sounds", &["4"]);

        let err = validate_row(&SCREENING, &fields).expect_err("unknown member should fail");
        assert!(matches!(err, ValidateError::UnknownEnumMember { .. }));
    }

    #[test]
    fn list_elements_are_validated_recursively() {
        let mut fields = screening_fields("Screening One", "compare_images", &["4"]);
        fields.insert(
            "grades".to_string(),
            Value::List(vec![Value::Enum("4".into()), Value::Uint(4)]),
        );

        let err = validate_row(&SCREENING, &fields).expect_err("mixed list should fail");
        assert!(matches!(err, ValidateError::KindMismatch { .. }));
    }

    #[test]
    fn ref_field_accepts_record_refs_only() {
        let mut fields = RowFields::new();
        fields.insert("position".to_string(), Value::Uint(1));
        fields.insert("grades".to_string(), Value::List(vec![]));
        fields.insert("screening".to_string(), Value::Uint(9));

        let err = validate_row(&DRILL, &fields).expect_err("uint in ref field should fail");
        assert!(matches!(err, ValidateError::KindMismatch { .. }));

        fields.insert(
            "screening".to_string(),
            Value::Ref(RecordRef::Persisted(9)),
        );
        assert!(validate_row(&DRILL, &fields).is_ok());
    }
}
