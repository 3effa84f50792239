//! Primitive type resolvers: the unconstrained base validator of each entry
//! type.
//!
//! | Type | Accepts | Coercion |
//! |------|---------|----------|
//! | `string` | strings, `null` | numbers and booleans become strings |
//! | `number` | numbers, `null` | numeric strings parsed, blank strings become `null` |
//! | `bool` | `true`, `false`, `null` | none |
//! | `date` | RFC 3339, `YYYY-MM-DD`, epoch millis, `null` | none |
//! | `object` | objects, `null` | none |
//! | `file`, `json` | anything | none |

use crate::engine::Validator;
use crate::types::FieldType;

pub const STRING_TYPE_MESSAGE: &str = "Value must be a string";
pub const NUMBER_TYPE_MESSAGE: &str = "Value must be a number";
pub const BOOL_TYPE_MESSAGE: &str = "Value must be a boolean";
pub const DATE_TYPE_MESSAGE: &str = "Value must be a date";
pub const OBJECT_TYPE_MESSAGE: &str = "Value must be an object";
pub const ARRAY_TYPE_MESSAGE: &str = "Value must be an array";

/// Default type mismatch message for a field type. Opaque types never
/// mismatch and have none.
pub fn default_type_message(field_type: FieldType) -> Option<&'static str> {
    match field_type {
        FieldType::String => Some(STRING_TYPE_MESSAGE),
        FieldType::Number => Some(NUMBER_TYPE_MESSAGE),
        FieldType::Bool => Some(BOOL_TYPE_MESSAGE),
        FieldType::Date => Some(DATE_TYPE_MESSAGE),
        FieldType::Object => Some(OBJECT_TYPE_MESSAGE),
        FieldType::File | FieldType::Json => None,
    }
}

/// Base validator for `field_type`: nullable, optional, no constraints.
///
/// `type_error` replaces the default type mismatch message.
pub fn resolve_type(field_type: FieldType, type_error: Option<&str>) -> Validator {
    let message = type_error
        .or_else(|| default_type_message(field_type))
        .unwrap_or_default();
    let base = match field_type {
        FieldType::String => Validator::string(message),
        FieldType::Number => Validator::number(message),
        FieldType::Bool => Validator::boolean(message),
        FieldType::Date => Validator::date(message),
        FieldType::Object => Validator::object(message),
        FieldType::File | FieldType::Json => Validator::any(),
    };
    base.nullable()
}

/// Permissive nested-object validator, used when a sub-schema has no fields.
pub fn empty_object(type_error: Option<&str>) -> Validator {
    Validator::object(type_error.unwrap_or(OBJECT_TYPE_MESSAGE)).nullable()
}
