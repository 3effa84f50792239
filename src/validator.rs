//! Form data validation against schemas.

use serde_json::Value;

use crate::compiler::Compiler;
use crate::document::FormDocument;
use crate::error::ValidateError;
use crate::types::{Flow, Schema, ValidateOptions};

/// Validate form data against a schema with default options.
///
/// Compiles `schema` along `flow` using `value` itself to choose conditional
/// branches, then casts and checks `value`. Every field error is collected.
///
/// # Errors
///
/// Returns `ValidateError::Compile` if the schema does not compile, or
/// `ValidateError::Invalid` if the data is rejected.
pub fn validate(flow: Option<&Flow>, schema: &Schema, value: &Value) -> Result<Value, ValidateError> {
    validate_with(flow, schema, value, &ValidateOptions::default())
}

/// Validate form data with explicit options.
///
/// Returns the coerced value on success.
///
/// # Errors
///
/// See [`validate`].
pub fn validate_with(
    flow: Option<&Flow>,
    schema: &Schema,
    value: &Value,
    options: &ValidateOptions,
) -> Result<Value, ValidateError> {
    let compiled = Compiler::new(&options.registry).compile(flow, schema, value)?;
    compiled.validate(value, options)
}

/// Validate form data against a loaded document.
///
/// # Errors
///
/// See [`validate`].
pub fn validate_document(
    document: &FormDocument,
    value: &Value,
    options: &ValidateOptions,
) -> Result<Value, ValidateError> {
    validate_with(document.flow.as_ref(), &document.schema, value, options)
}
