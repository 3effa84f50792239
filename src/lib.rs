//! Form Schema
//!
//! Compiles declarative form schemas into validators for submitted form data.
//!
//! A form is described by a [`Schema`] (field key to [`SchemaEntry`]) and an
//! optional [`Flow`] that orders and groups the keys. Compilation walks the
//! flow, resolves conditional sub-schemas against the data being validated,
//! folds each entry's constraints through a [`ConstraintRegistry`] and records
//! which fields reference which. Validation then casts the data (numeric
//! strings to numbers, blank strings to `null`) and collects every field
//! error.
//!
//! # Example
//!
//! ```
//! use form_schema::{reference, validate, ConstraintSpec, FieldType, Schema, SchemaEntry};
//! use serde_json::json;
//!
//! let schema = Schema::new()
//!     .field("value", SchemaEntry::new(FieldType::Number))
//!     .field(
//!         "test",
//!         SchemaEntry::new(FieldType::Number).constraint(ConstraintSpec::descriptor(
//!             "moreThan",
//!             json!({ "ref": reference("value") }),
//!         )),
//!     );
//!
//! let out = validate(None, &schema, &json!({ "value": "1", "test": 5 })).unwrap();
//! assert_eq!(out, json!({ "value": 1, "test": 5 }));
//!
//! let err = validate(None, &schema, &json!({ "value": 9, "test": 5 })).unwrap_err();
//! assert_eq!(err.field_errors()[0].path, "test");
//! ```
//!
//! # Entry Compilation
//!
//! | Entry | Compiles to |
//! |-------|-------------|
//! | `array` / `isMulti` | array of `{ "value": element }` carriers |
//! | `object` + `conditionalSchema` | object over the branch chosen from the data |
//! | `object` + `schema` | nested object (permissive when the schema is empty) |
//! | anything else | primitive validator refined by `constraints` |
//!
//! # Document Format
//!
//! Documents loaded from JSON use the same field names:
//! ```json
//! {
//!   "schema": {
//!     "age": { "type": "number", "constraints": [{ "type": "min", "ref": 18 }] }
//!   },
//!   "flow": ["age"]
//! }
//! ```

mod compiler;
mod document;
mod engine;
mod error;
mod linter;
mod loader;
mod registry;
mod resolver;
mod types;
mod validator;

pub use compiler::{compile, Compiled, Compiler, CARRIER_KEY};
pub use document::{parse_constraint, parse_document, parse_entry, parse_flow, parse_schema, FormDocument};
pub use engine::{parse_date, Kind, ObjectShape, Predicate, Reference, Test, TestContext, Validator};
pub use error::{CompileError, ErrorKind, FieldError, ValidateError};
pub use linter::{lint, lint_file, Diagnostic, FileResult, FileStatus, LintResult, Severity};
pub use loader::{is_url, load_document, load_document_auto, load_document_str, load_value};
pub use registry::{reduce, reference, Constraint, ConstraintRegistry, Operand, Params};
pub use resolver::{
    default_type_message, empty_object, resolve_type, ARRAY_TYPE_MESSAGE, BOOL_TYPE_MESSAGE,
    DATE_TYPE_MESSAGE, NUMBER_TYPE_MESSAGE, OBJECT_TYPE_MESSAGE, STRING_TYPE_MESSAGE,
};
pub use types::{
    ConditionFn, ConditionInput, Condition, ConditionalSchema, ConstraintSpec, Dependencies,
    Descriptor, FieldType, Flow, FlowItem, Format, Schema, SchemaEntry, SwitchCase,
    ValidateOptions, WhenSpec,
};
pub use validator::{validate, validate_document, validate_with};

#[cfg(feature = "remote")]
pub use loader::load_document_url;
