//! JSON form documents.
//!
//! A document pairs a schema with an optional flow:
//!
//! ```json
//! {
//!   "schema": {
//!     "name": { "type": "string", "constraints": [{ "type": "required" }] },
//!     "tags": { "type": "string", "array": true }
//!   },
//!   "flow": ["name", { "label": "More", "flow": ["tags"], "collapsed": true }]
//! }
//! ```
//!
//! Keys that only matter for rendering (`label`, `placeholder`, options...)
//! are ignored. Parse errors carry the JSON Pointer of the offending part.

use serde_json::{Map, Value};

use crate::error::CompileError;
use crate::types::{
    json_type_name, Condition, ConditionalSchema, ConstraintSpec, FieldType, Flow, FlowItem,
    Format, Schema, SchemaEntry, SwitchCase,
};

/// A parsed form document.
#[derive(Debug, Clone, Default)]
pub struct FormDocument {
    pub schema: Schema,
    /// `None` means schema key order.
    pub flow: Option<Flow>,
}

/// Parse a document value.
///
/// # Errors
///
/// Returns `CompileError::InvalidSchema` pointing at the first malformed part.
pub fn parse_document(value: &Value) -> Result<FormDocument, CompileError> {
    let map = expect_object(value, "")?;
    let schema = match map.get("schema") {
        Some(schema) => parse_schema(schema, "/schema")?,
        None => return Err(CompileError::invalid_schema("/", "missing \"schema\"")),
    };
    let flow = map
        .get("flow")
        .map(|flow| parse_flow(flow, "/flow"))
        .transpose()?;
    Ok(FormDocument { schema, flow })
}

pub fn parse_schema(value: &Value, path: &str) -> Result<Schema, CompileError> {
    let map = expect_object(value, path)?;
    let mut schema = Schema::new();
    for (key, entry) in map {
        let entry_path = format!("{}/{}", path, escape(key));
        schema.insert(key.clone(), parse_entry(entry, &entry_path)?);
    }
    Ok(schema)
}

pub fn parse_entry(value: &Value, path: &str) -> Result<SchemaEntry, CompileError> {
    let map = expect_object(value, path)?;

    let type_path = format!("{}/type", path);
    let field_type = match map.get("type") {
        Some(Value::String(s)) => FieldType::parse(s).ok_or_else(|| {
            CompileError::invalid_schema(&type_path, format!("unknown type \"{}\"", s))
        })?,
        Some(other) => return Err(wrong_type(&type_path, "string", other)),
        None => return Err(CompileError::invalid_schema(path, "missing \"type\"")),
    };

    let mut entry = SchemaEntry::new(field_type);

    if let Some(format) = map.get("format") {
        let format_path = format!("{}/format", path);
        let name = format
            .as_str()
            .ok_or_else(|| wrong_type(&format_path, "string", format))?;
        entry.format = Some(Format::parse(name).ok_or_else(|| {
            CompileError::invalid_schema(&format_path, format!("unknown format \"{}\"", name))
        })?);
    }

    entry.array = parse_flag(map, "array", path)?;
    entry.is_multi = parse_flag(map, "isMulti", path)?;

    if let Some(schema) = map.get("schema") {
        entry.schema = Some(parse_schema(schema, &format!("{}/schema", path))?);
    }
    if let Some(flow) = map.get("flow") {
        entry.flow = Some(parse_flow(flow, &format!("{}/flow", path))?);
    }
    if let Some(conditional) = map.get("conditionalSchema") {
        entry.conditional_schema = Some(parse_conditional(
            conditional,
            &format!("{}/conditionalSchema", path),
        )?);
    }
    if let Some(constraints) = map.get("constraints") {
        entry.constraints = parse_constraints(constraints, &format!("{}/constraints", path))?;
    }
    if let Some(constraints) = map.get("arrayConstraints") {
        entry.array_constraints =
            parse_constraints(constraints, &format!("{}/arrayConstraints", path))?;
    }
    if let Some(message) = map.get("typeError") {
        let message_path = format!("{}/typeError", path);
        entry.type_error = Some(
            message
                .as_str()
                .ok_or_else(|| wrong_type(&message_path, "string", message))?
                .to_string(),
        );
    }

    Ok(entry)
}

pub fn parse_flow(value: &Value, path: &str) -> Result<Flow, CompileError> {
    let items = value
        .as_array()
        .ok_or_else(|| wrong_type(path, "array", value))?;
    let mut flow = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}/{}", path, i);
        match item {
            Value::String(key) => flow.push(FlowItem::Key(key.clone())),
            Value::Object(group) => {
                let inner = group.get("flow").ok_or_else(|| {
                    CompileError::invalid_schema(&item_path, "flow group without \"flow\"")
                })?;
                flow.push(FlowItem::Group {
                    label: group
                        .get("label")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    flow: parse_flow(inner, &format!("{}/flow", item_path))?,
                    collapsed: parse_flag(group, "collapsed", &item_path)?,
                });
            }
            other => return Err(wrong_type(&item_path, "string or object", other)),
        }
    }
    Ok(Flow::new(flow))
}

fn parse_conditional(value: &Value, path: &str) -> Result<ConditionalSchema, CompileError> {
    let map = expect_object(value, path)?;
    let reference = match map.get("ref") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => return Err(wrong_type(&format!("{}/ref", path), "string", other)),
        None => return Err(CompileError::invalid_schema(path, "missing \"ref\"")),
    };
    let switch_path = format!("{}/switch", path);
    let cases = map
        .get("switch")
        .ok_or_else(|| CompileError::invalid_schema(path, "missing \"switch\""))?
        .as_array()
        .ok_or_else(|| CompileError::invalid_schema(&switch_path, "expected array"))?;

    let mut parsed = Vec::with_capacity(cases.len());
    for (i, case) in cases.iter().enumerate() {
        let case_path = format!("{}/{}", switch_path, i);
        let case_map = expect_object(case, &case_path)?;
        let schema = match case_map.get("schema") {
            Some(schema) => parse_schema(schema, &format!("{}/schema", case_path))?,
            None => Schema::new(),
        };
        let flow = case_map
            .get("flow")
            .map(|flow| parse_flow(flow, &format!("{}/flow", case_path)))
            .transpose()?;
        parsed.push(SwitchCase {
            condition: case_map.get("condition").cloned().map(Condition::Literal),
            schema,
            flow,
            default: parse_flag(case_map, "default", &case_path)?,
        });
    }
    Ok(ConditionalSchema::new(reference, parsed))
}

fn parse_constraints(value: &Value, path: &str) -> Result<Vec<ConstraintSpec>, CompileError> {
    let items = value
        .as_array()
        .ok_or_else(|| wrong_type(path, "array", value))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_constraint(item, &format!("{}/{}", path, i)))
        .collect()
}

/// Parse one constraint: a descriptor object, or a bare kind name.
pub fn parse_constraint(value: &Value, path: &str) -> Result<ConstraintSpec, CompileError> {
    match value {
        Value::String(kind) => Ok(ConstraintSpec::descriptor(kind.as_str(), Value::Null)),
        Value::Object(map) => {
            let kind = match map.get("type") {
                Some(Value::String(kind)) => kind.clone(),
                Some(other) => return Err(wrong_type(&format!("{}/type", path), "string", other)),
                None => return Err(CompileError::invalid_schema(path, "missing \"type\"")),
            };
            let params: Map<String, Value> = map
                .iter()
                .filter(|(k, _)| k.as_str() != "type")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Ok(ConstraintSpec::descriptor(kind, Value::Object(params)))
        }
        other => Err(wrong_type(path, "object or string", other)),
    }
}

fn parse_flag(map: &Map<String, Value>, name: &str, path: &str) -> Result<bool, CompileError> {
    match map.get(name) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(wrong_type(&format!("{}/{}", path, name), "boolean", other)),
    }
}

fn expect_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, CompileError> {
    value
        .as_object()
        .ok_or_else(|| wrong_type(if path.is_empty() { "/" } else { path }, "object", value))
}

fn wrong_type(path: &str, expected: &str, actual: &Value) -> CompileError {
    CompileError::invalid_schema(
        path,
        format!("expected {}, got {}", expected, json_type_name(actual)),
    )
}

/// JSON Pointer escaping (~ as ~0, / as ~1).
pub(crate) fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
