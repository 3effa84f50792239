//! Core types for form schemas.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::registry::{Constraint, ConstraintRegistry};

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Base type of a schema entry. Selects the primitive resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Bool,
    Date,
    Object,
    File,
    Json,
}

impl FieldType {
    /// Parse the `type` tag of an entry.
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "bool" | "boolean" => Some(FieldType::Bool),
            "date" => Some(FieldType::Date),
            "object" => Some(FieldType::Object),
            "file" => Some(FieldType::File),
            "json" => Some(FieldType::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
            FieldType::Object => "object",
            FieldType::File => "file",
            FieldType::Json => "json",
        }
    }
}

/// Rendering refinement of an entry.
///
/// Only `Form` changes compilation: an object entry with format `form`
/// carries its own nested schema and flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Text,
    Textarea,
    Email,
    Password,
    Select,
    Buttons,
    Form,
    Code,
    Markdown,
    Datetime,
    Hidden,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Format::Text),
            "textarea" => Some(Format::Textarea),
            "email" => Some(Format::Email),
            "password" => Some(Format::Password),
            "select" => Some(Format::Select),
            "buttons" => Some(Format::Buttons),
            "form" => Some(Format::Form),
            "code" => Some(Format::Code),
            "markdown" => Some(Format::Markdown),
            "datetime" => Some(Format::Datetime),
            "hidden" => Some(Format::Hidden),
            _ => None,
        }
    }
}

/// A constraint as declared on an entry.
#[derive(Clone)]
pub enum ConstraintSpec {
    /// Ready-made constraint, applied as-is.
    Custom(Arc<dyn Constraint>),
    /// `{ type: <kind>, ...params }`, resolved through the registry.
    Descriptor(Descriptor),
    /// Higher-order conditional constraint built from Rust code.
    When(Box<WhenSpec>),
}

impl ConstraintSpec {
    /// Wrap a constraint object or closure.
    pub fn custom(constraint: impl Constraint + 'static) -> Self {
        ConstraintSpec::Custom(Arc::new(constraint))
    }

    /// Build a descriptor. `params` should be a JSON object; anything else
    /// is treated as no params.
    pub fn descriptor(kind: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ConstraintSpec::Descriptor(Descriptor {
            kind: kind.into(),
            params,
        })
    }
}

impl fmt::Debug for ConstraintSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintSpec::Custom(_) => f.write_str("Custom(..)"),
            ConstraintSpec::Descriptor(d) => f.debug_tuple("Descriptor").field(d).finish(),
            ConstraintSpec::When(w) => f.debug_tuple("When").field(w).finish(),
        }
    }
}

/// Named constraint kind plus its params.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub kind: String,
    pub params: Map<String, Value>,
}

/// Conditional constraint: `then` applies when `test` holds for the value of
/// the referenced field, `otherwise` when it does not.
#[derive(Clone)]
pub struct WhenSpec {
    pub reference: String,
    pub test: crate::engine::Predicate,
    pub then: Vec<ConstraintSpec>,
    pub otherwise: Vec<ConstraintSpec>,
}

impl fmt::Debug for WhenSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhenSpec")
            .field("reference", &self.reference)
            .field("then", &self.then)
            .field("otherwise", &self.otherwise)
            .finish_non_exhaustive()
    }
}

/// One field declaration.
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    pub field_type: FieldType,
    pub format: Option<Format>,
    /// Values are sequences of `{ value: T }` carriers.
    pub array: bool,
    /// Multi-value select; validated like `array`.
    pub is_multi: bool,
    pub schema: Option<Schema>,
    pub flow: Option<Flow>,
    pub conditional_schema: Option<ConditionalSchema>,
    /// Applied to the field (or to each element's `value` for arrays).
    pub constraints: Vec<ConstraintSpec>,
    /// Applied to the array itself.
    pub array_constraints: Vec<ConstraintSpec>,
    /// Overrides the resolver's default type mismatch message.
    pub type_error: Option<String>,
}

impl SchemaEntry {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            format: None,
            array: false,
            is_multi: false,
            schema: None,
            flow: None,
            conditional_schema: None,
            constraints: Vec::new(),
            array_constraints: Vec::new(),
            type_error: None,
        }
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn array(mut self, array: bool) -> Self {
        self.array = array;
        self
    }

    pub fn multi(mut self, is_multi: bool) -> Self {
        self.is_multi = is_multi;
        self
    }

    /// Attach a nested schema. The entry is rendered as a sub-form.
    pub fn nested(mut self, schema: Schema, flow: Option<Flow>) -> Self {
        self.schema = Some(schema);
        self.flow = flow;
        self
    }

    pub fn conditional(mut self, conditional: ConditionalSchema) -> Self {
        self.conditional_schema = Some(conditional);
        self
    }

    pub fn constraint(mut self, constraint: ConstraintSpec) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn array_constraint(mut self, constraint: ConstraintSpec) -> Self {
        self.array_constraints.push(constraint);
        self
    }

    pub fn type_error(mut self, message: impl Into<String>) -> Self {
        self.type_error = Some(message.into());
        self
    }
}

/// Ordered mapping from field key to entry. Insertion order is the default
/// flow.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entries: Vec<(String, SchemaEntry)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Schema::insert`].
    pub fn field(mut self, key: impl Into<String>, entry: SchemaEntry) -> Self {
        self.insert(key, entry);
        self
    }

    /// Insert or replace an entry. A replaced entry keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, entry: SchemaEntry) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = entry,
            None => self.entries.push((key, entry)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&SchemaEntry> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, e)| e)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SchemaEntry)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One step of a flow.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowItem {
    Key(String),
    /// Visual group; transparent for validation.
    Group {
        label: String,
        flow: Flow,
        collapsed: bool,
    },
}

/// Ordered field keys, optionally grouped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flow {
    items: Vec<FlowItem>,
}

impl Flow {
    pub fn new(items: Vec<FlowItem>) -> Self {
        Self { items }
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: keys.into_iter().map(|k| FlowItem::Key(k.into())).collect(),
        }
    }

    pub fn items(&self) -> &[FlowItem] {
        &self.items
    }

    /// Field keys in order, with groups flattened.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        collect_keys(&self.items, &mut keys);
        keys
    }
}

fn collect_keys<'a>(items: &'a [FlowItem], keys: &mut Vec<&'a str>) {
    for item in items {
        match item {
            FlowItem::Key(key) => keys.push(key),
            FlowItem::Group { flow, .. } => collect_keys(&flow.items, keys),
        }
    }
}

/// What a predicate condition receives when a branch is being chosen.
pub struct ConditionInput<'a> {
    /// Form data at the level of the conditional entry.
    pub raw_values: &'a Value,
    /// Current value of the referenced field (`null` when missing).
    pub ref_value: &'a Value,
}

pub type ConditionFn = dyn Fn(&ConditionInput<'_>) -> bool + Send + Sync;

/// How a switch case is matched.
#[derive(Clone)]
pub enum Condition {
    /// Equal to the referenced value.
    Literal(Value),
    Predicate(Arc<ConditionFn>),
}

impl Condition {
    pub fn predicate(f: impl Fn(&ConditionInput<'_>) -> bool + Send + Sync + 'static) -> Self {
        Condition::Predicate(Arc::new(f))
    }

    pub fn matches(&self, input: &ConditionInput<'_>) -> bool {
        match self {
            Condition::Literal(expected) => expected == input.ref_value,
            Condition::Predicate(f) => f(input),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Condition::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// One branch of a conditional schema.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub condition: Option<Condition>,
    pub schema: Schema,
    pub flow: Option<Flow>,
    /// Used when no other case matches.
    pub default: bool,
}

impl SwitchCase {
    pub fn when(condition: Condition, schema: Schema, flow: Option<Flow>) -> Self {
        Self {
            condition: Some(condition),
            schema,
            flow,
            default: false,
        }
    }

    pub fn fallback(schema: Schema, flow: Option<Flow>) -> Self {
        Self {
            condition: None,
            schema,
            flow,
            default: true,
        }
    }
}

/// Structure chosen at compile time from the value of another field.
#[derive(Debug, Clone)]
pub struct ConditionalSchema {
    /// Dotted path of the field whose value selects the branch.
    pub reference: String,
    pub cases: Vec<SwitchCase>,
}

impl ConditionalSchema {
    pub fn new(reference: impl Into<String>, cases: Vec<SwitchCase>) -> Self {
        Self {
            reference: reference.into(),
            cases,
        }
    }
}

/// `(field, referenced field)` pairs collected while compiling.
///
/// Duplicates are kept; consumers only need the union.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Dependencies {
    pairs: Vec<(String, String)>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, referenced: impl Into<String>) {
        self.pairs.push((key.into(), referenced.into()));
    }

    pub fn contains(&self, key: &str, referenced: &str) -> bool {
        self.pairs.iter().any(|(k, r)| k == key && r == referenced)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, r)| (k.as_str(), r.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Options for validation.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Stop at the first failing check. Defaults to false: every error is
    /// collected.
    pub abort_early: bool,
    /// Drop object keys without a shape entry from the returned value.
    /// Defaults to false: unknown keys pass through untouched.
    pub strip_unknown: bool,
    pub registry: ConstraintRegistry,
}

impl ValidateOptions {
    /// Collect-all mode, unknown keys kept, built-in constraint kinds.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort_early(mut self, abort_early: bool) -> Self {
        self.abort_early = abort_early;
        self
    }

    pub fn strip_unknown(mut self, strip_unknown: bool) -> Self {
        self.strip_unknown = strip_unknown;
        self
    }

    /// Use a registry with custom constraint kinds.
    pub fn registry(mut self, registry: ConstraintRegistry) -> Self {
        self.registry = registry;
        self
    }
}
