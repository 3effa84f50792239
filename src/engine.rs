//! Validator nodes executed against JSON values.
//!
//! A [`Validator`] runs in two passes over the data. [`Validator::cast`]
//! normalizes the value (numeric strings to numbers, empty number inputs to
//! `null`, and so on). The cast value is then checked, collecting every type
//! mismatch and constraint failure with the path of the offending field.
//!
//! Constraints never build nodes directly; they refine an existing validator
//! with [`Validator::test`], [`Validator::nullable`] or [`Validator::switch`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};

use crate::error::FieldError;
use crate::types::{Dependencies, ValidateOptions};

static NULL: Value = Value::Null;

/// Check function of a [`Test`]. Receives the cast value of the field and the
/// object holding it.
pub type TestFn = dyn Fn(&Value, &TestContext<'_>) -> bool + Send + Sync;

/// Predicate over a referenced value, used by [`Validator::switch`].
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Base type a node checks before running its tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    String,
    Number,
    Bool,
    Date,
    Object,
    Array,
    Any,
}

/// A lazy reference to a sibling field, resolved at validation time.
///
/// The path is dotted (`address.city`); numeric segments index arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    path: String,
}

impl Reference {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Follow the path from `scope`. A missing segment resolves to `None`.
    pub fn resolve<'a>(&self, scope: &'a Value) -> Option<&'a Value> {
        lookup_path(scope, &self.path)
    }
}

/// Look up a dotted path inside a JSON value.
pub(crate) fn lookup_path<'a>(scope: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = scope;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// What a test sees besides the value under check.
pub struct TestContext<'a> {
    parent: Option<&'a Value>,
}

impl<'a> TestContext<'a> {
    /// The object holding the field being checked.
    pub fn parent(&self) -> Option<&'a Value> {
        self.parent
    }

    /// Resolve a reference against the parent. Missing references yield `null`.
    pub fn resolve(&self, reference: &Reference) -> &'a Value {
        self.parent
            .and_then(|parent| reference.resolve(parent))
            .unwrap_or(&NULL)
    }
}

/// A named check with the message reported when it fails.
#[derive(Clone)]
pub struct Test {
    name: String,
    message: String,
    check: Arc<TestFn>,
}

impl Test {
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        check: impl Fn(&Value, &TestContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("name", &self.name)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Fields of an object validator, with the order they are checked in.
#[derive(Debug, Clone, Default)]
pub struct ObjectShape {
    fields: Vec<(String, Validator)>,
    order: Vec<usize>,
}

impl ObjectShape {
    /// Build a shape. Fields referencing siblings (per `dependencies`) are
    /// checked after the siblings they reference; a cycle falls back to
    /// declaration order for the fields caught in it.
    pub fn new(fields: Vec<(String, Validator)>, dependencies: &Dependencies) -> Self {
        let order = evaluation_order(&fields, dependencies);
        Self { fields, order }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Validator> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Keys in the order fields are checked.
    pub fn evaluation_order(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|&i| self.fields[i].0.as_str())
    }
}

fn evaluation_order(fields: &[(String, Validator)], dependencies: &Dependencies) -> Vec<usize> {
    let index_of = |key: &str| fields.iter().position(|(k, _)| k == key);

    // edges[i] holds the fields that field i must wait for
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); fields.len()];
    for (key, referenced) in dependencies.iter() {
        if let (Some(from), Some(to)) = (index_of(key), index_of(referenced)) {
            if from != to {
                edges[from].push(to);
            }
        }
    }

    let mut done = vec![false; fields.len()];
    let mut order = Vec::with_capacity(fields.len());
    while order.len() < fields.len() {
        let ready = (0..fields.len())
            .find(|&i| !done[i] && edges[i].iter().all(|&dep| done[dep]))
            .or_else(|| (0..fields.len()).find(|&i| !done[i]));
        let Some(next) = ready else { break };
        done[next] = true;
        order.push(next);
    }
    order
}

#[derive(Debug, Clone)]
enum Base {
    String,
    Number,
    Bool,
    Date,
    Any,
    Object(Option<ObjectShape>),
    Array(Option<Box<Validator>>),
}

/// A single base-typed validator with its refinements.
#[derive(Debug, Clone)]
pub struct Node {
    base: Base,
    type_message: String,
    nullable: bool,
    tests: Vec<Test>,
}

impl Node {
    fn new(base: Base, type_message: &str) -> Self {
        Self {
            base,
            type_message: type_message.to_string(),
            nullable: false,
            tests: Vec::new(),
        }
    }

    fn kind(&self) -> Kind {
        match self.base {
            Base::String => Kind::String,
            Base::Number => Kind::Number,
            Base::Bool => Kind::Bool,
            Base::Date => Kind::Date,
            Base::Any => Kind::Any,
            Base::Object(_) => Kind::Object,
            Base::Array(_) => Kind::Array,
        }
    }
}

/// Conditional validator choosing a branch from a referenced value.
#[derive(Clone)]
pub struct Switch {
    reference: Reference,
    predicate: Predicate,
    then: Validator,
    otherwise: Validator,
}

impl fmt::Debug for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Switch")
            .field("reference", &self.reference)
            .field("then", &self.then)
            .field("otherwise", &self.otherwise)
            .finish_non_exhaustive()
    }
}

/// A composable validator.
#[derive(Debug, Clone)]
pub enum Validator {
    Node(Node),
    Switch(Box<Switch>),
}

impl Validator {
    pub fn string(type_message: &str) -> Self {
        Validator::Node(Node::new(Base::String, type_message))
    }

    pub fn number(type_message: &str) -> Self {
        Validator::Node(Node::new(Base::Number, type_message))
    }

    pub fn boolean(type_message: &str) -> Self {
        Validator::Node(Node::new(Base::Bool, type_message))
    }

    pub fn date(type_message: &str) -> Self {
        Validator::Node(Node::new(Base::Date, type_message))
    }

    /// Accepts any value, including `null`.
    pub fn any() -> Self {
        Validator::Node(Node::new(Base::Any, "")).nullable()
    }

    /// Any JSON object, fields unchecked.
    pub fn object(type_message: &str) -> Self {
        Validator::Node(Node::new(Base::Object(None), type_message))
    }

    /// A JSON object whose fields are checked against `shape`.
    pub fn object_of(shape: ObjectShape, type_message: &str) -> Self {
        Validator::Node(Node::new(Base::Object(Some(shape)), type_message))
    }

    /// A JSON array whose items are checked against `item`.
    pub fn array_of(item: Validator, type_message: &str) -> Self {
        Validator::Node(Node::new(Base::Array(Some(Box::new(item))), type_message))
    }

    /// Check against `then` when `predicate` holds for the referenced value,
    /// against `otherwise` when it does not.
    pub fn switch(
        reference: Reference,
        predicate: Predicate,
        then: Validator,
        otherwise: Validator,
    ) -> Self {
        Validator::Switch(Box::new(Switch {
            reference,
            predicate,
            then,
            otherwise,
        }))
    }

    /// Base type, taken from the `then` branch of a switch.
    pub fn kind(&self) -> Kind {
        match self {
            Validator::Node(node) => node.kind(),
            Validator::Switch(switch) => switch.then.kind(),
        }
    }

    pub fn nullable(self) -> Self {
        self.map_nodes(&mut |mut node| {
            node.nullable = true;
            node
        })
    }

    /// Append a test. On a switch, the test lands in both branches.
    pub fn test(self, test: Test) -> Self {
        self.map_nodes(&mut |mut node| {
            node.tests.push(test.clone());
            node
        })
    }

    pub fn type_error(self, message: &str) -> Self {
        self.map_nodes(&mut |mut node| {
            node.type_message = message.to_string();
            node
        })
    }

    /// Names of the tests attached to this validator (first branch of a switch).
    pub fn test_names(&self) -> Vec<&str> {
        match self {
            Validator::Node(node) => node.tests.iter().map(Test::name).collect(),
            Validator::Switch(switch) => switch.then.test_names(),
        }
    }

    /// Shape of an object validator, if it has one.
    pub fn shape(&self) -> Option<&ObjectShape> {
        match self {
            Validator::Node(Node {
                base: Base::Object(shape),
                ..
            }) => shape.as_ref(),
            _ => None,
        }
    }

    /// Item validator of an array validator.
    pub fn item(&self) -> Option<&Validator> {
        match self {
            Validator::Node(Node {
                base: Base::Array(item),
                ..
            }) => item.as_deref(),
            _ => None,
        }
    }

    fn map_nodes<F: FnMut(Node) -> Node>(self, f: &mut F) -> Self {
        match self {
            Validator::Node(node) => Validator::Node(f(node)),
            Validator::Switch(switch) => {
                let Switch {
                    reference,
                    predicate,
                    then,
                    otherwise,
                } = *switch;
                let then = then.map_nodes(f);
                let otherwise = otherwise.map_nodes(f);
                Validator::switch(reference, predicate, then, otherwise)
            }
        }
    }

    /// Cast then check `value`, collecting errors per `options`.
    ///
    /// Returns the cast value when no check failed.
    pub fn validate(&self, value: &Value, options: &ValidateOptions) -> Result<Value, Vec<FieldError>> {
        let cast = self.cast(value, options.strip_unknown);
        let mut report = Report::new(options.abort_early);
        self.check(&cast, None, "", &mut report);
        if report.errors.is_empty() {
            Ok(cast)
        } else {
            Err(report.errors)
        }
    }

    /// Normalize `value` towards this validator's base type.
    ///
    /// Values that cannot be coerced are returned unchanged so the check
    /// pass reports them.
    pub fn cast(&self, value: &Value, strip_unknown: bool) -> Value {
        let node = match self {
            Validator::Node(node) => node,
            Validator::Switch(switch) => return switch.then.cast(value, strip_unknown),
        };
        match (&node.base, value) {
            (Base::String, Value::Number(n)) => Value::String(n.to_string()),
            (Base::String, Value::Bool(b)) => Value::String(b.to_string()),
            (Base::Number, Value::String(s)) => cast_number(s).unwrap_or_else(|| value.clone()),
            (Base::Object(Some(shape)), Value::Object(map)) => {
                let mut out = Map::new();
                for (key, child) in map {
                    match shape.get(key) {
                        Some(field) => {
                            out.insert(key.clone(), field.cast(child, strip_unknown));
                        }
                        None if !strip_unknown => {
                            out.insert(key.clone(), child.clone());
                        }
                        None => {}
                    }
                }
                Value::Object(out)
            }
            (Base::Array(Some(item)), Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|child| item.cast(child, strip_unknown))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    fn check(&self, value: &Value, parent: Option<&Value>, path: &str, report: &mut Report) {
        if report.done() {
            return;
        }
        let node = match self {
            Validator::Node(node) => node,
            Validator::Switch(switch) => {
                let referenced = TestContext { parent }.resolve(&switch.reference);
                let branch = if (switch.predicate)(referenced) {
                    &switch.then
                } else {
                    &switch.otherwise
                };
                return branch.check(value, parent, path, report);
            }
        };

        if value.is_null() {
            if !node.nullable {
                report.push(FieldError::type_mismatch(path, &node.type_message));
                return;
            }
        } else if !matches_base(&node.base, value) {
            report.push(FieldError::type_mismatch(path, &node.type_message));
            return;
        }

        let ctx = TestContext { parent };
        for test in &node.tests {
            if report.done() {
                return;
            }
            if !(test.check)(value, &ctx) {
                report.push(FieldError::violation(path, &test.message));
            }
        }

        match (&node.base, value) {
            (Base::Object(Some(shape)), Value::Object(map)) => {
                for &i in &shape.order {
                    let (key, field) = &shape.fields[i];
                    let child = map.get(key).unwrap_or(&NULL);
                    field.check(child, Some(value), &join_key(path, key), report);
                }
            }
            (Base::Array(Some(item)), Value::Array(items)) => {
                for (i, child) in items.iter().enumerate() {
                    item.check(child, Some(value), &format!("{}[{}]", path, i), report);
                }
            }
            _ => {}
        }
    }
}

struct Report {
    errors: Vec<FieldError>,
    abort_early: bool,
}

impl Report {
    fn new(abort_early: bool) -> Self {
        Self {
            errors: Vec::new(),
            abort_early,
        }
    }

    fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    fn done(&self) -> bool {
        self.abort_early && !self.errors.is_empty()
    }
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn cast_number(input: &str) -> Option<Value> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(Value::Null);
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn matches_base(base: &Base, value: &Value) -> bool {
    match base {
        Base::String => value.is_string(),
        Base::Number => value.is_number(),
        Base::Bool => value.is_boolean(),
        Base::Date => parse_date(value).is_some(),
        Base::Any => true,
        Base::Object(_) => value.is_object(),
        Base::Array(_) => value.is_array(),
    }
}

/// Interpret a JSON value as a point in time.
///
/// Accepts RFC 3339 strings, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` (with a `T`
/// or a space) and integer epoch milliseconds.
pub fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.naive_utc());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.naive_utc()),
        _ => None,
    }
}
