//! Constraint registry.
//!
//! Entries declare constraints either as ready-made [`Constraint`] objects or
//! as descriptors `{ "type": <kind>, ...params }`. The registry maps each kind
//! to a builder that turns the params into a constraint. Constraints are
//! applied left to right: each one refines the validator produced by the
//! previous one.
//!
//! # Built-in kinds
//!
//! | Kind | Params |
//! |------|--------|
//! | `required`, `url`, `email`, `uuid`, `positive`, `negative`, `integer` | `message` |
//! | `matches` | `regexp`, `message`, `excludeEmptyString` |
//! | `min`, `max`, `lessThan`, `moreThan`, `length`, `maxSize` | `ref`, `message` |
//! | `oneOf`, `blacklist`, `supportedFormat`, `unsupportedFormat` | `arrayOfValues`, `message` |
//! | `when` | `ref`, `test`, `then`, `otherwise` |
//! | `nullable` | none |
//!
//! `test` and `ref` are reserved names, not kinds: a descriptor using either
//! fails with [`CompileError::InvalidConstraint`]. Predicates are built in
//! Rust with [`ConstraintSpec::test`] and references with [`reference`].
//!
//! A `ref` param is either a literal or `{ "type": "ref", "ref": "<path>" }`,
//! which reads a sibling field at validation time.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::document::parse_constraint;
use crate::engine::{parse_date, Kind, Predicate, Reference, Test, TestContext, Validator};
use crate::error::CompileError;
use crate::types::{ConstraintSpec, Dependencies, WhenSpec};

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// A refinement step applied to a validator during compilation.
///
/// Implementations may record `(key, referenced)` pairs in `dependencies`.
/// That happens once per application, at compile time.
pub trait Constraint: Send + Sync {
    fn apply(&self, validator: Validator, key: &str, dependencies: &mut Dependencies) -> Validator;
}

impl<F> Constraint for F
where
    F: Fn(Validator, &str, &mut Dependencies) -> Validator + Send + Sync,
{
    fn apply(&self, validator: Validator, key: &str, dependencies: &mut Dependencies) -> Validator {
        self(validator, key, dependencies)
    }
}

/// Fold `constraints` over `validator` in order.
pub fn reduce(
    constraints: &[Arc<dyn Constraint>],
    validator: Validator,
    key: &str,
    dependencies: &mut Dependencies,
) -> Validator {
    constraints
        .iter()
        .fold(validator, |v, c| c.apply(v, key, dependencies))
}

/// JSON form of a lazy reference to another field.
pub fn reference(path: &str) -> Value {
    json!({ "type": "ref", "ref": path })
}

/// A constraint argument: literal, or a field read at validation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Ref(Reference),
}

impl Operand {
    pub fn from_json(value: &Value) -> Self {
        let is_ref = value.get("type").and_then(Value::as_str) == Some("ref");
        match value.get("ref").and_then(Value::as_str) {
            Some(path) if is_ref => Operand::Ref(Reference::new(path)),
            _ => Operand::Literal(value.clone()),
        }
    }

    pub fn reference(&self) -> Option<&Reference> {
        match self {
            Operand::Ref(r) => Some(r),
            Operand::Literal(_) => None,
        }
    }

    pub fn resolve<'a>(&'a self, ctx: &TestContext<'a>) -> &'a Value {
        match self {
            Operand::Literal(v) => v,
            Operand::Ref(r) => ctx.resolve(r),
        }
    }
}

/// Params of a descriptor, as seen by a builder.
pub struct Params<'a> {
    key: &'a str,
    kind: &'a str,
    values: &'a Map<String, Value>,
    registry: &'a ConstraintRegistry,
}

impl<'a> Params<'a> {
    /// Key of the field the constraint is declared on.
    pub fn key(&self) -> &'a str {
        self.key
    }

    pub fn kind(&self) -> &'a str {
        self.kind
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.values.get(name)
    }

    /// The `message` param, or `default`.
    pub fn message(&self, default: &str) -> String {
        self.values
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    pub fn operand(&self, name: &str) -> Result<Operand, CompileError> {
        self.values
            .get(name)
            .map(Operand::from_json)
            .ok_or_else(|| self.invalid(format!("missing \"{}\" param", name)))
    }

    pub fn list(&self, name: &str) -> Result<Vec<Operand>, CompileError> {
        match self.values.get(name) {
            Some(Value::Array(items)) => Ok(items.iter().map(Operand::from_json).collect()),
            Some(_) => Err(self.invalid(format!("\"{}\" must be an array", name))),
            None => Err(self.invalid(format!("missing \"{}\" param", name))),
        }
    }

    pub fn string(&self, name: &str) -> Result<&'a str, CompileError> {
        match self.values.get(name) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(_) => Err(self.invalid(format!("\"{}\" must be a string", name))),
            None => Err(self.invalid(format!("missing \"{}\" param", name))),
        }
    }

    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn registry(&self) -> &'a ConstraintRegistry {
        self.registry
    }

    pub fn invalid(&self, message: impl Into<String>) -> CompileError {
        CompileError::InvalidConstraint {
            key: self.key.to_string(),
            kind: self.kind.to_string(),
            message: message.into(),
        }
    }
}

/// Message for a descriptor naming a reserved, unbuildable kind.
pub(crate) fn reserved_kind(kind: &str) -> Option<&'static str> {
    match kind {
        "test" => Some("a predicate is required; build it with ConstraintSpec::test"),
        "ref" => Some("a reference is a param value, not a constraint"),
        _ => None,
    }
}

type BuilderFn = dyn Fn(&Params<'_>) -> Result<Arc<dyn Constraint>, CompileError> + Send + Sync;

/// Maps constraint kinds to builders.
#[derive(Clone)]
pub struct ConstraintRegistry {
    builders: HashMap<String, Arc<BuilderFn>>,
}

impl Default for ConstraintRegistry {
    /// Registry holding every built-in kind.
    fn default() -> Self {
        let mut registry = Self::empty();
        register_builtins(&mut registry);
        registry
    }
}

impl fmt::Debug for ConstraintRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ConstraintRegistry {
    /// Registry without any kinds.
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Add a kind, replacing any builder already registered under it.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        builder: impl Fn(&Params<'_>) -> Result<Arc<dyn Constraint>, CompileError>
            + Send
            + Sync
            + 'static,
    ) {
        self.builders.insert(kind.into(), Arc::new(builder));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.builders.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Turn a declared constraint into an applicable one.
    ///
    /// # Errors
    ///
    /// `UnknownConstraintKind` when a descriptor names an unregistered kind,
    /// `InvalidConstraint` when its params are malformed.
    pub fn resolve(
        &self,
        spec: &ConstraintSpec,
        key: &str,
    ) -> Result<Arc<dyn Constraint>, CompileError> {
        match spec {
            ConstraintSpec::Custom(constraint) => Ok(Arc::clone(constraint)),
            ConstraintSpec::Descriptor(descriptor) => {
                let params = Params {
                    key,
                    kind: &descriptor.kind,
                    values: &descriptor.params,
                    registry: self,
                };
                match self.builders.get(&descriptor.kind) {
                    Some(builder) => builder(&params),
                    None => match reserved_kind(&descriptor.kind) {
                        Some(message) => Err(params.invalid(message)),
                        None => Err(CompileError::UnknownConstraintKind {
                            key: key.to_string(),
                            kind: descriptor.kind.clone(),
                        }),
                    },
                }
            }
            ConstraintSpec::When(spec) => Ok(Arc::new(When {
                reference: Reference::new(spec.reference.as_str()),
                predicate: Arc::clone(&spec.test),
                then: self.resolve_all(&spec.then, key)?,
                otherwise: self.resolve_all(&spec.otherwise, key)?,
            })),
        }
    }

    pub fn resolve_all(
        &self,
        specs: &[ConstraintSpec],
        key: &str,
    ) -> Result<Vec<Arc<dyn Constraint>>, CompileError> {
        specs.iter().map(|spec| self.resolve(spec, key)).collect()
    }
}

impl ConstraintSpec {
    /// Custom check. `check` sees the cast value (possibly `null`) and the
    /// object holding the field.
    pub fn test(
        name: impl Into<String>,
        message: impl Into<String>,
        check: impl Fn(&Value, &TestContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        let test = Test::new(name, message, check);
        ConstraintSpec::custom(move |v: Validator, _: &str, _: &mut Dependencies| {
            v.test(test.clone())
        })
    }

    /// Conditional constraint: `then` applies when `test` holds for the
    /// referenced sibling, `otherwise` when it does not.
    pub fn when(
        reference: impl Into<String>,
        test: impl Fn(&Value) -> bool + Send + Sync + 'static,
        then: Vec<ConstraintSpec>,
        otherwise: Vec<ConstraintSpec>,
    ) -> Self {
        ConstraintSpec::When(Box::new(WhenSpec {
            reference: reference.into(),
            test: Arc::new(test),
            then,
            otherwise,
        }))
    }
}

fn register_builtins(registry: &mut ConstraintRegistry) {
    registry.register("required", |p| {
        Ok(Arc::new(Required {
            message: p.message("Value is required"),
        }))
    });
    registry.register("url", |p| {
        Ok(Arc::new(StringCheck {
            name: "url",
            message: p.message("Value must be a valid URL"),
            check: is_url,
        }))
    });
    registry.register("uuid", |p| {
        Ok(Arc::new(StringCheck {
            name: "uuid",
            message: p.message("Value must be a valid UUID"),
            check: is_uuid,
        }))
    });
    registry.register("email", |p| {
        let regex = Regex::new(EMAIL_PATTERN).map_err(|e| p.invalid(e.to_string()))?;
        Ok(Arc::new(Pattern {
            name: "email",
            regex,
            message: p.message("Value must be a valid email"),
            exclude_empty: true,
        }))
    });
    registry.register("matches", |p| {
        let regex = Regex::new(p.string("regexp")?).map_err(|e| p.invalid(e.to_string()))?;
        Ok(Arc::new(Pattern {
            name: "matches",
            regex,
            message: p.message("Value does not match the expected format"),
            exclude_empty: p.flag("excludeEmptyString", false),
        }))
    });

    for (kind, op, default_message) in [
        ("min", BoundOp::Min, "Value is below the minimum"),
        ("max", BoundOp::Max, "Value is above the maximum"),
        ("lessThan", BoundOp::LessThan, "Value must be less than the limit"),
        ("moreThan", BoundOp::MoreThan, "Value must be more than the limit"),
        ("length", BoundOp::Length, "Value does not have the expected length"),
    ] {
        registry.register(kind, move |p| {
            Ok(Arc::new(Bound {
                name: kind,
                op,
                operand: p.operand("ref")?,
                message: p.message(default_message),
            }))
        });
    }

    registry.register("positive", |p| {
        Ok(Arc::new(NumberCheck {
            name: "positive",
            message: p.message("Value must be a positive number"),
            check: |n| n > 0.0,
        }))
    });
    registry.register("negative", |p| {
        Ok(Arc::new(NumberCheck {
            name: "negative",
            message: p.message("Value must be a negative number"),
            check: |n| n < 0.0,
        }))
    });
    registry.register("integer", |p| {
        Ok(Arc::new(NumberCheck {
            name: "integer",
            message: p.message("Value must be an integer"),
            check: |n| n.fract() == 0.0,
        }))
    });

    registry.register("supportedFormat", |p| {
        Ok(Arc::new(FileFormat {
            values: literals(p.list("arrayOfValues")?),
            supported: true,
            message: p.message("File format is not supported"),
        }))
    });
    registry.register("unsupportedFormat", |p| {
        Ok(Arc::new(FileFormat {
            values: literals(p.list("arrayOfValues")?),
            supported: false,
            message: p.message("File format is not supported"),
        }))
    });
    registry.register("maxSize", |p| {
        Ok(Arc::new(MaxSize {
            operand: p.operand("ref")?,
            message: p.message("File is too large"),
        }))
    });

    registry.register("oneOf", |p| {
        Ok(Arc::new(OneOf {
            values: p.list("arrayOfValues")?,
            allowed: true,
            message: p.message("Value is not one of the allowed values"),
        }))
    });
    registry.register("blacklist", |p| {
        Ok(Arc::new(OneOf {
            values: p.list("arrayOfValues")?,
            allowed: false,
            message: p.message("Value is not allowed"),
        }))
    });

    registry.register("nullable", |_| {
        Ok(Arc::new(|v: Validator, _: &str, _: &mut Dependencies| v.nullable()))
    });

    registry.register("when", build_when);

}

fn build_when(p: &Params<'_>) -> Result<Arc<dyn Constraint>, CompileError> {
    let reference = p.string("ref")?.to_string();
    let test: Predicate = match p.get("test") {
        Some(expected) => {
            let expected = expected.clone();
            Arc::new(move |v: &Value| v == &expected)
        }
        None => Arc::new(is_truthy),
    };
    let branch = |name: &str| -> Result<Vec<ConstraintSpec>, CompileError> {
        match p.get(name) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_constraint(item, &format!("{}/{}/{}", p.key(), name, i)))
                .collect(),
            Some(_) => Err(p.invalid(format!("\"{}\" must be an array", name))),
        }
    };
    let spec = ConstraintSpec::When(Box::new(WhenSpec {
        reference,
        test,
        then: branch("then")?,
        otherwise: branch("otherwise")?,
    }));
    p.registry().resolve(&spec, p.key())
}

fn literals(operands: Vec<Operand>) -> Vec<Value> {
    operands
        .into_iter()
        .map(|o| match o {
            Operand::Literal(v) => v,
            Operand::Ref(r) => Value::String(r.path().to_string()),
        })
        .collect()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn is_url(s: &str) -> bool {
    url::Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https" | "ftp") && u.host().is_some())
        .unwrap_or(false)
}

fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::try_parse(s).is_ok()
}

/// Numeric form of a value: numbers as-is, numeric strings parsed.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

struct Required {
    message: String,
}

impl Constraint for Required {
    fn apply(&self, validator: Validator, _: &str, _: &mut Dependencies) -> Validator {
        validator.test(Test::new("required", &self.message, |v, _| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }))
    }
}

struct StringCheck {
    name: &'static str,
    message: String,
    check: fn(&str) -> bool,
}

impl Constraint for StringCheck {
    fn apply(&self, validator: Validator, _: &str, _: &mut Dependencies) -> Validator {
        let check = self.check;
        validator.test(Test::new(self.name, &self.message, move |v, _| match v {
            Value::String(s) if !s.is_empty() => check(s),
            _ => true,
        }))
    }
}

struct Pattern {
    name: &'static str,
    regex: Regex,
    message: String,
    exclude_empty: bool,
}

impl Constraint for Pattern {
    fn apply(&self, validator: Validator, _: &str, _: &mut Dependencies) -> Validator {
        let regex = self.regex.clone();
        let exclude_empty = self.exclude_empty;
        validator.test(Test::new(self.name, &self.message, move |v, _| match v {
            Value::String(s) if s.is_empty() && exclude_empty => true,
            Value::String(s) => regex.is_match(s),
            _ => true,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum BoundOp {
    Min,
    Max,
    LessThan,
    MoreThan,
    Length,
}

impl BoundOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            BoundOp::Min => ordering != Ordering::Less,
            BoundOp::Max => ordering != Ordering::Greater,
            BoundOp::LessThan => ordering == Ordering::Less,
            BoundOp::MoreThan => ordering == Ordering::Greater,
            BoundOp::Length => ordering == Ordering::Equal,
        }
    }

    fn tracks_reference(self) -> bool {
        matches!(self, BoundOp::LessThan | BoundOp::MoreThan)
    }
}

/// Comparison against a limit. What is compared depends on the base type:
/// string length, number value, date order, array item count.
struct Bound {
    name: &'static str,
    op: BoundOp,
    operand: Operand,
    message: String,
}

impl Constraint for Bound {
    fn apply(&self, validator: Validator, key: &str, dependencies: &mut Dependencies) -> Validator {
        if self.op.tracks_reference() {
            if let Some(reference) = self.operand.reference() {
                dependencies.push(key, reference.path());
            }
        }
        let kind = validator.kind();
        let op = self.op;
        let operand = self.operand.clone();
        validator.test(Test::new(self.name, &self.message, move |v, ctx| {
            let limit = operand.resolve(ctx);
            if v.is_null() || limit.is_null() {
                return true;
            }
            let ordering = if kind == Kind::Date {
                match (parse_date(v), parse_date(limit)) {
                    (Some(a), Some(b)) => Some(a.cmp(&b)),
                    _ => None,
                }
            } else {
                let measured = match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => Some(s.chars().count() as f64),
                    Value::Array(items) => Some(items.len() as f64),
                    _ => None,
                };
                measured
                    .zip(as_number(limit))
                    .and_then(|(a, b)| a.partial_cmp(&b))
            };
            ordering.map(|o| op.holds(o)).unwrap_or(true)
        }))
    }
}

struct NumberCheck {
    name: &'static str,
    message: String,
    check: fn(f64) -> bool,
}

impl Constraint for NumberCheck {
    fn apply(&self, validator: Validator, _: &str, _: &mut Dependencies) -> Validator {
        let check = self.check;
        validator.test(Test::new(self.name, &self.message, move |v, _| {
            v.as_f64().map(check).unwrap_or(true)
        }))
    }
}

/// Files are objects carrying a `type` (MIME) and a `size`; a field may hold
/// one file or a list of them.
fn files(value: &Value) -> Vec<&Map<String, Value>> {
    match value {
        Value::Object(file) => vec![file],
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

struct FileFormat {
    values: Vec<Value>,
    supported: bool,
    message: String,
}

impl Constraint for FileFormat {
    fn apply(&self, validator: Validator, _: &str, _: &mut Dependencies) -> Validator {
        let values = self.values.clone();
        let supported = self.supported;
        let name = if supported {
            "supportedFormat"
        } else {
            "unsupportedFormat"
        };
        validator.test(Test::new(name, &self.message, move |v, _| {
            files(v).iter().all(|file| match file.get("type") {
                Some(mime) => values.contains(mime) == supported,
                None => true,
            })
        }))
    }
}

struct MaxSize {
    operand: Operand,
    message: String,
}

impl Constraint for MaxSize {
    fn apply(&self, validator: Validator, _: &str, _: &mut Dependencies) -> Validator {
        let operand = self.operand.clone();
        validator.test(Test::new("maxSize", &self.message, move |v, ctx| {
            let Some(limit) = as_number(operand.resolve(ctx)) else {
                return true;
            };
            files(v).iter().all(|file| {
                file.get("size")
                    .and_then(Value::as_f64)
                    .map(|size| size <= limit)
                    .unwrap_or(true)
            })
        }))
    }
}

struct OneOf {
    values: Vec<Operand>,
    allowed: bool,
    message: String,
}

impl Constraint for OneOf {
    fn apply(&self, validator: Validator, _: &str, _: &mut Dependencies) -> Validator {
        let values = self.values.clone();
        let allowed = self.allowed;
        let name = if allowed { "oneOf" } else { "blacklist" };
        validator.test(Test::new(name, &self.message, move |v, ctx| {
            if v.is_null() {
                return true;
            }
            let listed = values.iter().any(|o| o.resolve(ctx) == v);
            listed == allowed
        }))
    }
}

struct When {
    reference: Reference,
    predicate: Predicate,
    then: Vec<Arc<dyn Constraint>>,
    otherwise: Vec<Arc<dyn Constraint>>,
}

impl Constraint for When {
    fn apply(&self, validator: Validator, key: &str, dependencies: &mut Dependencies) -> Validator {
        dependencies.push(key, self.reference.path());
        let then = reduce(&self.then, validator.clone(), key, dependencies);
        let otherwise = reduce(&self.otherwise, validator, key, dependencies);
        Validator::switch(
            self.reference.clone(),
            Arc::clone(&self.predicate),
            then,
            otherwise,
        )
    }
}
