//! Schema compiler: turns a `Schema` + `Flow` into a validator shape and the
//! dependency pairs collected along the way.
//!
//! Compilation is depth-first over the flow. Each entry compiles by case, in
//! this order:
//!
//! 1. `array` / `isMulti`: array of `{ "value": T }` carriers, where `T` is
//!    the nested object (when the entry has a schema) or the primitive with
//!    the entry's constraints. `arrayConstraints` refine the array itself.
//! 2. object with `conditionalSchema`: one branch is chosen from the raw data
//!    and compiled as a nested object.
//! 3. object with `schema`: compiled as a nested object. An empty sub-schema
//!    gives a permissive object.
//! 4. anything else: primitive resolver folded through the constraints.
//!
//! Conditional branches are chosen from the data snapshot handed to
//! [`Compiler::compile`]. A compiled shape is only valid for that snapshot.

use serde_json::Value;
use tracing::{debug, trace};

use crate::engine::{lookup_path, ObjectShape, Validator};
use crate::error::{CompileError, ValidateError};
use crate::registry::{reduce, ConstraintRegistry};
use crate::resolver::{self, ARRAY_TYPE_MESSAGE, OBJECT_TYPE_MESSAGE};
use crate::types::{
    ConditionInput, ConstraintSpec, Dependencies, FieldType, Flow, FlowItem, Schema, SchemaEntry,
    SwitchCase, ValidateOptions,
};

static NULL: Value = Value::Null;

/// Key of the single field wrapping each array element.
pub const CARRIER_KEY: &str = "value";

/// Output of a compile: the per-field validators and the dependency pairs.
#[derive(Debug, Clone, Default)]
pub struct Compiled {
    /// One validator per effective flow key, in flow order.
    pub shape: Vec<(String, Validator)>,
    pub dependencies: Dependencies,
}

impl Compiled {
    /// Keys of the effective flow, after flattening groups and resolving
    /// conditional branches.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.shape.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Validator> {
        self.shape.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Composite object validator over the whole shape. The dependency pairs
    /// decide the order fields are checked in. The form itself is not
    /// nullable: `null` is a type mismatch at the empty path.
    pub fn to_validator(&self) -> Validator {
        let shape = ObjectShape::new(self.shape.clone(), &self.dependencies);
        Validator::object_of(shape, OBJECT_TYPE_MESSAGE)
    }

    /// Run the composite validator against `value`.
    ///
    /// # Errors
    ///
    /// `ValidateError::Invalid` with every field error found (or the first
    /// one when `options.abort_early` is set).
    pub fn validate(&self, value: &Value, options: &ValidateOptions) -> Result<Value, ValidateError> {
        self.to_validator()
            .validate(value, options)
            .map_err(|errors| ValidateError::Invalid { errors })
    }
}

/// Raw data visible while compiling one level of the schema.
#[derive(Clone, Copy)]
struct Scope<'a> {
    root: &'a Value,
    local: &'a Value,
}

impl<'a> Scope<'a> {
    fn root(raw: &'a Value) -> Self {
        Self {
            root: raw,
            local: raw,
        }
    }

    /// Scope for the entry stored under `key` at this level.
    fn enter(&self, key: &str) -> Self {
        Self {
            root: self.root,
            local: self.local.get(key).unwrap_or(&NULL),
        }
    }

    /// Scope for array elements: there is no single element snapshot.
    fn elements(&self) -> Self {
        Self {
            root: self.root,
            local: &NULL,
        }
    }

    /// Look a reference up locally, then from the root.
    fn lookup(&self, path: &str) -> &'a Value {
        lookup_path(self.local, path)
            .or_else(|| lookup_path(self.root, path))
            .unwrap_or(&NULL)
    }
}

/// Compiles schemas against one constraint registry.
pub struct Compiler<'r> {
    registry: &'r ConstraintRegistry,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r ConstraintRegistry) -> Self {
        Self { registry }
    }

    /// Compile `schema` along `flow` (schema key order when `None`).
    ///
    /// `raw` is the form data used to choose conditional branches.
    ///
    /// # Errors
    ///
    /// Stops at the first unknown or malformed constraint.
    pub fn compile(
        &self,
        flow: Option<&Flow>,
        schema: &Schema,
        raw: &Value,
    ) -> Result<Compiled, CompileError> {
        debug!(fields = schema.len(), "compiling form schema");
        let mut dependencies = Dependencies::new();
        let mut shape = Vec::new();
        self.compile_level(flow, schema, &mut dependencies, Scope::root(raw), &mut shape)?;
        debug!(
            fields = shape.len(),
            dependencies = dependencies.len(),
            "compiled form schema"
        );
        Ok(Compiled {
            shape,
            dependencies,
        })
    }

    fn compile_level(
        &self,
        flow: Option<&Flow>,
        schema: &Schema,
        dependencies: &mut Dependencies,
        scope: Scope<'_>,
        shape: &mut Vec<(String, Validator)>,
    ) -> Result<(), CompileError> {
        if schema.is_empty() {
            return Ok(());
        }
        match flow {
            Some(flow) => self.compile_items(flow.items(), schema, dependencies, scope, shape),
            None => {
                for (key, entry) in schema.iter() {
                    let validator = self.compile_entry(key, entry, dependencies, scope)?;
                    merge(shape, key, validator);
                }
                Ok(())
            }
        }
    }

    fn compile_items(
        &self,
        items: &[FlowItem],
        schema: &Schema,
        dependencies: &mut Dependencies,
        scope: Scope<'_>,
        shape: &mut Vec<(String, Validator)>,
    ) -> Result<(), CompileError> {
        for item in items {
            match item {
                FlowItem::Group { flow, .. } => {
                    self.compile_items(flow.items(), schema, dependencies, scope, shape)?;
                }
                FlowItem::Key(key) => match schema.get(key) {
                    Some(entry) => {
                        let validator = self.compile_entry(key, entry, dependencies, scope)?;
                        merge(shape, key, validator);
                    }
                    None => trace!(key = %key, "flow key has no schema entry, skipping"),
                },
            }
        }
        Ok(())
    }

    fn compile_entry(
        &self,
        key: &str,
        entry: &SchemaEntry,
        dependencies: &mut Dependencies,
        scope: Scope<'_>,
    ) -> Result<Validator, CompileError> {
        trace!(key, field_type = entry.field_type.as_str(), "compiling entry");
        let type_error = entry.type_error.as_deref();

        if entry.array || entry.is_multi {
            let element = match &entry.schema {
                Some(nested) => self.compile_nested(
                    entry.flow.as_ref(),
                    nested,
                    dependencies,
                    scope.elements(),
                    None,
                )?,
                None => resolver::resolve_type(entry.field_type, type_error),
            };
            let element = self.apply(&entry.constraints, element, key, dependencies)?;
            let carrier = ObjectShape::new(vec![(CARRIER_KEY.to_string(), element)], dependencies);
            let array = Validator::array_of(
                Validator::object_of(carrier, OBJECT_TYPE_MESSAGE).nullable(),
                ARRAY_TYPE_MESSAGE,
            )
            .nullable();
            return self.apply(&entry.array_constraints, array, key, dependencies);
        }

        if entry.field_type == FieldType::Object {
            if let Some(conditional) = &entry.conditional_schema {
                let local = scope.enter(key);
                let nested = match select_case(&conditional.cases, &conditional.reference, scope)
                {
                    Some((index, case)) => {
                        debug!(key, case = index, "selected conditional branch");
                        self.compile_nested(
                            case.flow.as_ref(),
                            &case.schema,
                            dependencies,
                            local,
                            type_error,
                        )?
                    }
                    None => {
                        debug!(key, "no conditional branch matched, using empty schema");
                        resolver::empty_object(type_error)
                    }
                };
                return self.apply(&entry.constraints, nested, key, dependencies);
            }

            if let Some(nested) = &entry.schema {
                let nested = self.compile_nested(
                    entry.flow.as_ref(),
                    nested,
                    dependencies,
                    scope.enter(key),
                    type_error,
                )?;
                return self.apply(&entry.constraints, nested, key, dependencies);
            }
        }

        let base = resolver::resolve_type(entry.field_type, type_error);
        self.apply(&entry.constraints, base, key, dependencies)
    }

    /// Object validator over a sub-schema, sharing the caller's dependency
    /// list.
    fn compile_nested(
        &self,
        flow: Option<&Flow>,
        schema: &Schema,
        dependencies: &mut Dependencies,
        scope: Scope<'_>,
        type_error: Option<&str>,
    ) -> Result<Validator, CompileError> {
        if schema.is_empty() {
            return Ok(resolver::empty_object(type_error));
        }
        let mut fields = Vec::new();
        self.compile_level(flow, schema, dependencies, scope, &mut fields)?;
        let shape = ObjectShape::new(fields, dependencies);
        Ok(Validator::object_of(shape, type_error.unwrap_or(OBJECT_TYPE_MESSAGE)).nullable())
    }

    fn apply(
        &self,
        specs: &[ConstraintSpec],
        validator: Validator,
        key: &str,
        dependencies: &mut Dependencies,
    ) -> Result<Validator, CompileError> {
        let constraints = self.registry.resolve_all(specs, key)?;
        Ok(reduce(&constraints, validator, key, dependencies))
    }
}

/// Pick the first case whose condition holds, else the default case.
fn select_case<'s>(
    cases: &'s [SwitchCase],
    reference: &str,
    scope: Scope<'_>,
) -> Option<(usize, &'s SwitchCase)> {
    let input = ConditionInput {
        raw_values: scope.local,
        ref_value: scope.lookup(reference),
    };
    cases
        .iter()
        .enumerate()
        .find(|(_, case)| {
            case.condition
                .as_ref()
                .map(|condition| condition.matches(&input))
                .unwrap_or(false)
        })
        .or_else(|| cases.iter().enumerate().find(|(_, case)| case.default))
}

/// Insert or replace, so each key has exactly one validator.
fn merge(shape: &mut Vec<(String, Validator)>, key: &str, validator: Validator) {
    match shape.iter_mut().find(|(k, _)| k == key) {
        Some(slot) => slot.1 = validator,
        None => shape.push((key.to_string(), validator)),
    }
}

/// Compile with the built-in constraint kinds.
///
/// # Errors
///
/// See [`Compiler::compile`].
pub fn compile(flow: Option<&Flow>, schema: &Schema, raw: &Value) -> Result<Compiled, CompileError> {
    Compiler::new(&ConstraintRegistry::default()).compile(flow, schema, raw)
}
