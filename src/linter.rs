//! Document linting - static analysis of form document files.
//!
//! Checks document files for:
//! - JSON syntax errors (`E001`)
//! - Structural errors against the document meta-schema (`E002`)
//! - Unknown constraint kinds (`E003`)
//! - Unknown entry types and formats, other parse errors (`E004`)
//! - Constraints that fail to compile (`E005`)
//! - Flow keys missing from the schema (`W001`)
//! - Conditional refs that name no schema field (`W002`)
//! - Keys listed more than once in a flow (`W003`)

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::compiler::Compiler;
use crate::document::{escape, parse_document};
use crate::error::CompileError;
use crate::loader::load_value;
use crate::registry::{reserved_kind, ConstraintRegistry};
use crate::types::{FieldType, Format, Schema};

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub file: PathBuf,
    /// JSON Pointer to the issue (e.g., "/schema/age/constraints/0")
    pub path: String,
    pub message: String,
}

/// Result of linting a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a linted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a directory or set of files.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub path: PathBuf,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if all files passed (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint a file or directory.
///
/// If path is a directory, recursively finds all .json files.
/// If `strict` is true, warnings are treated as errors.
/// Returns aggregated results for all files.
pub fn lint(path: &Path, strict: bool) -> LintResult {
    let files = collect_document_files(path);
    let mut results = Vec::new();
    let mut total_errors = 0;
    let mut total_warnings = 0;

    for file in &files {
        let file_result = lint_file(file, path);
        total_errors += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        total_warnings += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();
        results.push(file_result);
    }

    let failed = results
        .iter()
        .filter(|r| {
            if strict {
                r.status != FileStatus::Ok
            } else {
                r.status == FileStatus::Error
            }
        })
        .count();

    LintResult {
        path: path.to_path_buf(),
        files_checked: files.len(),
        passed: files.len() - failed,
        failed,
        errors: total_errors,
        warnings: total_warnings,
        results,
    }
}

/// Lint a single document file.
pub fn lint_file(file: &Path, base_path: &Path) -> FileResult {
    let mut checker = Checker::new(file);

    match load_value(file) {
        Ok(document) => checker.check_document(&document),
        Err(e) => checker.error("E001", "/", format!("syntax error: {}", e)),
    }

    let diagnostics = checker.diagnostics;
    let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
    let has_warnings = diagnostics.iter().any(|d| d.severity == Severity::Warning);

    let status = if has_errors {
        FileStatus::Error
    } else if has_warnings {
        FileStatus::Warning
    } else {
        FileStatus::Ok
    };

    FileResult {
        file: file.strip_prefix(base_path).unwrap_or(file).to_path_buf(),
        status,
        diagnostics,
    }
}

/// Structure every document must have.
fn meta_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["schema"],
        "properties": {
            "schema": { "$ref": "#/$defs/schema" },
            "flow": { "$ref": "#/$defs/flow" }
        },
        "$defs": {
            "schema": {
                "type": "object",
                "additionalProperties": { "$ref": "#/$defs/entry" }
            },
            "entry": {
                "type": "object",
                "required": ["type"],
                "properties": {
                    "type": { "type": "string" },
                    "format": { "type": "string" },
                    "array": { "type": "boolean" },
                    "isMulti": { "type": "boolean" },
                    "schema": { "$ref": "#/$defs/schema" },
                    "flow": { "$ref": "#/$defs/flow" },
                    "conditionalSchema": { "$ref": "#/$defs/conditional" },
                    "constraints": { "$ref": "#/$defs/constraints" },
                    "arrayConstraints": { "$ref": "#/$defs/constraints" },
                    "typeError": { "type": "string" }
                }
            },
            "flow": {
                "type": "array",
                "items": {
                    "oneOf": [
                        { "type": "string" },
                        {
                            "type": "object",
                            "required": ["flow"],
                            "properties": {
                                "label": { "type": "string" },
                                "flow": { "$ref": "#/$defs/flow" },
                                "collapsed": { "type": "boolean" }
                            }
                        }
                    ]
                }
            },
            "conditional": {
                "type": "object",
                "required": ["ref", "switch"],
                "properties": {
                    "ref": { "type": "string" },
                    "switch": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "schema": { "$ref": "#/$defs/schema" },
                                "flow": { "$ref": "#/$defs/flow" },
                                "default": { "type": "boolean" }
                            }
                        }
                    }
                }
            },
            "constraints": {
                "type": "array",
                "items": {
                    "anyOf": [
                        { "type": "string" },
                        {
                            "type": "object",
                            "required": ["type"],
                            "properties": { "type": { "type": "string" } }
                        }
                    ]
                }
            }
        }
    })
}

struct Checker<'a> {
    file: &'a Path,
    registry: ConstraintRegistry,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Checker<'a> {
    fn new(file: &'a Path) -> Self {
        Self {
            file,
            registry: ConstraintRegistry::default(),
            diagnostics: Vec::new(),
        }
    }

    fn push(&mut self, severity: Severity, code: &str, path: &str, message: String) {
        self.diagnostics.push(Diagnostic {
            severity,
            code: code.to_string(),
            file: self.file.to_path_buf(),
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            message,
        });
    }

    fn error(&mut self, code: &str, path: &str, message: String) {
        self.push(Severity::Error, code, path, message);
    }

    fn warning(&mut self, code: &str, path: &str, message: String) {
        self.push(Severity::Warning, code, path, message);
    }

    fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    fn check_document(&mut self, document: &Value) {
        self.check_structure(document);
        // The remaining checks assume a well-formed document
        if self.has_errors() {
            return;
        }

        let Some(schema) = document.get("schema").and_then(Value::as_object) else {
            return;
        };
        self.check_schema(schema, schema, document.get("flow"), "/schema", "/flow");

        if !self.has_errors() {
            self.check_compiles(document);
        }
    }

    fn check_structure(&mut self, document: &Value) {
        let meta = meta_schema();
        let validator = match jsonschema::validator_for(&meta) {
            Ok(v) => v,
            Err(e) => {
                self.error("E002", "/", format!("meta-schema unavailable: {}", e));
                return;
            }
        };
        let errors: Vec<(String, String)> = validator
            .iter_errors(document)
            .map(|e| (e.instance_path.to_string(), e.to_string()))
            .collect();
        for (path, message) in errors {
            self.error("E002", &path, message);
        }
    }

    fn check_schema(
        &mut self,
        root: &Map<String, Value>,
        schema: &Map<String, Value>,
        flow: Option<&Value>,
        path: &str,
        flow_path: &str,
    ) {
        for (key, entry) in schema {
            let entry_path = format!("{}/{}", path, escape(key));
            if let Some(entry) = entry.as_object() {
                self.check_entry(root, schema, entry, &entry_path);
            }
        }
        if let Some(flow) = flow {
            let mut seen = HashSet::new();
            self.check_flow(schema, flow, flow_path, &mut seen);
        }
    }

    fn check_entry(
        &mut self,
        root: &Map<String, Value>,
        siblings: &Map<String, Value>,
        entry: &Map<String, Value>,
        path: &str,
    ) {
        if let Some(name) = entry.get("type").and_then(Value::as_str) {
            if FieldType::parse(name).is_none() {
                self.error(
                    "E004",
                    &format!("{}/type", path),
                    format!(
                        "unknown type \"{}\": expected string, number, bool, date, object, file, or json",
                        name
                    ),
                );
            }
        }
        if let Some(name) = entry.get("format").and_then(Value::as_str) {
            if Format::parse(name).is_none() {
                self.error(
                    "E004",
                    &format!("{}/format", path),
                    format!("unknown format \"{}\"", name),
                );
            }
        }

        for list in ["constraints", "arrayConstraints"] {
            if let Some(items) = entry.get(list).and_then(Value::as_array) {
                self.check_constraints(items, &format!("{}/{}", path, list));
            }
        }

        if let Some(nested) = entry.get("schema").and_then(Value::as_object) {
            self.check_schema(
                root,
                nested,
                entry.get("flow"),
                &format!("{}/schema", path),
                &format!("{}/flow", path),
            );
        }

        if let Some(conditional) = entry.get("conditionalSchema") {
            let conditional_path = format!("{}/conditionalSchema", path);
            if let Some(reference) = conditional.get("ref").and_then(Value::as_str) {
                let head = reference.split('.').next().unwrap_or(reference);
                if !siblings.contains_key(head) && !root.contains_key(head) {
                    self.warning(
                        "W002",
                        &format!("{}/ref", conditional_path),
                        format!("conditional ref \"{}\" does not name a schema field", reference),
                    );
                }
            }
            let cases = conditional.get("switch").and_then(Value::as_array);
            for (i, case) in cases.into_iter().flatten().enumerate() {
                let case_path = format!("{}/switch/{}", conditional_path, i);
                if let Some(schema) = case.get("schema").and_then(Value::as_object) {
                    self.check_schema(
                        root,
                        schema,
                        case.get("flow"),
                        &format!("{}/schema", case_path),
                        &format!("{}/flow", case_path),
                    );
                }
            }
        }
    }

    fn check_constraints(&mut self, items: &[Value], path: &str) {
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{}/{}", path, i);
            let kind = match item {
                Value::String(kind) => Some(kind.as_str()),
                Value::Object(map) => map.get("type").and_then(Value::as_str),
                _ => None,
            };
            if let Some(kind) = kind {
                if !self.registry.contains(kind) && reserved_kind(kind).is_none() {
                    self.error(
                        "E003",
                        &item_path,
                        format!("unknown constraint kind \"{}\"", kind),
                    );
                }
            }
            // `when` carries nested constraint lists
            for branch in ["then", "otherwise"] {
                if let Some(nested) = item.get(branch).and_then(Value::as_array) {
                    self.check_constraints(nested, &format!("{}/{}", item_path, branch));
                }
            }
        }
    }

    fn check_flow(
        &mut self,
        schema: &Map<String, Value>,
        flow: &Value,
        path: &str,
        seen: &mut HashSet<String>,
    ) {
        let Some(items) = flow.as_array() else {
            return;
        };
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{}/{}", path, i);
            match item {
                Value::String(key) => {
                    if !schema.contains_key(key) {
                        self.warning(
                            "W001",
                            &item_path,
                            format!("flow references \"{}\" which is not in the schema", key),
                        );
                    }
                    if !seen.insert(key.clone()) {
                        self.warning(
                            "W003",
                            &item_path,
                            format!("\"{}\" appears more than once in the flow", key),
                        );
                    }
                }
                Value::Object(group) => {
                    if let Some(inner) = group.get("flow") {
                        self.check_flow(schema, inner, &format!("{}/flow", item_path), seen);
                    }
                }
                _ => {}
            }
        }
    }

    /// Parse and compile the document, every conditional branch included.
    fn check_compiles(&mut self, document: &Value) {
        let parsed = match parse_document(document) {
            Ok(parsed) => parsed,
            Err(CompileError::InvalidSchema { path, message }) => {
                self.error("E004", &path, message);
                return;
            }
            Err(e) => {
                self.error("E004", "/", e.to_string());
                return;
            }
        };
        let mut failures = Vec::new();
        let compiler = Compiler::new(&self.registry);
        match compiler.compile(parsed.flow.as_ref(), &parsed.schema, &Value::Null) {
            Ok(_) => collect_branch_failures(&compiler, &parsed.schema, "/schema", &mut failures),
            Err(e) => failures.push(("/schema".to_string(), e.to_string())),
        }
        for (path, message) in failures {
            self.error("E005", &path, message);
        }
    }
}

/// Compile every conditional branch below `schema`. Compiling the whole
/// document only reaches the branch its (empty) data selects.
fn collect_branch_failures(
    compiler: &Compiler<'_>,
    schema: &Schema,
    path: &str,
    failures: &mut Vec<(String, String)>,
) {
    for (key, entry) in schema.iter() {
        let entry_path = format!("{}/{}", path, escape(key));
        if let Some(nested) = &entry.schema {
            collect_branch_failures(compiler, nested, &format!("{}/schema", entry_path), failures);
        }
        let Some(conditional) = &entry.conditional_schema else {
            continue;
        };
        for (i, case) in conditional.cases.iter().enumerate() {
            let case_path = format!("{}/conditionalSchema/switch/{}/schema", entry_path, i);
            match compiler.compile(case.flow.as_ref(), &case.schema, &Value::Null) {
                Ok(_) => collect_branch_failures(compiler, &case.schema, &case_path, failures),
                Err(e) => failures.push((case_path, e.to_string())),
            }
        }
    }
}

/// Collect all .json files in a path (file or directory).
fn collect_document_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            return vec![path.to_path_buf()];
        }
        return vec![];
    }

    let mut files = Vec::new();
    collect_files_recursive(path, &mut files);
    files.sort();
    files
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, files);
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
}
