//! Integration tests for compiling schemas and validating form data.

use form_schema::{
    compile, load_document_str, reference, validate, validate_document, validate_with, Condition,
    ConditionalSchema, ConstraintSpec, ErrorKind, FieldType, Flow, FormDocument, Schema,
    SchemaEntry, SwitchCase, ValidateError, ValidateOptions, ARRAY_TYPE_MESSAGE,
    BOOL_TYPE_MESSAGE, DATE_TYPE_MESSAGE, NUMBER_TYPE_MESSAGE, OBJECT_TYPE_MESSAGE,
    STRING_TYPE_MESSAGE,
};
use serde_json::{json, Value};

fn d(kind: &str, params: Value) -> ConstraintSpec {
    ConstraintSpec::descriptor(kind, params)
}

fn document(value: Value) -> FormDocument {
    load_document_str(&value.to_string()).unwrap()
}

/// Messages of a failed validation, in order.
fn messages(result: Result<Value, ValidateError>) -> Vec<String> {
    result
        .unwrap_err()
        .field_errors()
        .iter()
        .map(|e| e.message.clone())
        .collect()
}

mod primitives {
    use super::*;

    fn single(field_type: FieldType) -> Schema {
        Schema::new().field("f", SchemaEntry::new(field_type))
    }

    #[test]
    fn accepts_native_and_coercible_values() {
        let cases = [
            (FieldType::String, json!("text"), json!("text")),
            (FieldType::String, json!(7), json!("7")),
            (FieldType::Number, json!(7), json!(7)),
            (FieldType::Number, json!("7.5"), json!(7.5)),
            (FieldType::Number, json!(""), Value::Null),
            (FieldType::Bool, json!(false), json!(false)),
            (FieldType::Date, json!("2024-02-29"), json!("2024-02-29")),
            (FieldType::Object, json!({"k": 1}), json!({"k": 1})),
        ];
        for (field_type, input, expected) in cases {
            let out = validate(None, &single(field_type), &json!({ "f": input })).unwrap();
            assert_eq!(out["f"], expected, "{:?}", field_type);
        }
    }

    #[test]
    fn rejects_other_values_with_default_message() {
        let cases = [
            (FieldType::String, json!([1]), STRING_TYPE_MESSAGE),
            (FieldType::Number, json!("seven"), NUMBER_TYPE_MESSAGE),
            (FieldType::Bool, json!("yes"), BOOL_TYPE_MESSAGE),
            (FieldType::Date, json!("someday"), DATE_TYPE_MESSAGE),
            (FieldType::Object, json!("flat"), OBJECT_TYPE_MESSAGE),
        ];
        for (field_type, input, message) in cases {
            let err = validate(None, &single(field_type), &json!({ "f": input })).unwrap_err();
            let errors = err.field_errors();
            assert_eq!(errors.len(), 1, "{:?}", field_type);
            assert_eq!(errors[0].path, "f");
            assert_eq!(errors[0].message, message);
            assert_eq!(errors[0].kind, ErrorKind::TypeMismatch);
        }
    }

    #[test]
    fn overridden_type_message() {
        let schema = Schema::new().field(
            "age",
            SchemaEntry::new(FieldType::Number).type_error("Age must be a number"),
        );
        assert_eq!(
            messages(validate(None, &schema, &json!({"age": "old"}))),
            vec!["Age must be a number"]
        );
    }

    #[test]
    fn every_primitive_is_optional() {
        for field_type in [
            FieldType::String,
            FieldType::Number,
            FieldType::Bool,
            FieldType::Date,
            FieldType::Object,
            FieldType::File,
            FieldType::Json,
        ] {
            assert!(validate(None, &single(field_type), &json!({})).is_ok());
            assert!(validate(None, &single(field_type), &json!({"f": null})).is_ok());
        }
    }
}

mod constraints {
    use super::*;

    /// Validate `value` under key `f` for an entry of `field_type` carrying
    /// `constraint` with message "custom".
    fn run(field_type: &str, constraint: Value, value: Value) -> Result<Value, ValidateError> {
        let doc = document(json!({
            "schema": { "f": { "type": field_type, "constraints": [constraint] } }
        }));
        validate_document(&doc, &json!({ "f": value }), &ValidateOptions::new())
    }

    #[test]
    fn right_and_wrong_literals() {
        let cases = [
            ("string", json!({"type": "required"}), json!("x"), json!("")),
            ("string", json!({"type": "url"}), json!("https://example.com/a"), json!("example")),
            ("string", json!({"type": "email"}), json!("ada@example.com"), json!("ada@")),
            (
                "string",
                json!({"type": "uuid"}),
                json!("67e55044-10b1-426f-9247-bb680e5fe0c8"),
                json!("67e55044"),
            ),
            (
                "string",
                json!({"type": "matches", "regexp": "^[A-Z]{3}$"}),
                json!("EUR"),
                json!("euro"),
            ),
            ("number", json!({"type": "min", "ref": 3}), json!(3), json!(2)),
            ("number", json!({"type": "max", "ref": 3}), json!(3), json!(4)),
            ("string", json!({"type": "min", "ref": 3}), json!("abc"), json!("ab")),
            ("date", json!({"type": "max", "ref": "2024-12-31"}), json!("2024-06-01"), json!("2025-01-01")),
            ("number", json!({"type": "positive"}), json!(1), json!(-1)),
            ("number", json!({"type": "negative"}), json!(-1), json!(0)),
            ("number", json!({"type": "integer"}), json!(4), json!(4.5)),
            ("number", json!({"type": "lessThan", "ref": 10}), json!(9), json!(10)),
            ("number", json!({"type": "moreThan", "ref": 10}), json!(11), json!(10)),
            ("string", json!({"type": "length", "ref": 2}), json!("FR"), json!("FRA")),
            (
                "file",
                json!({"type": "supportedFormat", "arrayOfValues": ["image/png"]}),
                json!({"type": "image/png", "size": 10}),
                json!({"type": "application/pdf", "size": 10}),
            ),
            (
                "file",
                json!({"type": "unsupportedFormat", "arrayOfValues": ["application/x-msdownload"]}),
                json!({"type": "image/png"}),
                json!([{"type": "image/png"}, {"type": "application/x-msdownload"}]),
            ),
            (
                "file",
                json!({"type": "maxSize", "ref": 1024}),
                json!({"type": "image/png", "size": 1024}),
                json!({"type": "image/png", "size": 4096}),
            ),
            (
                "string",
                json!({"type": "oneOf", "arrayOfValues": ["red", "green"]}),
                json!("red"),
                json!("blue"),
            ),
            (
                "string",
                json!({"type": "blacklist", "arrayOfValues": ["admin"]}),
                json!("ada"),
                json!("admin"),
            ),
        ];

        for (field_type, mut constraint, right, wrong) in cases {
            constraint["message"] = json!("custom");
            let kind = constraint["type"].clone();
            assert!(
                run(field_type, constraint.clone(), right).is_ok(),
                "{} should accept",
                kind
            );
            let err = run(field_type, constraint, wrong).unwrap_err();
            let errors = err.field_errors();
            assert_eq!(errors.len(), 1, "{} should reject once", kind);
            assert_eq!(errors[0].message, "custom");
            assert_eq!(errors[0].kind, ErrorKind::ConstraintViolation);
        }
    }

    #[test]
    fn constraints_apply_in_order() {
        let doc = document(json!({
            "schema": {
                "code": {
                    "type": "string",
                    "constraints": [
                        {"type": "required", "message": "missing"},
                        {"type": "length", "ref": 3, "message": "three"}
                    ]
                }
            }
        }));
        let out = validate_document(&doc, &json!({"code": "ab"}), &ValidateOptions::new());
        assert_eq!(messages(out), vec!["three"]);

        let out = validate_document(&doc, &json!({"code": ""}), &ValidateOptions::new());
        assert_eq!(messages(out), vec!["missing", "three"]);
    }

    #[test]
    fn when_switches_on_sibling_value() {
        let doc = document(json!({
            "schema": {
                "company": {"type": "bool"},
                "vat": {
                    "type": "string",
                    "constraints": [{
                        "type": "when",
                        "ref": "company",
                        "test": true,
                        "then": [{"type": "required", "message": "VAT number required"}]
                    }]
                }
            }
        }));
        let options = ValidateOptions::new();
        assert!(validate_document(&doc, &json!({"company": false}), &options).is_ok());
        assert!(validate_document(&doc, &json!({"company": true, "vat": "FR1"}), &options).is_ok());
        assert_eq!(
            messages(validate_document(&doc, &json!({"company": true}), &options)),
            vec!["VAT number required"]
        );
    }

    #[test]
    fn custom_test_constraint() {
        let schema = Schema::new().field(
            "password",
            SchemaEntry::new(FieldType::String).constraint(ConstraintSpec::test(
                "digit",
                "needs a digit",
                |v, _| v.as_str().map(|s| s.chars().any(|c| c.is_ascii_digit())).unwrap_or(true),
            )),
        );
        assert!(validate(None, &schema, &json!({"password": "s3cret"})).is_ok());
        assert_eq!(
            messages(validate(None, &schema, &json!({"password": "secret"}))),
            vec!["needs a digit"]
        );
    }

    #[test]
    fn custom_applier_function() {
        let schema = Schema::new().field(
            "nickname",
            SchemaEntry::new(FieldType::String).constraint(ConstraintSpec::custom(
                |v: form_schema::Validator, _: &str, _: &mut form_schema::Dependencies| {
                    v.type_error("nickname must be text")
                },
            )),
        );
        assert_eq!(
            messages(validate(None, &schema, &json!({"nickname": {"a": 1}}))),
            vec!["nickname must be text"]
        );
    }
}

#[test]
fn compiling_twice_validates_identically() {
    let doc = document(json!({
        "schema": {
            "start": {"type": "date"},
            "end": {"type": "date", "constraints": [{"type": "min", "ref": {"type": "ref", "ref": "start"}}]},
            "tags": {"type": "string", "array": true, "arrayConstraints": [{"type": "max", "ref": 1}]}
        }
    }));
    let data = json!({
        "start": "2024-05-02",
        "end": "2024-05-01",
        "tags": [{"value": "a"}, {"value": "b"}]
    });
    let options = ValidateOptions::new();

    let first = compile(doc.flow.as_ref(), &doc.schema, &data).unwrap();
    let second = compile(doc.flow.as_ref(), &doc.schema, &data).unwrap();
    assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());
    assert_eq!(first.dependencies, second.dependencies);

    let a = first.validate(&data, &options).unwrap_err();
    let b = second.validate(&data, &options).unwrap_err();
    assert_eq!(a.field_errors(), b.field_errors());
    assert_eq!(a.field_errors().len(), 2);
}

mod arrays {
    use super::*;

    fn tags() -> FormDocument {
        document(json!({
            "schema": {
                "tags": {
                    "type": "string",
                    "array": true,
                    "constraints": [{"type": "required", "message": "empty tag"}],
                    "arrayConstraints": [{"type": "min", "ref": 3, "message": "at least three tags"}]
                }
            }
        }))
    }

    #[test]
    fn array_constraint_fails_alone() {
        let out = validate_document(
            &tags(),
            &json!({"tags": [{"value": "a"}, {"value": "b"}]}),
            &ValidateOptions::new(),
        );
        let err = out.unwrap_err();
        assert_eq!(err.field_errors().len(), 1);
        assert_eq!(err.field_errors()[0].path, "tags");
        assert_eq!(err.field_errors()[0].message, "at least three tags");
    }

    #[test]
    fn elements_validate_independently() {
        let out = validate_document(
            &tags(),
            &json!({"tags": [{"value": "a"}, {"value": ""}, {"value": "c"}, {"value": ""}]}),
            &ValidateOptions::new(),
        );
        let err = out.unwrap_err();
        let paths: Vec<&str> = err.field_errors().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["tags[1].value", "tags[3].value"]);
    }

    #[test]
    fn bare_elements_are_rejected() {
        let out = validate_document(&tags(), &json!({"tags": ["a"]}), &ValidateOptions::new());
        let err = out.unwrap_err();
        let element = err
            .field_errors()
            .iter()
            .find(|e| e.path == "tags[0]")
            .unwrap();
        assert_eq!(element.message, OBJECT_TYPE_MESSAGE);
        assert_eq!(element.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn non_array_is_type_mismatch() {
        let out = validate_document(&tags(), &json!({"tags": "a"}), &ValidateOptions::new());
        assert_eq!(messages(out), vec![ARRAY_TYPE_MESSAGE]);
    }

    #[test]
    fn nested_element_paths() {
        let doc = document(json!({
            "schema": {
                "users": {
                    "type": "object",
                    "array": true,
                    "schema": {
                        "name": {"type": "string", "constraints": ["required"]},
                        "age": {"type": "number"}
                    }
                }
            }
        }));
        let data = json!({"users": [{"value": {"name": "", "age": "12"}}]});
        let err = validate_document(&doc, &data, &ValidateOptions::new()).unwrap_err();
        assert_eq!(err.field_errors().len(), 1);
        assert_eq!(err.field_errors()[0].path, "users[0].value.name");
    }

    #[test]
    fn is_multi_uses_the_same_carrier() {
        let doc = document(json!({
            "schema": {
                "colours": {
                    "type": "string",
                    "format": "select",
                    "isMulti": true,
                    "constraints": [{"type": "oneOf", "arrayOfValues": ["red", "blue"]}]
                }
            }
        }));
        let options = ValidateOptions::new();
        let out = validate_document(&doc, &json!({"colours": [{"value": "red"}]}), &options);
        assert!(out.is_ok());
        let err = validate_document(&doc, &json!({"colours": [{"value": "pink"}]}), &options)
            .unwrap_err();
        assert_eq!(err.field_errors()[0].path, "colours[0].value");
    }
}

mod conditional {
    use super::*;

    fn schema() -> Schema {
        let sa = Schema::new().field(
            "only_a",
            SchemaEntry::new(FieldType::String).constraint(d("required", json!({"message": "a needed"}))),
        );
        let sb = Schema::new().field(
            "only_b",
            SchemaEntry::new(FieldType::String).constraint(d("required", json!({"message": "b needed"}))),
        );
        Schema::new()
            .field("kind", SchemaEntry::new(FieldType::String))
            .field(
                "details",
                SchemaEntry::new(FieldType::Object).conditional(ConditionalSchema::new(
                    "kind",
                    vec![
                        SwitchCase::when(
                            Condition::Literal(json!("a")),
                            sa,
                            Some(Flow::from_keys(["only_a"])),
                        ),
                        SwitchCase::fallback(sb, Some(Flow::from_keys(["only_b"]))),
                    ],
                )),
            )
    }

    #[test]
    fn matching_branch_validates_its_fields_only() {
        let data = json!({"kind": "a", "details": {}});
        assert_eq!(messages(validate(None, &schema(), &data)), vec!["a needed"]);

        let data = json!({"kind": "a", "details": {"only_a": "x"}});
        assert!(validate(None, &schema(), &data).is_ok());
    }

    #[test]
    fn falls_back_to_default_branch() {
        let data = json!({"kind": "z", "details": {"only_a": "x"}});
        let err = validate(None, &schema(), &data).unwrap_err();
        assert_eq!(err.field_errors()[0].path, "details.only_b");
        assert_eq!(err.field_errors()[0].message, "b needed");
    }

    #[test]
    fn predicate_condition() {
        let schema = Schema::new()
            .field("age", SchemaEntry::new(FieldType::Number))
            .field(
                "guardian",
                SchemaEntry::new(FieldType::Object).conditional(ConditionalSchema::new(
                    "age",
                    vec![SwitchCase::when(
                        Condition::predicate(|input| {
                            input.ref_value.as_f64().map(|age| age < 18.0).unwrap_or(false)
                        }),
                        Schema::new().field(
                            "name",
                            SchemaEntry::new(FieldType::String).constraint(d("required", json!({}))),
                        ),
                        None,
                    )],
                )),
            );
        assert!(validate(None, &schema, &json!({"age": 30, "guardian": {}})).is_ok());
        assert!(validate(None, &schema, &json!({"age": 12, "guardian": {}})).is_err());
        assert!(validate(None, &schema, &json!({"age": 12, "guardian": {"name": "Bo"}})).is_ok());
    }

    #[test]
    fn document_literal_conditions() {
        let doc = document(json!({
            "schema": {
                "contact": {"type": "string"},
                "details": {
                    "type": "object",
                    "conditionalSchema": {
                        "ref": "contact",
                        "switch": [
                            {"condition": "email", "schema": {"address": {"type": "string", "constraints": ["email"]}}},
                            {"condition": "phone", "schema": {"number": {"type": "string", "constraints": [{"type": "matches", "regexp": "^[0-9 +]+$"}]}}}
                        ]
                    }
                }
            }
        }));
        let options = ValidateOptions::new();
        let ok = json!({"contact": "phone", "details": {"number": "+33 1 23"}});
        assert!(validate_document(&doc, &ok, &options).is_ok());
        let bad = json!({"contact": "email", "details": {"address": "nope"}});
        assert!(validate_document(&doc, &bad, &options).is_err());
        // no branch matches and there is no default: anything goes
        let none = json!({"contact": "fax", "details": {"address": "nope"}});
        assert!(validate_document(&doc, &none, &options).is_ok());
    }
}

#[test]
fn empty_nested_schema_is_permissive() {
    let doc = document(json!({
        "schema": {"meta": {"type": "object", "schema": {}}}
    }));
    let options = ValidateOptions::new();
    for data in [json!({"meta": {}}), json!({"meta": null}), json!({})] {
        assert!(validate_document(&doc, &data, &options).is_ok(), "{}", data);
    }
}

#[test]
fn null_form_is_a_type_mismatch() {
    let schema = Schema::new().field(
        "name",
        SchemaEntry::new(FieldType::String)
            .constraint(d("required", json!({"message": "Name is required"}))),
    );

    assert_eq!(
        messages(validate(None, &schema, &json!({}))),
        vec!["Name is required"]
    );

    let err = validate(None, &schema, &Value::Null).unwrap_err();
    let errors = err.field_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "");
    assert_eq!(errors[0].message, OBJECT_TYPE_MESSAGE);
    assert_eq!(errors[0].kind, ErrorKind::TypeMismatch);
}

#[test]
fn references_resolve_among_siblings() {
    let range = Schema::new()
        .field("start", SchemaEntry::new(FieldType::Number))
        .field(
            "end",
            SchemaEntry::new(FieldType::Number)
                .constraint(d("moreThan", json!({"ref": reference("start")}))),
        );
    let schema = Schema::new()
        .field("start", SchemaEntry::new(FieldType::Number))
        .field("range", SchemaEntry::new(FieldType::Object).nested(range, None));

    let err = validate(None, &schema, &json!({"range": {"start": 10, "end": 1}})).unwrap_err();
    assert_eq!(err.field_errors()[0].path, "range.end");

    // the top-level "start" is not a sibling of "range.end"
    assert!(validate(None, &schema, &json!({"start": 10, "range": {"end": 1}})).is_ok());
}

#[test]
fn boolean_scenario() {
    let schema = Schema::new().field("test", SchemaEntry::new(FieldType::Bool));
    let flow = Flow::from_keys(["test"]);

    let out = validate(Some(&flow), &schema, &json!({"test": true})).unwrap();
    assert_eq!(out, json!({"test": true}));

    let err = validate(Some(&flow), &schema, &json!({"test": "fifou"})).unwrap_err();
    let errors = err.field_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "test");
    assert_eq!(errors[0].message, BOOL_TYPE_MESSAGE);
    assert_eq!(errors[0].kind, ErrorKind::TypeMismatch);
}

#[test]
fn cross_field_scenario() {
    let schema = Schema::new()
        .field(
            "test",
            SchemaEntry::new(FieldType::Number).constraint(d(
                "moreThan",
                json!({"ref": reference("value"), "message": "test must exceed value"}),
            )),
        )
        .field("value", SchemaEntry::new(FieldType::Number));

    assert!(validate(None, &schema, &json!({"test": 42, "value": 40})).is_ok());

    let err = validate(None, &schema, &json!({"test": 38, "value": 40})).unwrap_err();
    let errors = err.field_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "test");
    assert_eq!(errors[0].message, "test must exceed value");

    let compiled = compile(None, &schema, &json!({})).unwrap();
    assert!(compiled.dependencies.contains("test", "value"));
    assert_eq!(
        serde_json::to_value(&compiled.dependencies).unwrap(),
        json!([["test", "value"]])
    );
}

#[test]
fn missing_reference_resolves_to_null() {
    let schema = Schema::new().field(
        "n",
        SchemaEntry::new(FieldType::Number).constraint(d("lessThan", json!({"ref": reference("ghost")}))),
    );
    assert!(validate(None, &schema, &json!({"n": 5})).is_ok());
}

#[test]
fn options_are_honoured() {
    let doc = document(json!({
        "schema": {
            "a": {"type": "string", "constraints": ["required"]},
            "b": {"type": "string", "constraints": ["required"]}
        }
    }));
    let data = json!({"extra": 1});

    let all = validate_document(&doc, &data, &ValidateOptions::new()).unwrap_err();
    assert_eq!(all.field_errors().len(), 2);

    let first = validate_with(
        doc.flow.as_ref(),
        &doc.schema,
        &data,
        &ValidateOptions::new().abort_early(true),
    )
    .unwrap_err();
    assert_eq!(first.field_errors().len(), 1);

    let stripped = validate_document(
        &doc,
        &json!({"a": "x", "b": "y", "extra": 1}),
        &ValidateOptions::new().strip_unknown(true),
    )
    .unwrap();
    assert_eq!(stripped, json!({"a": "x", "b": "y"}));
}
