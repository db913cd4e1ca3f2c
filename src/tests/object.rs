use serde_json::{json, Value as Json};

use crate::{evaluation_order, Engine};

fn evaluate(schema: Json, mut document: Json) -> Json {
    Engine::new().evaluate_object(&schema, &mut document);
    document
}

fn field(name: &str, kind: &str, formula: &str) -> Json {
    json!({
        "type": "object",
        "properties": { name: { "type": kind, "$$formula": formula } },
    })
}

#[test]
fn computes_fields() {
    assert_eq!(evaluate(field("foo", "number", "POW(input, 2)"), json!({ "foo": 3 })), json!({ "foo": 9 }));
    assert_eq!(evaluate(field("$foo", "number", "POW(input, 2)"), json!({ "$foo": 3 })), json!({ "$foo": 9 }));
    assert_eq!(evaluate(field("$$foo", "number", "POW(input, 2)"), json!({ "$$foo": 3 })), json!({ "$$foo": 9 }));
    assert_eq!(evaluate(field("foo", "number", "MAX(input, 2)"), json!({ "foo": 0 })), json!({ "foo": 2 }));
}

#[test]
fn missing_targets_stay_missing() {
    assert_eq!(evaluate(field("foo", "number", "POW(input, 2)"), json!({ "bar": 3 })), json!({ "bar": 3 }));
}

#[test]
fn nested_fields() {
    let schema = json!({
        "type": "object",
        "properties": {
            "foo": {
                "type": "object",
                "properties": {
                    "bar": {
                        "type": "object",
                        "properties": {
                            "baz": { "type": "number", "$$formula": "POW(input, 2)" },
                        },
                    },
                },
            },
        },
    });
    assert_eq!(
        evaluate(schema, json!({ "foo": { "bar": { "baz": 2 } } })),
        json!({ "foo": { "bar": { "baz": 4 } } })
    );

    let schema = json!({
        "type": "object",
        "properties": {
            "data": {
                "type": "object",
                "properties": {
                    "count": { "type": "number", "$$formula": "SIZE(contract.data.items)" },
                    "items": { "type": "array" },
                },
            },
        },
    });
    assert_eq!(
        evaluate(schema, json!({ "data": { "items": [1, 2] } })),
        json!({ "data": { "items": [1, 2], "count": 2 } })
    );
}

#[test]
fn schemas_without_formulas() {
    let schema = json!({ "type": "object", "properties": { "foo": { "type": "number" } } });
    assert_eq!(evaluate(schema, json!({ "foo": 3 })), json!({ "foo": 3 }));
}

#[test]
fn empty_documents_are_untouched() {
    assert_eq!(evaluate(field("foo", "string", "\"x\""), json!({})), json!({}));
    assert_eq!(evaluate(field("foo", "string", "\"x\""), json!(null)), json!(null));
}

#[test]
fn array_fields_default_to_empty() {
    let schema = field("tags", "array", "input === null ? \"null\" : SIZE(input)");
    assert_eq!(evaluate(schema.clone(), json!({ "x": 1 })), json!({ "x": 1, "tags": 0 }));
    assert_eq!(evaluate(schema, json!({ "tags": null })), json!({ "tags": "null" }));

    let schema = json!({
        "type": "object",
        "properties": { "tags": { "type": ["array", "null"], "$$formula": "input" } },
    });
    assert_eq!(evaluate(schema, json!({ "x": 1 })), json!({ "x": 1, "tags": [] }));
}

#[test]
fn combinators_are_not_part_of_paths() {
    let schema = json!({
        "type": "object",
        "anyOf": [
            { "properties": { "foo": { "type": "number", "$$formula": "1 + 1" } } },
        ],
    });
    assert_eq!(evaluate(schema, json!({ "x": true })), json!({ "x": true, "foo": 2 }));
}

#[test]
fn bad_formulas_are_skipped() {
    let schema = json!({
        "type": "object",
        "properties": {
            "broken": { "type": "number", "$$formula": "1 +" },
            "missing": { "type": "array", "$$formula": "AGGREGATE(input)" },
            "fine": { "type": "number", "$$formula": "ADD(1, 1)" },
        },
    });
    assert_eq!(evaluate(schema, json!({ "x": 1 })), json!({ "x": 1, "fine": 2 }));
}

#[test]
fn last_message_field() {
    let schema = json!({
        "type": "object",
        "properties": {
            "last_message": {
                "type": "object",
                "$$formula": "LAST(ORDER_BY(FILTER(contract.links[\"has attached element\"], { type: \"message@1.0.0\" }), \"data.timestamp\"))",
            },
        },
    });
    let document = json!({
        "links": {
            "has attached element": [
                { "type": "message@1.0.0", "data": { "timestamp": "2020-01-01T00:00:02.000Z" } },
                { "type": "message@1.0.0", "data": { "timestamp": "2020-01-01T00:00:01.000Z" } },
            ]
        }
    });
    let result = evaluate(schema.clone(), document);
    assert_eq!(
        result["last_message"],
        json!({ "type": "message@1.0.0", "data": { "timestamp": "2020-01-01T00:00:02.000Z" } })
    );

    let result = evaluate(schema, json!({ "links": { "has attached element": [] } }));
    assert!(result.get("last_message").is_none());
}

#[test]
fn dependencies_run_first() {
    // `lucky` reads `number`, which is declared after it.
    let schema = json!({
        "type": "object",
        "properties": {
            "lucky": { "type": "boolean", "$$formula": "contract.number === 13" },
            "number": { "type": "number", "$$formula": "SUM(contract.input, 10)" },
            "input": { "type": "number" },
        },
    });
    assert_eq!(
        evaluate(schema, json!({ "input": 3 })),
        json!({ "input": 3, "number": 13, "lucky": true })
    );
}

#[test]
fn nested_dependencies() {
    let schema = json!({
        "type": "object",
        "properties": {
            "data": {
                "type": "object",
                "properties": {
                    "total": { "type": "number", "$$formula": "contract.data.sub.double + 1" },
                    "sub": {
                        "type": "object",
                        "properties": {
                            "double": { "type": "number", "$$formula": "contract.data.base * 2" },
                        },
                    },
                    "base": { "type": "number" },
                },
            },
        },
    });
    let result = evaluate(schema, json!({ "data": { "base": 5 } }));
    assert_eq!(result["data"]["sub"]["double"], json!(10));
    assert_eq!(result["data"]["total"], json!(11));
}

fn path(p: &str) -> Vec<String> {
    p.split('.').map(str::to_string).collect()
}

#[test]
fn order_is_stable() {
    let outputs = [path("a"), path("b"), path("c")];
    let outputs: Vec<&[String]> = outputs.iter().map(Vec::as_slice).collect();

    assert_eq!(evaluation_order(&outputs, &[vec![], vec![], vec![]]), vec![0, 1, 2]);
    // a reads c
    assert_eq!(evaluation_order(&outputs, &[vec![path("c")], vec![], vec![]]), vec![1, 2, 0]);
    // reading `x` waits for whatever writes `x`
    let nested = [path("x.y"), path("x")];
    let nested: Vec<&[String]> = nested.iter().map(Vec::as_slice).collect();
    assert_eq!(evaluation_order(&nested, &[vec![path("x")], vec![]]), vec![1, 0]);
}

#[test]
fn cycles_fall_back_to_declaration_order() {
    let outputs = [path("a"), path("b")];
    let outputs: Vec<&[String]> = outputs.iter().map(Vec::as_slice).collect();
    let reads = [vec![path("b")], vec![path("a")]];
    assert_eq!(evaluation_order(&outputs, &reads), vec![0, 1]);
}

#[test]
fn array_indices_only_append() {
    let schema = json!({
        "type": "object",
        "properties": {
            "list": {
                "type": "array",
                "properties": {
                    "2": { "type": "number", "$$formula": "40 + 2" },
                    "4000000000": { "type": "number", "$$formula": "1" },
                },
            },
        },
    });
    assert_eq!(evaluate(schema, json!({ "list": [7, 8] })), json!({ "list": [7, 8, 42] }));

    let mut document = json!({ "list": [] });
    assert!(!crate::document::set(&mut document, &["list", "1"], json!(1)));
    assert_eq!(document, json!({ "list": [] }));
    assert!(crate::document::set(&mut document, &["list", "0", "x"], json!(1)));
    assert_eq!(document, json!({ "list": [{ "x": 1 }] }));
}
