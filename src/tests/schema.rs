use std::sync::Arc;

use serde_json::json;

use crate::{extract_formulas, schema_hash, Engine, FormulaCache};

#[test]
fn finds_formulas() {
    let schema = json!({
        "type": "object",
        "properties": {
            "a": { "type": "number", "$$formula": "1" },
            "data": {
                "type": "object",
                "properties": {
                    "b": { "type": ["string", "null"], "$$formula": "2" },
                },
            },
            "c": {
                "anyOf": [
                    { "type": "object", "properties": { "d": { "$$formula": "3" } } },
                ],
            },
        },
    });
    let found = extract_formulas(&schema);
    let summary: Vec<_> = found
        .iter()
        .map(|d| (d.formula.as_str(), d.dotted_path(), d.declared_type.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("1", "a".to_string(), Some("number".to_string())),
            ("2", "data.b".to_string(), Some("string".to_string())),
            ("3", "c.d".to_string(), None),
        ]
    );
}

#[test]
fn ignores_non_string_markers() {
    let schema = json!({ "properties": { "a": { "$$formula": 1 } } });
    assert!(extract_formulas(&schema).is_empty());
}

#[test]
fn descriptors_serialize_camel_case() {
    let found = extract_formulas(&json!({ "properties": { "a": { "type": "number", "$$formula": "1" } } }));
    assert_eq!(
        serde_json::to_value(&found).unwrap(),
        json!([{ "formula": "1", "outputPath": ["a"], "declaredType": "number" }])
    );
}

#[test]
fn hash_ignores_key_order() {
    let a = json!({ "type": "object", "properties": { "x": { "$$formula": "1" }, "y": { "type": "number" } } });
    let b = json!({ "properties": { "y": { "type": "number" }, "x": { "$$formula": "1" } }, "type": "object" });
    assert_eq!(schema_hash(&a), schema_hash(&b));

    let c = json!({ "type": "object", "properties": { "x": { "$$formula": "2" } } });
    assert_ne!(schema_hash(&a), schema_hash(&c));
    assert_ne!(schema_hash(&json!([1, 2])), schema_hash(&json!([2, 1])));
    assert_ne!(schema_hash(&json!("1")), schema_hash(&json!(1)));
}

#[test]
fn cache_is_keyed_by_content() {
    let cache = Arc::new(FormulaCache::new());
    let engine = Engine::new().with_cache(cache.clone());

    let a = json!({ "properties": { "x": { "$$formula": "1" }, "y": { "$$formula": "2" } } });
    let b = json!({ "properties": { "y": { "$$formula": "2" }, "x": { "$$formula": "1" } } });

    let first = engine.formulas(&a);
    let second = engine.formulas(&b);
    assert_eq!(cache.len(), 1);
    assert!(Arc::ptr_eq(&first, &second));

    engine.formulas(&json!({}));
    assert_eq!(cache.len(), 2);

    cache.clear();
    assert!(cache.is_empty());
}
