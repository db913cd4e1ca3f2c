use serde_json::{json, Value as Json};

use crate::{slugify, Config, Engine, Error, LinkConstraint, LinkRegistry, TypeContract};

fn constraint(verb: &str, from_type: &str, to_type: &str, inverse_verb: &str) -> LinkConstraint {
    LinkConstraint {
        verb: verb.to_string(),
        from_type: from_type.to_string(),
        to_type: to_type.to_string(),
        inverse_verb: inverse_verb.to_string(),
    }
}

fn links() -> LinkRegistry {
    LinkRegistry::new(vec![
        constraint("is attached to PR", "commit", "pull-request", "has attached commit"),
        constraint("has attached commit", "pull-request", "commit", "is attached to PR"),
        constraint("was built into", "commit", "*", "was built from"),
        constraint("was built from", "*", "commit", "was built into"),
    ])
}

fn commit() -> TypeContract {
    TypeContract::new(
        "commit",
        json!({
            "type": "object",
            "properties": {
                "data": {
                    "type": "object",
                    "properties": {
                        "merged": {
                            "type": "boolean",
                            "$$formula": "contract.links[\"is attached to PR\"].length > 0 && contract.links[\"is attached to PR\"][0].data.merged_at",
                        },
                        "mergeable": {
                            "type": "boolean",
                            "$$formula": "contract.links[\"was built into\"].length > 0 && EVERY(contract.links[\"was built into\"], \"data.$transformer.mergeable\")",
                        },
                    },
                },
                "name": { "type": "string" },
            },
        }),
    )
}

fn link_trigger(verb: &str, type_filter: Json) -> Json {
    json!({
        "slug": format!("triggered-action-formula-update-commit-{}", slugify(verb)),
        "type": "triggered-action@1.0.0",
        "version": "1.0.0",
        "active": true,
        "requires": [],
        "capabilities": [],
        "markers": [],
        "tags": [],
        "data": {
            "schedule": "async",
            "action": "action-update-card@1.0.0",
            "type": "commit@1.0.0",
            "target": {
                "$map": { "$eval": format!("source.links['{}']", verb) },
                "each(card)": { "$eval": "card.id" },
            },
            "arguments": { "reason": "formula re-evaluation", "patch": [] },
            "filter": {
                "type": "object",
                "required": ["type", "data"],
                "$$links": {
                    verb: {
                        "type": "object",
                        "required": ["type"],
                        "properties": { "type": { "type": "string", "const": "commit@1.0.0" } },
                    },
                },
                "properties": { "type": type_filter },
            },
        },
    })
}

#[test]
fn link_triggers() {
    let engine = Engine::new().with_links(links());
    let triggers = engine.type_triggers(&commit());
    assert_eq!(
        serde_json::to_value(&triggers).unwrap(),
        json!([
            link_trigger(
                "has attached commit",
                json!({ "type": "string", "enum": ["pull-request@1.0.0"] })
            ),
            link_trigger(
                "was built from",
                json!({ "type": "string", "not": { "enum": ["create@1.0.0", "update@1.0.0"] } })
            ),
        ])
    );
    assert_eq!(triggers[0].slug, "triggered-action-formula-update-commit-has-attached-commit");
    assert_eq!(triggers[1].slug, "triggered-action-formula-update-commit-was-built-from");
}

#[test]
fn unknown_verbs_reverse_to_themselves() {
    let contract = TypeContract::new(
        "thread",
        json!({ "properties": { "n": { "$$formula": "SIZE(contract.links[\"is related to\"])" } } }),
    );
    let triggers = Engine::new().type_triggers(&contract);
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].slug, "triggered-action-formula-update-thread-is-related-to");
    assert_eq!(
        triggers[0].data.filter["properties"]["type"],
        json!({ "type": "string", "not": { "enum": ["create@1.0.0", "update@1.0.0"] } })
    );
}

#[test]
fn events_triggers() {
    for formula in ["AGGREGATE($events, \"data.mentions\")", "UNIQUE(FLATMAP($events, \"data.mentions\"))"] {
        let contract = TypeContract::new(
            "thread",
            json!({
                "type": "object",
                "properties": {
                    "data": {
                        "type": "object",
                        "properties": { "mentions": { "type": "array", "$$formula": formula } },
                    },
                },
            }),
        );
        let triggers = Engine::new().type_triggers(&contract);
        assert_eq!(
            serde_json::to_value(&triggers).unwrap(),
            json!([{
                "type": "triggered-action@1.0.0",
                "version": "1.0.0",
                "slug": "triggered-action-thread-data-mentions",
                "requires": [],
                "capabilities": [],
                "active": true,
                "tags": [],
                "markers": [],
                "data": {
                    "schedule": "async",
                    "type": "thread@1.0.0",
                    "action": "action-set-add@1.0.0",
                    "target": { "$eval": "source.links['is attached to'][0].id" },
                    "arguments": {
                        "property": "data.mentions",
                        "value": {
                            "$if": "source.data.mentions",
                            "then": { "$eval": "source.data.mentions" },
                            "else": [],
                        },
                    },
                    "filter": {
                        "type": "object",
                        "$$links": {
                            "is attached to": {
                                "type": "object",
                                "required": ["type"],
                                "properties": { "type": { "type": "string", "const": "thread@1.0.0" } },
                            },
                        },
                        "required": ["type", "data"],
                        "properties": {
                            "type": { "type": "string", "not": { "enum": ["create@1.0.0", "update@1.0.0"] } },
                            "data": {
                                "type": "object",
                                "required": ["payload"],
                                "properties": { "payload": { "type": "object" } },
                            },
                        },
                    },
                },
            }]),
            "{}",
            formula
        );
    }
}

#[test]
fn no_formulas_no_triggers() {
    let contract = TypeContract::new("thread", json!({ "properties": { "a": { "type": "string" } } }));
    assert!(Engine::new().with_links(links()).type_triggers(&contract).is_empty());
}

#[test]
fn link_verbs_are_unique() {
    let schema = json!({
        "type": "object",
        "properties": {
            "a": { "$$formula": "contract.links[\"has attached element\"].length" },
            "b": {
                "$$formula": "contract.links[\"is owned by\"].reduce((acc, x) => acc + x.n, 0) + SIZE(contract.links[\"has attached element\"])",
            },
            "c": { "$$formula": "[]+contract.links[\"has member\"]" },
            "d": { "$$formula": "this.links[\"is bookmarked by\"]" },
            "e": { "$$formula": "not a formula (" },
            "f": { "$$formula": "other.links[\"ignored\"]" },
            "g": { "$$formula": "contract[\"links\"][\"computed\"]" },
        },
    });
    assert_eq!(
        Engine::new().link_verbs(&schema),
        vec!["has attached element", "is owned by", "has member", "is bookmarked by"]
    );
}

#[test]
fn triggers_are_deterministic() {
    let engine_a = Engine::new().with_links(links());
    let engine_b = Engine::new().with_links(links());
    let contract = commit();

    let first = serde_json::to_value(engine_a.type_triggers(&contract)).unwrap();
    assert_eq!(first, serde_json::to_value(engine_a.type_triggers(&contract)).unwrap());
    assert_eq!(first, serde_json::to_value(engine_b.type_triggers(&contract)).unwrap());

    let verbs = engine_a.link_verbs(&contract.data.schema);
    assert_eq!(verbs, vec!["is attached to PR", "was built into"]);
    assert_eq!(verbs, engine_a.link_verbs(&contract.data.schema));
    assert_eq!(verbs, engine_b.link_verbs(&contract.data.schema));
}

#[test]
fn reverse_links() {
    let registry = links();

    let reversed = registry.reverse("commit@1.0.0", "is attached to PR");
    assert_eq!(reversed.len(), 1);
    assert_eq!(reversed[0].verb, "has attached commit");
    assert_eq!(reversed[0].constraints[0].from_type, "pull-request");

    // constraints pointing at another type are ignored
    assert!(registry.reverse("image", "is attached to PR").is_empty());

    let reversed = registry.reverse("thread", "is related to");
    assert_eq!(reversed.len(), 1);
    assert_eq!(reversed[0].verb, "is related to");
    assert!(reversed[0].constraints.is_empty());
}

#[test]
fn link_registry_from_json() {
    let registry = LinkRegistry::from_json_str(
        r#"[{ "verb": "is attached to", "fromType": "message", "toType": "thread", "inverseVerb": "has attached element" }]"#,
    )
    .unwrap();
    assert_eq!(
        registry.constraints(),
        &[constraint("is attached to", "message", "thread", "has attached element")]
    );
}

#[test]
fn slugs() {
    assert_eq!(slugify("triggered-action-formula-update-commit-has attached commit"), "triggered-action-formula-update-commit-has-attached-commit");
    assert_eq!(slugify("A  b__c@1.0.0"), "a-b-c-1-0-0");
    assert_eq!(slugify("data.mentions"), "data-mentions");
}

#[test]
fn config() {
    let config = Config::from_json_str(r#"{ "document_key": "card", "schedule": "sync" }"#).unwrap();
    assert_eq!(config.document_key, "card");
    assert_eq!(config.schedule, "sync");
    assert_eq!(config.noise_types, Config::default().noise_types);

    let engine = Engine::with_config(config);
    let result = engine.evaluate("card.a", &json!({ "a": 1 }), &json!(null)).unwrap();
    assert_eq!(result.value, json!(1));

    assert!(matches!(
        Config::from_json_str(r#"{ "document_key": "not valid" }"#),
        Err(Error::Config(_))
    ));
    assert!(matches!(Config::from_json_str("42"), Err(Error::Json(_))));
}

#[test]
fn custom_trigger_settings() {
    let config = Config {
        noise_types: vec!["ping@1.0.0".to_string()],
        update_action: "action-refresh@1.0.0".to_string(),
        ..Config::default()
    };
    let contract = TypeContract::new(
        "thread",
        json!({ "properties": { "n": { "$$formula": "SIZE(contract.links[\"has member\"])" } } }),
    );
    let triggers = Engine::with_config(config).type_triggers(&contract);
    assert_eq!(triggers[0].data.action, "action-refresh@1.0.0");
    assert_eq!(
        triggers[0].data.filter["properties"]["type"]["not"]["enum"],
        json!(["ping@1.0.0"])
    );
}
