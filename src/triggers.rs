//! Triggers that keep computed fields fresh when linked contracts change.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use tracing::warn;

use crate::links::{ReverseLink, ANY_TYPE};
use crate::schema::FormulaDescriptor;
use crate::sema;
use crate::{Engine, Formula};

/// Version stamped on everything synthesized here, and assumed for link
/// constraint types.
pub const SYNTHESIZED_VERSION: &str = "1.0.0";

fn default_version() -> String {
    SYNTHESIZED_VERSION.to_string()
}

/// The parts of a type contract that trigger synthesis reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeContract {
    pub slug: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub data: TypeData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeData {
    #[serde(default)]
    pub schema: Json,
}

impl TypeContract {
    pub fn new(slug: impl Into<String>, schema: Json) -> Self {
        Self {
            slug: slug.into(),
            version: default_version(),
            data: TypeData { schema },
        }
    }

    /// `<slug>@<version>`
    pub fn versioned_slug(&self) -> String {
        format!("{}@{}", self.slug, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub slug: String,
    #[serde(rename = "type")]
    pub contract_type: String,
    pub version: String,
    pub active: bool,
    pub requires: Vec<Json>,
    pub capabilities: Vec<Json>,
    pub markers: Vec<String>,
    pub tags: Vec<String>,
    pub data: TriggerData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerData {
    pub schedule: String,
    pub action: String,
    #[serde(rename = "type")]
    pub target_type: String,
    pub target: Json,
    pub arguments: Json,
    pub filter: Json,
}

/// Lowercase, with every run of characters outside `[a-z0-9-]` turned into
/// a single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug
}

impl Engine {
    fn parsed_formulas(&self, schema: &Json) -> Vec<(FormulaDescriptor, Formula)> {
        self.formulas(schema)
            .iter()
            .filter_map(|d| match Formula::compile(&d.formula) {
                Ok(f) => Some((d.clone(), f)),
                Err(err) => {
                    warn!(formula = %d.formula, error = %err.msg, "skipping formula that does not parse");
                    None
                }
            })
            .collect()
    }

    /// Link verbs read through `<document>.links["<verb>"]` by any formula
    /// of `schema`, de-duplicated in first-seen order.
    pub fn link_verbs(&self, schema: &Json) -> Vec<String> {
        let mut verbs = IndexSet::new();
        for (descriptor, formula) in self.parsed_formulas(schema) {
            let refs = sema::link_references(formula.ast(), &self.config.document_key);
            if refs.iter().any(|r| r.via_this) {
                warn!(
                    path = %descriptor.dotted_path(),
                    "formula reads links through deprecated 'this'"
                );
            }
            verbs.extend(refs.into_iter().map(|r| r.verb));
        }
        verbs.into_iter().collect()
    }

    /// Triggers that re-evaluate `type_contract`'s formulas when a linked
    /// contract changes, plus one per `$events` aggregation.
    pub fn type_triggers(&self, type_contract: &TypeContract) -> Vec<TriggerDefinition> {
        let schema = &type_contract.data.schema;
        let mut triggers = Vec::new();

        for verb in self.link_verbs(schema) {
            for reverse in self.links.reverse(&type_contract.slug, &verb) {
                triggers.push(self.link_trigger(type_contract, &reverse));
            }
        }

        for (descriptor, formula) in self.parsed_formulas(schema) {
            if let Some(source) = sema::events_source(formula.ast()) {
                triggers.push(self.events_trigger(type_contract, &descriptor, source));
            }
        }

        triggers
    }

    fn trigger(&self, slug: String, data: TriggerData) -> TriggerDefinition {
        TriggerDefinition {
            slug,
            contract_type: self.config.trigger_type.clone(),
            version: SYNTHESIZED_VERSION.to_string(),
            active: true,
            requires: Vec::new(),
            capabilities: Vec::new(),
            markers: Vec::new(),
            tags: Vec::new(),
            data,
        }
    }

    fn link_trigger(&self, type_contract: &TypeContract, reverse: &ReverseLink) -> TriggerDefinition {
        let versioned = type_contract.versioned_slug();

        // Constrained source types narrow the filter; otherwise only the
        // high-frequency noise types are excluded.
        let constrained = !reverse.constraints.is_empty()
            && reverse.constraints.iter().all(|c| c.from_type != ANY_TYPE);
        let type_filter = if constrained {
            let types: IndexSet<String> = reverse
                .constraints
                .iter()
                .map(|c| format!("{}@{}", c.from_type, SYNTHESIZED_VERSION))
                .collect();
            let types: Vec<String> = types.into_iter().collect();
            json!({ "type": "string", "enum": types })
        } else {
            json!({ "type": "string", "not": { "enum": self.config.noise_types } })
        };

        let mut links = Map::new();
        links.insert(reverse.verb.clone(), linked_to(&versioned));

        self.trigger(
            slugify(&format!(
                "triggered-action-formula-update-{}-{}",
                type_contract.slug, reverse.verb
            )),
            TriggerData {
                schedule: self.config.schedule.clone(),
                action: self.config.update_action.clone(),
                target_type: versioned,
                target: json!({
                    "$map": { "$eval": format!("source.links['{}']", reverse.verb) },
                    "each(card)": { "$eval": "card.id" },
                }),
                arguments: json!({
                    "reason": self.config.reevaluation_reason,
                    "patch": [],
                }),
                filter: json!({
                    "type": "object",
                    "required": ["type", "data"],
                    "$$links": links,
                    "properties": { "type": type_filter },
                }),
            },
        )
    }

    fn events_trigger(
        &self,
        type_contract: &TypeContract,
        descriptor: &FormulaDescriptor,
        source: &str,
    ) -> TriggerDefinition {
        let versioned = type_contract.versioned_slug();
        let value = format!("source.{}", source);

        let mut links = Map::new();
        links.insert("is attached to".to_string(), linked_to(&versioned));

        self.trigger(
            slugify(&format!(
                "triggered-action-{}-{}",
                type_contract.slug,
                descriptor.output_path.join("-")
            )),
            TriggerData {
                schedule: self.config.schedule.clone(),
                action: self.config.set_add_action.clone(),
                target_type: versioned,
                target: json!({ "$eval": "source.links['is attached to'][0].id" }),
                arguments: json!({
                    "property": descriptor.dotted_path(),
                    "value": {
                        "$if": value,
                        "then": { "$eval": value },
                        "else": [],
                    },
                }),
                filter: json!({
                    "type": "object",
                    "required": ["type", "data"],
                    "$$links": links,
                    "properties": {
                        "type": {
                            "type": "string",
                            "not": { "enum": self.config.noise_types },
                        },
                        "data": {
                            "type": "object",
                            "required": ["payload"],
                            "properties": { "payload": { "type": "object" } },
                        },
                    },
                }),
            },
        )
    }
}

// Schema matching a link to a contract of type `versioned`.
fn linked_to(versioned: &str) -> Json {
    json!({
        "type": "object",
        "required": ["type"],
        "properties": {
            "type": { "type": "string", "const": versioned },
        },
    })
}
