//! Formula discovery in JSON schemas.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use smallvec::SmallVec;
use tracing::debug;

/// Schema key whose string value is a formula.
pub const FORMULA_MARKER: &str = "$$formula";

// Structural keys that never appear in document paths.
const COMBINATORS: &[&str] = &["properties", "anyOf", "allOf", "oneOf"];

pub type OutputPath = SmallVec<[String; 4]>;

/// A formula found in a schema, with the document path it computes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaDescriptor {
    pub formula: String,
    pub output_path: OutputPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
}

impl FormulaDescriptor {
    /// The output path in dotted form, for display.
    pub fn dotted_path(&self) -> String {
        self.output_path.join(".")
    }
}

enum Crumb<'s> {
    Key(&'s str),
    Index,
}

/// Every `$$formula` in `schema`, in traversal order.
pub fn extract_formulas(schema: &Json) -> Vec<FormulaDescriptor> {
    let mut found = Vec::new();
    walk(schema, &mut Vec::new(), &mut found);
    found
}

fn walk<'s>(node: &'s Json, crumbs: &mut Vec<Crumb<'s>>, found: &mut Vec<FormulaDescriptor>) {
    let Json::Object(map) = node else { return };
    for (key, value) in map {
        crumbs.push(Crumb::Key(key));
        match value {
            Json::Object(_) => walk(value, crumbs, found),
            Json::Array(items) => {
                for item in items.iter().filter(|item| item.is_object()) {
                    crumbs.push(Crumb::Index);
                    walk(item, crumbs, found);
                    crumbs.pop();
                }
            }
            Json::String(formula) if key == FORMULA_MARKER => {
                found.push(FormulaDescriptor {
                    formula: formula.clone(),
                    output_path: output_path(&crumbs[..crumbs.len() - 1]),
                    declared_type: declared_type(node),
                });
            }
            _ => {}
        }
        crumbs.pop();
    }
}

fn output_path(crumbs: &[Crumb<'_>]) -> OutputPath {
    crumbs
        .iter()
        .filter_map(|c| match c {
            Crumb::Key(k) if !COMBINATORS.contains(k) => Some(k.to_string()),
            _ => None,
        })
        .collect()
}

// `type` may be a list such as ["string", "null"]; the first non-null wins.
fn declared_type(node: &Json) -> Option<String> {
    match node.get("type")? {
        Json::String(t) => Some(t.clone()),
        Json::Array(types) => types
            .iter()
            .filter_map(Json::as_str)
            .find(|t| *t != "null")
            .map(str::to_string),
        _ => None,
    }
}

/// Content hash of a schema. Object key order does not matter, array order
/// does.
pub fn schema_hash(schema: &Json) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    feed(&mut hasher, schema);
    hasher.finalize()
}

fn feed(h: &mut blake3::Hasher, value: &Json) {
    match value {
        Json::Null => {
            h.update(b"n");
        }
        Json::Bool(b) => {
            h.update(if *b { b"t" } else { b"f" });
        }
        Json::Number(n) => {
            h.update(b"d");
            h.update(&n.as_f64().unwrap_or(f64::NAN).to_le_bytes());
        }
        Json::String(s) => feed_str(h, b's', s),
        Json::Array(items) => {
            h.update(b"a");
            h.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                feed(h, item);
            }
        }
        Json::Object(map) => {
            h.update(b"o");
            h.update(&(map.len() as u64).to_le_bytes());
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            for (key, value) in entries {
                feed_str(h, b'k', key);
                feed(h, value);
            }
        }
    }
}

fn feed_str(h: &mut blake3::Hasher, tag: u8, s: &str) {
    h.update(&[tag]);
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

static PROCESS_CACHE: Lazy<Arc<FormulaCache>> = Lazy::new(|| Arc::new(FormulaCache::new()));

/// Memoizes [`extract_formulas`] by schema content.
///
/// Two threads missing on the same schema may both extract; the first
/// insert wins and both get the same descriptors.
#[derive(Debug, Default)]
pub struct FormulaCache {
    entries: RwLock<HashMap<blake3::Hash, Arc<[FormulaDescriptor]>>>,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every engine that was not given its own.
    pub fn shared() -> Arc<FormulaCache> {
        PROCESS_CACHE.clone()
    }

    pub fn formulas(&self, schema: &Json) -> Arc<[FormulaDescriptor]> {
        let key = schema_hash(schema);
        if let Some(hit) = self.entries.read().get(&key) {
            return hit.clone();
        }

        let extracted: Arc<[FormulaDescriptor]> = extract_formulas(schema).into();
        debug!(schema = %key, formulas = extracted.len(), "extracted schema formulas");
        self.entries.write().entry(key).or_insert(extracted).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
