//! Link constraints between contract types.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Wildcard accepted in constraint type positions.
pub const ANY_TYPE: &str = "*";

/// `from_type --verb--> to_type`, whose reverse direction reads
/// `to_type --inverse_verb--> from_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkConstraint {
    pub verb: String,
    pub from_type: String,
    pub to_type: String,
    pub inverse_verb: String,
}

/// Reverse direction of a link verb, with the constraints that produce it.
/// No constraints means the verb is its own inverse and any type may be on
/// the other end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseLink {
    pub verb: String,
    pub constraints: Vec<LinkConstraint>,
}

/// Strips the `@version` suffix of a type reference.
pub fn base_type(t: &str) -> &str {
    t.split_once('@').map_or(t, |(base, _)| base)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkRegistry {
    constraints: Vec<LinkConstraint>,
}

impl LinkRegistry {
    pub fn new(constraints: Vec<LinkConstraint>) -> Self {
        Self { constraints }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn constraints(&self) -> &[LinkConstraint] {
        &self.constraints
    }

    /// How links named `verb` on a `source_type` contract look from the
    /// other end, grouped by reverse verb in first-seen order.
    pub fn reverse(&self, source_type: &str, verb: &str) -> Vec<ReverseLink> {
        if !self.constraints.iter().any(|c| c.inverse_verb == verb) {
            return vec![ReverseLink {
                verb: verb.to_string(),
                constraints: Vec::new(),
            }];
        }

        let source = base_type(source_type);
        let mut groups: Vec<ReverseLink> = Vec::new();
        for c in &self.constraints {
            if c.inverse_verb != verb || (c.to_type != ANY_TYPE && base_type(&c.to_type) != source) {
                continue;
            }
            match groups.iter_mut().find(|g| g.verb == c.verb) {
                Some(group) => group.constraints.push(c.clone()),
                None => groups.push(ReverseLink {
                    verb: c.verb.clone(),
                    constraints: vec![c.clone()],
                }),
            }
        }
        groups
    }
}
