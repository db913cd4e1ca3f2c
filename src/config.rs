use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Engine settings. Every field has a default, so a configuration file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name the document is bound to inside formulas.
    pub document_key: String,
    /// Event types that never trigger re-evaluation.
    pub noise_types: Vec<String>,
    pub update_action: String,
    pub set_add_action: String,
    pub schedule: String,
    pub trigger_type: String,
    pub reevaluation_reason: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            document_key: "contract".to_string(),
            noise_types: vec!["create@1.0.0".to_string(), "update@1.0.0".to_string()],
            update_action: "action-update-card@1.0.0".to_string(),
            set_add_action: "action-set-add@1.0.0".to_string(),
            schedule: "async".to_string(),
            trigger_type: "triggered-action@1.0.0".to_string(),
            reevaluation_reason: "formula re-evaluation".to_string(),
        }
    }
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<()> {
        let key = &self.document_key;
        let valid = key
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_' || c == '$')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if !valid {
            return Err(Error::Config(format!(
                "document_key '{}' is not an identifier",
                key
            )));
        }
        Ok(())
    }
}
