//! Mode definitions (`modes.yaml`) and alias resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category marking modes that carry the implementation exit contract.
pub const IMPLEMENTATION_CATEGORY: &str = "implementation";

/// Fully resolved definition of one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeConfig {
    pub name: String,
    pub description: String,
    pub category: String,
    pub deprecated: bool,
    pub aliases: Vec<String>,
    pub template: Option<String>,
    /// Stop requires per-phase verification evidence.
    pub phased_verification: bool,
    /// Stop requires newly added test declarations.
    pub require_new_tests: bool,
}

impl ModeConfig {
    fn from_layer(name: &str, layer: &ModeLayer) -> Self {
        let mut mode = Self {
            name: name.to_string(),
            description: String::new(),
            category: "general".to_string(),
            deprecated: false,
            aliases: Vec::new(),
            template: None,
            phased_verification: false,
            require_new_tests: false,
        };
        mode.apply(layer);
        mode
    }

    fn apply(&mut self, layer: &ModeLayer) {
        if let Some(description) = &layer.description {
            self.description = description.clone();
        }
        if let Some(category) = &layer.category {
            self.category = category.clone();
        }
        if let Some(deprecated) = layer.deprecated {
            self.deprecated = deprecated;
        }
        if let Some(aliases) = &layer.aliases {
            self.aliases = aliases.clone();
        }
        if let Some(template) = &layer.template {
            self.template = Some(template.clone());
        }
        if let Some(phased) = layer.phased_verification {
            self.phased_verification = phased;
        }
        if let Some(require) = layer.require_new_tests {
            self.require_new_tests = require;
        }
    }

    pub fn is_implementation(&self) -> bool {
        self.category == IMPLEMENTATION_CATEGORY
    }
}

/// One tier's `modes.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModesFile {
    pub modes: BTreeMap<String, ModeLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModeLayer {
    pub description: Option<String>,
    pub category: Option<String>,
    pub deprecated: Option<bool>,
    pub aliases: Option<Vec<String>>,
    pub template: Option<String>,
    pub phased_verification: Option<bool>,
    pub require_new_tests: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeLookupError {
    #[error("unknown mode '{0}'")]
    Unknown(String),
    #[error("mode alias '{alias}' is ambiguous (matches {})", .candidates.join(", "))]
    Ambiguous {
        alias: String,
        candidates: Vec<String>,
    },
}

/// All configured modes keyed by canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModesConfig {
    modes: BTreeMap<String, ModeConfig>,
}

impl ModesConfig {
    /// Build from the built-in tier plus higher tiers, lowest first.
    ///
    /// Modes merge field by field; `aliases` replaces wholesale; unknown names add modes.
    pub fn from_tiers(base: &ModesFile, layers: &[ModesFile]) -> Self {
        let mut modes: BTreeMap<String, ModeConfig> = base
            .modes
            .iter()
            .map(|(name, layer)| (name.clone(), ModeConfig::from_layer(name, layer)))
            .collect();
        for file in layers {
            for (name, layer) in &file.modes {
                match modes.get_mut(name) {
                    Some(existing) => existing.apply(layer),
                    None => {
                        modes.insert(name.clone(), ModeConfig::from_layer(name, layer));
                    }
                }
            }
        }
        Self { modes }
    }

    pub fn get(&self, canonical: &str) -> Option<&ModeConfig> {
        self.modes.get(canonical)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModeConfig> {
        self.modes.values()
    }

    /// Resolve a name or alias to exactly one mode.
    ///
    /// Canonical names win over aliases; an alias claimed by several modes is an error.
    pub fn resolve(&self, name: &str) -> Result<&ModeConfig, ModeLookupError> {
        let needle = name.trim();
        if let Some(mode) = self.modes.get(needle) {
            return Ok(mode);
        }
        let matches: Vec<&ModeConfig> = self
            .modes
            .values()
            .filter(|mode| mode.aliases.iter().any(|alias| alias == needle))
            .collect();
        match matches.as_slice() {
            [] => Err(ModeLookupError::Unknown(needle.to_string())),
            [single] => Ok(single),
            many => Err(ModeLookupError::Ambiguous {
                alias: needle.to_string(),
                candidates: many.iter().map(|mode| mode.name.clone()).collect(),
            }),
        }
    }
}
