//! Level descriptors consumed by the visualiser.
//!
//! A level's `modules` list is the only input deciding which visualiser
//! modules a session loads. Curriculum content itself lives outside this
//! crate; levels arrive as [`LevelConfig`] values or JSON files.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::module::{ModuleHandle, VisualiserContext};

/// Data describing one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelConfig {
    /// Unique id
    pub id: String,
    /// Title shown to the learner
    pub title: String,
    /// Description of the objective
    pub objective: String,
    /// Code the learner sees when the level loads
    pub initial_code: String,
    /// Module names to load for this level, in load order
    pub modules: Vec<String>,
}

impl LevelConfig {
    /// Create a level with no modules.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            objective: String::new(),
            initial_code: String::new(),
            modules: Vec::new(),
        }
    }

    /// Set the objective.
    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = objective.into();
        self
    }

    /// Set the initial code.
    pub fn with_initial_code(mut self, code: impl Into<String>) -> Self {
        self.initial_code = code.into();
        self
    }

    /// Append a module name.
    pub fn with_module(mut self, name: impl Into<String>) -> Self {
        self.modules.push(name.into());
        self
    }

    /// Check the descriptor is well formed.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid_level(&self.title, "level id is empty"));
        }

        let mut seen = HashSet::new();
        for name in &self.modules {
            if !seen.insert(name.as_str()) {
                return Err(Error::invalid_level(
                    &self.id,
                    format!("module {} is listed more than once", name),
                ));
            }
        }
        Ok(())
    }

    /// Parse and validate a level from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let level: Self = serde_json::from_str(json)?;
        level.validate()?;
        Ok(level)
    }

    /// Load and validate a level from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// A playable level.
///
/// The hook runs after the visualiser has loaded the level's modules, so a
/// level can attach listeners to the bus or poke at specific modules. Bus
/// subscriptions made by the hook are dropped when the level is unloaded.
pub trait Level: Send + Sync {
    /// The level's descriptor.
    fn config(&self) -> &LevelConfig;

    /// Level-specific setup once modules are initialised.
    fn init(&self, _context: &VisualiserContext, _modules: &[ModuleHandle]) {}
}

impl Level for LevelConfig {
    fn config(&self) -> &LevelConfig {
        self
    }
}
