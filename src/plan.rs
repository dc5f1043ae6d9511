//! Task plans loaded from disk.
//!
//! A plan is a TOML or JSON document naming a feature and listing its design
//! tasks. The format is picked by file extension: `.json` is JSON, anything
//! else is TOML.
//!
//! Occurrences of `{feature}` in a task's files, description or prompt are
//! replaced with the plan's feature name when the plan is loaded.

use crate::core::registry::TaskRegistry;
use crate::core::task::{TaskId, TaskSpec};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

const FEATURE_PLACEHOLDER: &str = "{feature}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Plan {
    #[serde(default)]
    pub feature: String,
    /// Ids satisfied outside this plan.
    #[serde(default)]
    pub external: Vec<TaskId>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading plan");
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let plan: Self = toml::from_str(content)?;
        Ok(plan.resolved())
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let plan: Self = serde_json::from_str(content)?;
        Ok(plan.resolved())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Register every external id and task, then validate the result.
    ///
    /// # Errors
    /// Any registration or validation error, such as `DuplicateId`,
    /// `UnknownDependency` or `CyclicDependency`.
    pub fn into_registry(self) -> Result<TaskRegistry> {
        let mut registry = TaskRegistry::new();
        for id in self.external {
            registry.declare_external(id)?;
        }
        registry.register_all(self.tasks)?;
        registry.validate()?;
        Ok(registry)
    }

    fn resolved(mut self) -> Self {
        if self.feature.is_empty() {
            return self;
        }
        let feature = self.feature.clone();
        let fill = |text: &mut String| {
            if text.contains(FEATURE_PLACEHOLDER) {
                *text = text.replace(FEATURE_PLACEHOLDER, &feature);
            }
        };
        for task in &mut self.tasks {
            for file in &mut task.files {
                fill(file);
            }
            fill(&mut task.description);
            fill(&mut task.prompt);
        }
        self
    }
}
