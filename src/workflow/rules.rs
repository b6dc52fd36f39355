//! Rule table: task type → ordered stage names
//!
//! The built-in table can be overridden by a JSON document of the form
//!
//! ```json
//! {
//!   "default": ["frontend-build", "unit-test", "review"],
//!   "design-import": ["design-import", "frontend-build", "review"]
//! }
//! ```
//!
//! Document entries replace built-in entries with the same key. The document
//! must carry `default`.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use super::task_type::TaskType;
use crate::{Error, Result};

/// Mapping from task type to its pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleTable {
    rules: BTreeMap<TaskType, Vec<String>>,
}

impl Default for RuleTable {
    fn default() -> Self {
        let rule =
            |stages: &[&str]| -> Vec<String> { stages.iter().map(|s| s.to_string()).collect() };
        let mut rules: BTreeMap<TaskType, Vec<String>> = BTreeMap::new();
        rules.insert(
            TaskType::DesignImport,
            rule(&["design-import", "frontend-build", "review", "acceptance-test", "performance"]),
        );
        rules.insert(
            TaskType::FrontendBuild,
            rule(&["frontend-build", "unit-test", "quality-gate", "review"]),
        );
        rules.insert(
            TaskType::BackendBuild,
            rule(&["backend-build", "unit-test", "quality-gate", "review"]),
        );
        rules.insert(
            TaskType::ContentModel,
            rule(&["content-model", "backend-build", "review"]),
        );
        rules.insert(TaskType::UnitTest, rule(&["unit-test", "quality-gate"]));
        rules.insert(TaskType::QualityGate, rule(&["quality-gate"]));
        rules.insert(TaskType::AcceptanceTest, rule(&["acceptance-test"]));
        rules.insert(TaskType::CodeReview, rule(&["review"]));
        rules.insert(TaskType::Performance, rule(&["performance"]));
        rules.insert(
            TaskType::Default,
            rule(&["frontend-build", "unit-test", "quality-gate", "review"]),
        );
        Self { rules }
    }
}

impl RuleTable {
    /// Build a table from explicit entries.
    ///
    /// Fails when `default` is missing or an entry is empty or repeats a stage.
    pub fn new(rules: BTreeMap<TaskType, Vec<String>>) -> Result<Self> {
        let table = Self { rules };
        table.validate()?;
        Ok(table)
    }

    /// Built-in table with the entries of a JSON rule document layered on top
    pub fn from_json(content: &str) -> Result<Self> {
        let document: HashMap<String, Vec<String>> = serde_json::from_str(content)
            .map_err(|e| Error::Rules(format!("Failed to parse rule document: {}", e)))?;

        if !document.contains_key(TaskType::Default.as_str()) {
            return Err(Error::Rules(
                "Rule document must define a \"default\" pipeline".to_string(),
            ));
        }

        let mut rules = Self::default().rules;
        for (key, stages) in document {
            let task_type: TaskType = key.parse()?;
            debug!(task_type = %task_type, stages = ?stages, "Overriding rule");
            rules.insert(task_type, stages);
        }

        Self::new(rules)
    }

    /// Load a rule document, falling back to the built-in table if the file
    /// does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No rule document, using built-in rules");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Rules(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let table = Self::from_json(&content)?;
        info!(path = %path.display(), "Loaded rule document");
        Ok(table)
    }

    /// Pipeline for a task type; the `default` pipeline if the type has no entry.
    ///
    /// Always an owned copy.
    pub fn build(&self, task_type: TaskType) -> Vec<String> {
        self.rules
            .get(&task_type)
            .or_else(|| self.rules.get(&TaskType::Default))
            .cloned()
            .unwrap_or_default()
    }

    /// Explicit entry for a task type, without fallback
    pub fn get(&self, task_type: TaskType) -> Option<&[String]> {
        self.rules.get(&task_type).map(Vec::as_slice)
    }

    /// All entries, ordered by task type
    pub fn iter(&self) -> impl Iterator<Item = (TaskType, &[String])> {
        self.rules.iter().map(|(t, s)| (*t, s.as_slice()))
    }

    fn validate(&self) -> Result<()> {
        if !self.rules.contains_key(&TaskType::Default) {
            return Err(Error::Rules(
                "Rule table has no \"default\" pipeline".to_string(),
            ));
        }

        for (task_type, stages) in &self.rules {
            if stages.is_empty() {
                return Err(Error::Rules(format!("Pipeline for {} is empty", task_type)));
            }
            let mut seen = HashSet::new();
            for stage in stages {
                if stage.trim().is_empty() {
                    return Err(Error::Rules(format!(
                        "Pipeline for {} has a blank stage name",
                        task_type
                    )));
                }
                if !seen.insert(stage.as_str()) {
                    return Err(Error::Rules(format!(
                        "Pipeline for {} lists stage {} twice",
                        task_type, stage
                    )));
                }
            }
        }

        Ok(())
    }
}
