//! Task categories a description can be classified into

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Closed set of task categories.
///
/// Declaration order matters: it is the order the classifier scores types in,
/// and therefore the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Import a design from a design tool (Figma)
    DesignImport,
    /// Build frontend UI
    FrontendBuild,
    /// Build backend services
    BackendBuild,
    /// Model CMS content types
    ContentModel,
    /// Write or fix unit tests
    UnitTest,
    /// Lint, type-check and other quality gates
    QualityGate,
    /// End-to-end / acceptance testing
    AcceptanceTest,
    /// Review existing code
    CodeReview,
    /// Performance audit
    Performance,
    /// Fallback when nothing else matches
    Default,
}

impl TaskType {
    /// Every task type, in declaration order
    pub const ALL: [TaskType; 10] = [
        TaskType::DesignImport,
        TaskType::FrontendBuild,
        TaskType::BackendBuild,
        TaskType::ContentModel,
        TaskType::UnitTest,
        TaskType::QualityGate,
        TaskType::AcceptanceTest,
        TaskType::CodeReview,
        TaskType::Performance,
        TaskType::Default,
    ];

    /// Key used in rule documents and persisted state
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::DesignImport => "design-import",
            TaskType::FrontendBuild => "frontend-build",
            TaskType::BackendBuild => "backend-build",
            TaskType::ContentModel => "content-model",
            TaskType::UnitTest => "unit-test",
            TaskType::QualityGate => "quality-gate",
            TaskType::AcceptanceTest => "acceptance-test",
            TaskType::CodeReview => "code-review",
            TaskType::Performance => "performance",
            TaskType::Default => "default",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| Error::Rules(format!("Unknown task type: {}", s)))
    }
}
