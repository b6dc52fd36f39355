//! Keyword-based task classification
//!
//! Scores a description against per-type keyword phrases. A design-tool URL
//! in the description short-circuits scoring: that signal is unambiguous.

use super::task_type::TaskType;

/// URL fragments that identify a design-tool link
const DESIGN_TOOL_MARKERS: &[&str] = &["figma.com"];

/// Built-in keyword phrases, in [`TaskType`] declaration order
const KEYWORDS: &[(TaskType, &[&str])] = &[
    (TaskType::DesignImport, &["figma", "design file", "mockup", "wireframe"]),
    (
        TaskType::FrontendBuild,
        &[
            "frontend",
            "front-end",
            "css",
            "stylesheet",
            "tailwind",
            "html",
            "responsive",
            "landing page",
            "storybook",
        ],
    ),
    (
        TaskType::BackendBuild,
        &[
            "backend",
            "back-end",
            "api endpoint",
            "rest api",
            "graphql",
            "database",
            "migration",
            "microservice",
            "server-side",
        ],
    ),
    (
        TaskType::ContentModel,
        &["content model", "content type", "cms", "contentful", "strapi", "schema"],
    ),
    (
        TaskType::UnitTest,
        &["unit test", "jest", "vitest", "mocha", "test coverage", "snapshot test"],
    ),
    (
        TaskType::QualityGate,
        &[
            "lint",
            "eslint",
            "prettier",
            "type check",
            "typecheck",
            "quality gate",
            "sonarqube",
            "static analysis",
        ],
    ),
    (
        TaskType::AcceptanceTest,
        &["acceptance", "e2e", "end-to-end", "playwright", "cypress", "regression test"],
    ),
    (
        TaskType::CodeReview,
        &["code review", "review", "pull request", "merge request", "refactor"],
    ),
    (
        TaskType::Performance,
        &[
            "performance",
            "lighthouse",
            "pagespeed",
            "page speed",
            "core web vitals",
            "bundle size",
            "load time",
        ],
    ),
];

/// Classifies free-text task descriptions
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    design_markers: Vec<String>,
    keywords: Vec<(TaskType, Vec<String>)>,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self {
            design_markers: DESIGN_TOOL_MARKERS.iter().map(|m| m.to_string()).collect(),
            keywords: KEYWORDS
                .iter()
                .map(|(t, words)| (*t, words.iter().map(|w| w.to_string()).collect()))
                .collect(),
        }
    }
}

impl TaskClassifier {
    /// Create a classifier with a custom keyword table.
    ///
    /// Entries are scored in the order given; on equal scores the earlier
    /// entry keeps the lead. Phrases are matched lower-cased.
    pub fn new(design_markers: Vec<String>, keywords: Vec<(TaskType, Vec<String>)>) -> Self {
        let lower = |v: Vec<String>| v.into_iter().map(|s| s.to_lowercase()).collect();
        Self {
            design_markers: lower(design_markers),
            keywords: keywords.into_iter().map(|(t, w)| (t, lower(w))).collect(),
        }
    }

    /// Classify a description.
    ///
    /// The winner is the type with the strictly highest keyword count.
    /// [`TaskType::Default`] holds the lead at score zero, so a description
    /// with no matches, or whose best rivals only tie an earlier leader, never
    /// changes hands.
    pub fn classify(&self, description: &str) -> TaskType {
        let text = description.to_lowercase();

        if self.design_markers.iter().any(|m| text.contains(m.as_str())) {
            return TaskType::DesignImport;
        }

        let mut best = TaskType::Default;
        let mut max = 0;
        for (task_type, score) in self.score_lowercase(&text) {
            if score > max {
                best = task_type;
                max = score;
            }
        }
        best
    }

    /// Per-type keyword counts, in scoring order
    pub fn scores(&self, description: &str) -> Vec<(TaskType, usize)> {
        self.score_lowercase(&description.to_lowercase())
    }

    /// Whether the description carries a design-tool link
    pub fn has_design_link(&self, description: &str) -> bool {
        let text = description.to_lowercase();
        self.design_markers.iter().any(|m| text.contains(m.as_str()))
    }

    fn score_lowercase(&self, text: &str) -> Vec<(TaskType, usize)> {
        self.keywords
            .iter()
            .map(|(task_type, words)| {
                let score = words.iter().filter(|w| text.contains(w.as_str())).count();
                (*task_type, score)
            })
            .collect()
    }
}
