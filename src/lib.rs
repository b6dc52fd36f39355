//! Stagehand: task classification and resumable stage pipelines
//!
//! A free-text task description is classified into a [`TaskType`], expanded
//! into an ordered pipeline of stage names, and driven stage by stage through
//! pluggable [`Handler`]s. The whole run is checkpointed after every
//! transition so an interrupted run picks up where it left off.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────────────┐
//! │  Classifier  │ → │  Rule Table  │ → │  WorkflowContext    │
//! │ text → type  │   │ type → stages│   │  one record / stage │
//! └──────────────┘   └──────────────┘   └──────────┬──────────┘
//!                                                  ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  WorkflowRunner: stage → StageExecutor → Handler → persist  │
//! │  previous output threads into next input, abort on error    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod workflow;

pub use config::EngineConfig;
pub use workflow::{
    AgentResult, AgentStatus, Handler, HandlerRegistry, HandlerRequest, Payload, RuleTable,
    RunStatus, StageExecutor, StageObserver, StageRecord, StageStatus, StateStore,
    TaskClassifier, TaskType, WorkflowContext, WorkflowRunner,
};

/// Crate-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rule table error: {0}")]
    Rules(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
