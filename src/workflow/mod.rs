//! Workflow orchestration engine
//!
//! Turns a task description into a run of specialist stages:
//!
//! - **Classification**: keyword scoring picks a [`TaskType`]
//! - **Rules**: the task type selects an ordered pipeline of stage names
//! - **Context**: one [`WorkflowContext`] per run, a record per stage
//! - **Handlers**: pluggable units of work, looked up by stage name
//! - **Execution**: stages run one after another, each seeing the previous
//!   stage's output; the first error stops the run
//! - **State**: the context is checkpointed after every transition, so an
//!   interrupted run resumes at the first unfinished stage
//!
//! ## Example
//!
//! ```no_run
//! use stagehand::workflow::{AgentResult, HandlerRegistry, Payload};
//! use stagehand::{EngineConfig, WorkflowRunner};
//!
//! # async fn demo() -> stagehand::Result<()> {
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("design-import", |req| {
//!     let mut data = Payload::new();
//!     data.insert("source".into(), req.task.into());
//!     Ok(AgentResult::success(data))
//! });
//!
//! let runner = WorkflowRunner::new(&EngineConfig::default(), registry)?;
//! let context = runner.create_context("Build the hero from figma.com/file/42", Payload::new());
//! let finished = runner.run(context).await;
//! println!("{}", finished.summary());
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod command;
pub mod executor;
pub mod handler;
pub mod rules;
pub mod runner;
pub mod state;
pub mod store;
pub mod task_type;

pub use classifier::TaskClassifier;
pub use command::{registry_from_config, CommandHandler};
pub use executor::StageExecutor;
pub use handler::{AgentResult, AgentStatus, FnHandler, Handler, HandlerRegistry, HandlerRequest};
pub use rules::RuleTable;
pub use runner::{StageObserver, WorkflowRunner, PREVIOUS_AGENT_KEY, PREVIOUS_OUTPUT_KEY};
pub use state::{Payload, RunStatus, StageRecord, StageStatus, WorkflowContext};
pub use store::{StateStore, DEFAULT_STATE_PATH};
pub use task_type::TaskType;
