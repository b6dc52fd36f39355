//! Workflow runner/orchestrator
//!
//! Drives a run through its pipeline:
//! - Classification and pipeline construction for new runs
//! - Stage-by-stage execution, threading each output into the next input
//! - Jump-ahead when a handler names a later stage
//! - Abort on the first stage error
//! - Resume of an interrupted run from its checkpoint

use serde_json::Value;
use tracing::{debug, info, warn};

use super::classifier::TaskClassifier;
use super::executor::StageExecutor;
use super::handler::{AgentResult, HandlerRegistry};
use super::rules::RuleTable;
use super::state::{Payload, StageStatus, WorkflowContext};
use super::store::StateStore;
use super::task_type::TaskType;
use crate::{EngineConfig, Result};

/// Input key naming the stage whose output is being forwarded
pub const PREVIOUS_AGENT_KEY: &str = "previous_agent";
/// Input key holding the forwarded output
pub const PREVIOUS_OUTPUT_KEY: &str = "previous_output";

/// Lifecycle callbacks, invoked in-line on the runner's task
pub trait StageObserver: Send {
    /// Called before a stage executes
    fn on_stage_start(&mut self, _stage: &str, _context: &WorkflowContext) {}

    /// Called after a stage executes, with its result
    fn on_stage_complete(
        &mut self,
        _stage: &str,
        _result: &AgentResult,
        _context: &WorkflowContext,
    ) {
    }
}

struct NoopObserver;

impl StageObserver for NoopObserver {}

/// Workflow runner
#[derive(Debug)]
pub struct WorkflowRunner {
    classifier: TaskClassifier,
    rules: RuleTable,
    registry: HandlerRegistry,
    store: StateStore,
}

impl WorkflowRunner {
    /// Create a runner from configuration.
    ///
    /// Fails if the configured rule document is invalid.
    pub fn new(config: &EngineConfig, registry: HandlerRegistry) -> Result<Self> {
        let rules = match config.rules_path() {
            Some(path) => RuleTable::load(&path)?,
            None => RuleTable::default(),
        };

        Ok(Self::from_parts(
            TaskClassifier::default(),
            rules,
            registry,
            StateStore::new(config.state_path()),
        ))
    }

    /// Create a runner from already-built components
    pub fn from_parts(
        classifier: TaskClassifier,
        rules: RuleTable,
        registry: HandlerRegistry,
        store: StateStore,
    ) -> Self {
        Self {
            classifier,
            rules,
            registry,
            store,
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn classify(&self, description: &str) -> TaskType {
        self.classifier.classify(description)
    }

    pub fn build_pipeline(&self, task_type: TaskType) -> Vec<String> {
        self.rules.build(task_type)
    }

    /// Classify a description and create a pending run for it
    pub fn create_context(&self, description: &str, metadata: Payload) -> WorkflowContext {
        let task_type = self.classify(description);
        let pipeline = self.build_pipeline(task_type);
        let context = WorkflowContext::new(description, task_type, pipeline, metadata);

        info!(
            "Created run {} ({}): {}",
            context.id,
            task_type,
            context.pipeline.join(" → ")
        );
        context
    }

    /// Execute a single stage
    pub async fn execute_stage(
        &self,
        stage: &str,
        context: &mut WorkflowContext,
        input: Payload,
    ) -> AgentResult {
        StageExecutor::new(&self.registry, &self.store)
            .execute(stage, context, input)
            .await
    }

    /// Run every stage of the pipeline
    pub async fn run(&self, context: WorkflowContext) -> WorkflowContext {
        self.run_with(context, &mut NoopObserver).await
    }

    /// Run every stage of the pipeline, reporting to `observer`
    pub async fn run_with(
        &self,
        mut context: WorkflowContext,
        observer: &mut dyn StageObserver,
    ) -> WorkflowContext {
        info!("Starting run {}: {}", context.id, context.description);
        context.start();
        self.store.checkpoint(&context);

        let input = context.initial_input();
        self.drive(context, 0, input, observer).await
    }

    /// Resume the checkpointed run
    pub async fn resume(&self) -> Option<WorkflowContext> {
        self.resume_with(&mut NoopObserver).await
    }

    /// Resume the checkpointed run, reporting to `observer`.
    ///
    /// `None` when there is no checkpoint. Completed and failed runs are
    /// returned unchanged. The first resumed stage sees the same forwarded
    /// output it would have seen in an uninterrupted run.
    pub async fn resume_with(
        &self,
        observer: &mut dyn StageObserver,
    ) -> Option<WorkflowContext> {
        let Some(mut context) = self.store.load() else {
            info!("No interrupted run at {}", self.store.path().display());
            return None;
        };

        if context.is_terminal() {
            info!("Run {} already {:?}, nothing to resume", context.id, context.status);
            return Some(context);
        }

        let Some(start) = context.resume_point() else {
            // every stage settled but the run was never closed
            debug!("Run {} has no pending stages, closing it", context.id);
            if context.records().any(|(_, r)| r.status == StageStatus::Failed) {
                context.fail();
            } else {
                context.complete();
            }
            self.store.checkpoint(&context);
            return Some(context);
        };

        let mut input = context.initial_input();
        if let Some((stage, record)) = context.last_output() {
            forward_output(&mut input, stage, &record.output_data);
        }

        info!(
            "Resuming run {} at stage {}",
            context.id, context.pipeline[start]
        );
        context.start();
        self.store.checkpoint(&context);

        Some(self.drive(context, start, input, observer).await)
    }

    async fn drive(
        &self,
        mut context: WorkflowContext,
        start: usize,
        mut input: Payload,
        observer: &mut dyn StageObserver,
    ) -> WorkflowContext {
        let executor = StageExecutor::new(&self.registry, &self.store);
        let mut idx = start;

        while idx < context.pipeline.len() {
            let stage = context.pipeline[idx].clone();

            observer.on_stage_start(&stage, &context);
            let mut target = None;
            let result = executor
                .execute_settled(&stage, &mut context, input.clone(), |context, result| {
                    if result.is_error() {
                        context.fail();
                    } else if let Some(ref next) = result.next {
                        target = jump(context, idx, next);
                    }
                })
                .await;
            observer.on_stage_complete(&stage, &result, &context);

            if result.is_error() {
                warn!("Run {} stopped at stage {}", context.id, stage);
                if !context.is_terminal() {
                    context.fail();
                    self.store.checkpoint(&context);
                }
                return context;
            }

            if !result.data.is_empty() {
                forward_output(&mut input, &stage, &result.data);
            }

            idx = target.unwrap_or(idx + 1);
        }

        context.complete();
        self.store.checkpoint(&context);
        info!("Run completed: {}", context.id);
        context
    }
}

/// Skip every stage strictly between `current` and `next`.
///
/// Returns the index to continue at, or `None` if `next` is not a later
/// stage of the pipeline.
fn jump(context: &mut WorkflowContext, current: usize, next: &str) -> Option<usize> {
    let from = context.pipeline[current].clone();
    let target = match context.pipeline.iter().position(|s| s == next) {
        Some(target) if target > current => target,
        Some(_) => {
            warn!("Stage {} asked to jump back to {}, ignoring", from, next);
            return None;
        }
        None => {
            warn!("Stage {} asked to jump to unknown stage {}, ignoring", from, next);
            return None;
        }
    };

    let reason = format!("Skipped: {} jumped to {}", from, next);
    for stage in context.pipeline[current + 1..target].to_vec() {
        info!("Skipping stage: {}", stage);
        context.skip_stage(&stage, &reason);
    }

    Some(target)
}

fn forward_output(input: &mut Payload, stage: &str, output: &Payload) {
    input.insert(PREVIOUS_AGENT_KEY.to_string(), Value::String(stage.to_string()));
    input.insert(PREVIOUS_OUTPUT_KEY.to_string(), Value::Object(output.clone()));
}
