//! Single-stage execution
//!
//! Moves one stage through `in_progress` to its terminal status, invoking
//! the registered handler in between and checkpointing on both sides.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::handler::{AgentResult, AgentStatus, HandlerRegistry, HandlerRequest};
use super::state::{Payload, WorkflowContext};
use super::store::StateStore;

/// Runs one stage at a time against a registry and a store
#[derive(Debug, Clone, Copy)]
pub struct StageExecutor<'a> {
    registry: &'a HandlerRegistry,
    store: &'a StateStore,
}

impl<'a> StageExecutor<'a> {
    pub fn new(registry: &'a HandlerRegistry, store: &'a StateStore) -> Self {
        Self { registry, store }
    }

    /// Execute `stage` with `input`.
    ///
    /// Never fails: a missing handler yields `skipped`, a handler error or
    /// panic yields `error`. When this returns, the checkpoint reflects the
    /// stage's terminal state.
    pub async fn execute(
        &self,
        stage: &str,
        context: &mut WorkflowContext,
        input: Payload,
    ) -> AgentResult {
        self.execute_settled(stage, context, input, |_, _| {}).await
    }

    /// Like [`execute`](Self::execute), but `settle` may change the context
    /// after the result is folded in and before the terminal checkpoint, so
    /// both land in the same write.
    pub(crate) async fn execute_settled<F>(
        &self,
        stage: &str,
        context: &mut WorkflowContext,
        input: Payload,
        settle: F,
    ) -> AgentResult
    where
        F: FnOnce(&mut WorkflowContext, &AgentResult),
    {
        if !context.stages.contains_key(stage) {
            warn!("Stage {} is not part of run {}", stage, context.id);
            return AgentResult::error(format!("Stage {} is not in the pipeline", stage));
        }

        info!("Running stage: {}", stage);
        context.start_stage(stage, input.clone());
        self.store.checkpoint(context);

        let started = Instant::now();
        let mut result = match self.registry.get(stage) {
            None => {
                warn!("No handler registered for stage {}, skipping", stage);
                AgentResult::skipped(format!("No handler registered for stage {}", stage))
            }
            Some(handler) => {
                let request = HandlerRequest {
                    task: context.description.clone(),
                    input,
                    metadata: context.metadata.clone(),
                    workflow_id: context.id.clone(),
                    agent_name: stage.to_string(),
                };

                match AssertUnwindSafe(handler.handle(request)).catch_unwind().await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => AgentResult::error(e.to_string()),
                    Err(panic) => AgentResult::error(format!(
                        "Handler panicked: {}",
                        panic_message(panic.as_ref())
                    )),
                }
            }
        };
        result.duration = started.elapsed();

        match result.status {
            AgentStatus::Success => info!(
                "Stage {} completed in {}ms",
                stage,
                result.duration.as_millis()
            ),
            AgentStatus::Skipped => debug!("Stage {} skipped", stage),
            AgentStatus::Error => error!(
                "Stage {} failed: {}",
                stage,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }

        context.finish_stage(stage, &result);
        settle(context, &result);
        self.store.checkpoint(context);

        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
