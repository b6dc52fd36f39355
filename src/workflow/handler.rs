//! Stage handlers and the registry that maps stage names to them
//!
//! A [`Handler`] is the only integration point between the engine and the
//! agents that do the actual work. The engine never looks inside one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::state::Payload;
use crate::Result;

/// Request handed to a handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerRequest {
    /// Original task description
    pub task: String,
    /// Stage input (initial input or previous stage's output)
    pub input: Payload,
    /// Caller metadata for the run
    pub metadata: Payload,
    /// Run ID
    pub workflow_id: String,
    /// Name of the stage being executed
    pub agent_name: String,
}

/// Outcome reported by a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Error,
    Skipped,
}

/// Value a handler returns for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Outcome
    pub status: AgentStatus,
    /// Output; becomes part of the next stage's input
    #[serde(default)]
    pub data: Payload,
    /// Stage to jump to, skipping everything in between
    #[serde(default)]
    pub next: Option<String>,
    /// Error or skip message
    #[serde(default)]
    pub error: Option<String>,
    /// Wall time spent in the stage, measured by the executor.
    /// Encoded as fractional seconds.
    #[serde(default, with = "duration_secs")]
    pub duration: Duration,
}

impl AgentResult {
    /// Successful result carrying `data`
    pub fn success(data: Payload) -> Self {
        Self {
            status: AgentStatus::Success,
            data,
            next: None,
            error: None,
            duration: Duration::ZERO,
        }
    }

    /// Failed result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Error,
            data: Payload::new(),
            next: None,
            error: Some(message.into()),
            duration: Duration::ZERO,
        }
    }

    /// Skipped result with a reason
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Skipped,
            data: Payload::new(),
            next: None,
            error: Some(reason.into()),
            duration: Duration::ZERO,
        }
    }

    /// Jump to `stage` after this one
    pub fn with_next(mut self, stage: impl Into<String>) -> Self {
        self.next = Some(stage.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == AgentStatus::Error
    }
}

/// `Duration` as a number of seconds, e.g. `1.5`
mod duration_secs {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

/// Unit of work behind a stage.
///
/// Returning `Err` is equivalent to returning [`AgentResult::error`]; the
/// executor converts it, and a panic, into an error result.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: HandlerRequest) -> Result<AgentResult>;
}

/// Adapter that lets a plain closure act as a [`Handler`]
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(HandlerRequest) -> Result<AgentResult> + Send + Sync,
{
    async fn handle(&self, request: HandlerRequest) -> Result<AgentResult> {
        (self.0)(request)
    }
}

/// Stage name → handler
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("stages", &self.names())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a stage.
    ///
    /// Returns `true` if the stage had no handler before; an existing one is
    /// replaced.
    pub fn register(&mut self, stage: impl Into<String>, handler: Arc<dyn Handler>) -> bool {
        let stage = stage.into();
        debug!("Registering handler for stage {}", stage);

        let replaced = self.handlers.insert(stage.clone(), handler).is_some();
        if replaced {
            warn!("Handler for stage {} replaced", stage);
        }
        !replaced
    }

    /// Register a closure as the handler for a stage
    pub fn register_fn<F>(&mut self, stage: impl Into<String>, f: F) -> bool
    where
        F: Fn(HandlerRequest) -> Result<AgentResult> + Send + Sync + 'static,
    {
        self.register(stage, Arc::new(FnHandler(f)))
    }

    /// Remove a stage's handler; `true` if there was one
    pub fn unregister(&mut self, stage: &str) -> bool {
        self.handlers.remove(stage).is_some()
    }

    pub fn get(&self, stage: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(stage).cloned()
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.handlers.contains_key(stage)
    }

    /// Registered stage names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn request(stage: &str) -> HandlerRequest {
        HandlerRequest {
            task: "task".to_string(),
            input: Payload::new(),
            metadata: Payload::new(),
            workflow_id: "run-1".to_string(),
            agent_name: stage.to_string(),
        }
    }

    #[test]
    fn test_registry_register_replace_unregister() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.register_fn("build", |_| Ok(AgentResult::success(Payload::new()))));
        assert!(!registry.register_fn("build", |_| Ok(AgentResult::error("second"))));
        assert!(registry.register_fn("review", |_| Ok(AgentResult::skipped("n/a"))));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["build", "review"]);
        assert!(registry.contains("build"));

        assert!(registry.unregister("build"));
        assert!(!registry.unregister("build"));
        assert!(registry.get("build").is_none());
    }

    #[test]
    fn test_fn_handler_receives_request() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("echo", |req| {
            let mut data = Payload::new();
            data.insert("stage".to_string(), Value::String(req.agent_name));
            data.insert("run".to_string(), Value::String(req.workflow_id));
            Ok(AgentResult::success(data))
        });

        let handler = registry.get("echo").unwrap();
        let result = tokio_test::block_on(handler.handle(request("echo"))).unwrap();

        assert_eq!(result.status, AgentStatus::Success);
        assert_eq!(result.data["stage"], "echo");
        assert_eq!(result.data["run"], "run-1");
    }

    #[test]
    fn test_agent_result_deserializes_handler_shape() {
        let result: AgentResult =
            serde_json::from_str(r#"{"status": "success", "data": {"x": 1}, "next": "review"}"#)
                .unwrap();

        assert_eq!(result.status, AgentStatus::Success);
        assert_eq!(result.next.as_deref(), Some("review"));
        assert_eq!(result.duration, Duration::ZERO);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_duration_is_seconds_on_the_wire() {
        let mut result = AgentResult::error("lint failed");
        result.duration = Duration::from_millis(1500);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration"], 1.5);
        assert_eq!(json["status"], "error");

        let back: AgentResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);

        let whole: AgentResult =
            serde_json::from_str(r#"{"status": "success", "duration": 2}"#).unwrap();
        assert_eq!(whole.duration, Duration::from_secs(2));

        assert!(serde_json::from_str::<AgentResult>(r#"{"status": "success", "duration": -1}"#)
            .is_err());
    }
}
