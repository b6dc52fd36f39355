//! Handlers backed by external programs
//!
//! The program receives the [`HandlerRequest`] as JSON on stdin and may print
//! an [`AgentResult`] as JSON on stdout. Anything else it prints is kept as
//! `{"stdout": ...}`.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::handler::{AgentResult, Handler, HandlerRegistry, HandlerRequest};
use super::state::Payload;
use crate::config::CommandHandlerConfig;
use crate::{EngineConfig, Error, Result};

/// Runs a program for each invocation
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandHandler {
    /// Parse a command line (shell-quoted) into a handler
    pub fn new(command: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut words = shell_words::split(command)
            .map_err(|e| Error::Config(format!("Invalid command {:?}: {}", command, e)))?;
        if words.is_empty() {
            return Err(Error::Config("Handler command is empty".to_string()));
        }
        let program = words.remove(0);

        Ok(Self {
            program,
            args: words,
            timeout,
        })
    }

    pub fn from_config(config: &CommandHandlerConfig) -> Result<Self> {
        let timeout = config
            .timeout
            .as_deref()
            .map(humantime::parse_duration)
            .transpose()
            .map_err(|e| Error::Config(format!("Invalid handler timeout: {}", e)))?;
        Self::new(&config.command, timeout)
    }

    async fn invoke(&self, request: &HandlerRequest) -> Result<AgentResult> {
        let payload = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Handler(format!("Failed to start {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // a program that ignores its input may close stdin early
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("{} did not read its input: {}", self.program, e);
            }
        }

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(AgentResult::error(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_output(stdout.trim()))
    }
}

#[async_trait]
impl Handler for CommandHandler {
    async fn handle(&self, request: HandlerRequest) -> Result<AgentResult> {
        debug!("Running {} for stage {}", self.program, request.agent_name);

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.invoke(&request)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("{} timed out after {:?}", self.program, limit);
                    Ok(AgentResult::error(format!(
                        "{} timed out after {}",
                        self.program,
                        humantime::format_duration(limit)
                    )))
                }
            },
            None => self.invoke(&request).await,
        }
    }
}

fn parse_output(stdout: &str) -> AgentResult {
    if let Ok(result) = serde_json::from_str::<AgentResult>(stdout) {
        return result;
    }

    let mut data = Payload::new();
    if !stdout.is_empty() {
        data.insert("stdout".to_string(), Value::String(stdout.to_string()));
    }
    AgentResult::success(data)
}

/// Registry with one [`CommandHandler`] per configured stage
pub fn registry_from_config(config: &EngineConfig) -> Result<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    for (stage, handler) in &config.handlers {
        registry.register(stage.clone(), Arc::new(CommandHandler::from_config(handler)?));
    }
    Ok(registry)
}
