//! Configuration loading and management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::workflow::store::DEFAULT_STATE_PATH;
use crate::{Error, Result};

/// Directory holding local configuration and state
pub const STAGEHAND_DIR: &str = ".stagehand";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Where the current run is checkpointed
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// JSON rule document overriding the built-in pipelines
    #[serde(default)]
    pub rules_path: Option<PathBuf>,

    /// How stages are scheduled
    #[serde(default)]
    pub mode: ExecutionMode,

    /// External programs backing stages, keyed by stage name
    #[serde(default)]
    pub handlers: BTreeMap<String, CommandHandlerConfig>,
}

fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_PATH)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            rules_path: None,
            mode: ExecutionMode::default(),
            handlers: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file or default locations
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(|| {
            // Try .stagehand/config.toml in current directory
            let local = PathBuf::from(STAGEHAND_DIR).join("config.toml");
            if local.exists() {
                return Some(local);
            }

            // Try ~/.stagehand/config.toml
            dirs::home_dir().map(|h| h.join(STAGEHAND_DIR).join("config.toml"))
        });

        match config_path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(&p)?;
                let config: EngineConfig = toml::from_str(&content)?;
                Ok(config)
            }
            Some(p) if path.is_some() => Err(Error::Config(format!(
                "Config file not found: {}",
                p.display()
            ))),
            _ => Ok(EngineConfig::default()),
        }
    }

    /// Checkpoint path with `~` and environment variables expanded
    pub fn state_path(&self) -> PathBuf {
        expand(&self.state_path)
    }

    /// Rule document path with `~` and environment variables expanded
    pub fn rules_path(&self) -> Option<PathBuf> {
        self.rules_path.as_deref().map(expand)
    }
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => path.to_path_buf(),
    }
}

/// External program configuration for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandHandlerConfig {
    /// Command line, shell-quoted
    pub command: String,

    /// Optional limit, e.g. "90s" or "5m"
    #[serde(default)]
    pub timeout: Option<String>,
}

/// Stage scheduling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One stage at a time, in pipeline order
    #[default]
    Sequential,
    /// Concurrent stages. Not supported: no scheduling semantics are defined.
    Parallel,
}

impl ExecutionMode {
    pub fn ensure_supported(self) -> Result<()> {
        match self {
            ExecutionMode::Sequential => Ok(()),
            ExecutionMode::Parallel => Err(Error::Unsupported(
                "parallel execution mode; stages run sequentially".to_string(),
            )),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => f.write_str("sequential"),
            ExecutionMode::Parallel => f.write_str("parallel"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sequential" | "seq" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            other => Err(Error::Config(format!("Unknown execution mode: {}", other))),
        }
    }
}

/// Initialize .stagehand directory with a default config
pub fn init(force: bool) -> Result<PathBuf> {
    let dir = PathBuf::from(STAGEHAND_DIR);
    std::fs::create_dir_all(&dir)?;

    let config_path = dir.join("config.toml");
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists, use --force to overwrite",
            config_path.display()
        )));
    }

    let content = toml::to_string_pretty(&EngineConfig::default())
        .map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(&config_path, content)?;

    Ok(config_path)
}
