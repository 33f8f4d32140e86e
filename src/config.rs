//! Configuration for hablaflow processes.
//!
//! Configuration sources (highest priority first):
//! 1. CLI flags (applied by the caller on top of the resolved config)
//! 2. Environment variables (HABLA_HOME, HABLA_ORCHESTRATOR_ADDRESS,
//!    HABLA_TASK_QUEUE, OPENAI_API_KEY, OPENAI_BASE_URL, OPENAI_MODEL,
//!    SUPABASE_URL, SUPABASE_SERVICE_ROLE_KEY)
//! 3. Config file (.hablaflow/config.yaml)
//! 4. Defaults (~/.hablaflow)
//!
//! Config file discovery:
//! - Searches current directory and parents for .hablaflow/config.yaml
//! - Paths in config file are relative to the .hablaflow/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::adapters::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use crate::core::ActivityOptions;

/// Task queue served by default
pub const DEFAULT_TASK_QUEUE: &str = "content-generation";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Missing or unusable required settings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {name} (set {env} or the config file)")]
    Missing {
        name: &'static str,
        env: &'static str,
    },

    #[error("Invalid configuration for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub activities: Option<ActivityOptions>,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrchestratorSection {
    pub address: Option<String>,
    pub task_queue: Option<String>,
    pub max_concurrent_executions: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub lease_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSection {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSection {
    /// Local games database (relative to .hablaflow/)
    pub path: Option<String>,
    pub supabase_url: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to hablaflow home (local state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub orchestrator: OrchestratorSettings,
    pub provider: ProviderSettings,
    /// Options for every activity call made by the workflows
    pub activities: ActivityOptions,
    /// Local SQLite games database
    pub games_db: PathBuf,
    /// Supabase project, when both URL and service key are set
    pub supabase: Option<SupabaseSettings>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub address: String,
    pub task_queue: String,
    pub max_concurrent_executions: usize,
    pub poll_interval: Duration,
    pub lease: Duration,
}

#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Clone)]
pub struct SupabaseSettings {
    pub url: String,
    pub service_key: String,
}

impl std::fmt::Debug for SupabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseSettings")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .finish()
    }
}

impl ResolvedConfig {
    /// Check the settings a client needs
    pub fn require_client(&self) -> Result<(), ConfigError> {
        require(
            &self.orchestrator.address,
            "orchestrator address",
            "HABLA_ORCHESTRATOR_ADDRESS",
        )?;
        require(
            &self.orchestrator.task_queue,
            "task queue",
            "HABLA_TASK_QUEUE",
        )?;
        Ok(())
    }

    /// Check the settings a worker needs, returning the provider API key
    pub fn require_worker(&self) -> Result<&str, ConfigError> {
        self.require_client()?;

        let api_key = self.provider.api_key.as_deref().unwrap_or_default();
        require(api_key, "provider API key", "OPENAI_API_KEY")?;

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::Invalid {
                name: "provider temperature",
                message: format!("{} is outside 0.0..=2.0", self.provider.temperature),
            });
        }

        Ok(api_key)
    }
}

fn require(value: &str, name: &'static str, env: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing { name, env })
    } else {
        Ok(())
    }
}

/// Find config file by searching a directory and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".hablaflow").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration by searching from `start` and reading variables
/// through `env` instead of the process environment
pub fn load_config_with<E>(start: Option<&Path>, env: E) -> Result<ResolvedConfig>
where
    E: Fn(&str) -> Option<String>,
{
    let config_file = start.and_then(find_config_file);
    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    // Relative paths in the file are relative to .hablaflow/
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));

    let home = match (env("HABLA_HOME"), file.home.as_deref()) {
        (Some(env_home), _) => PathBuf::from(env_home),
        (None, Some(home)) => resolve_path(config_dir, home),
        (None, None) => dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".hablaflow"),
    };

    let orchestrator = OrchestratorSettings {
        address: env("HABLA_ORCHESTRATOR_ADDRESS")
            .or(file.orchestrator.address)
            .unwrap_or_else(|| format!("sqlite://{}", home.join("executions.db").display())),
        task_queue: env("HABLA_TASK_QUEUE")
            .or(file.orchestrator.task_queue)
            .unwrap_or_else(|| DEFAULT_TASK_QUEUE.to_string()),
        max_concurrent_executions: file.orchestrator.max_concurrent_executions.unwrap_or(10),
        poll_interval: Duration::from_millis(file.orchestrator.poll_interval_ms.unwrap_or(500)),
        lease: Duration::from_millis(file.orchestrator.lease_ms.unwrap_or(30_000)),
    };

    let provider = ProviderSettings {
        api_key: env("OPENAI_API_KEY"),
        base_url: env("OPENAI_BASE_URL")
            .or(file.provider.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        model: env("OPENAI_MODEL")
            .or(file.provider.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        temperature: file.provider.temperature.unwrap_or(DEFAULT_TEMPERATURE),
    };

    let games_db = file
        .store
        .path
        .as_deref()
        .map(|p| resolve_path(config_dir, p))
        .unwrap_or_else(|| home.join("games.db"));

    let supabase = match (
        env("SUPABASE_URL").or(file.store.supabase_url),
        env("SUPABASE_SERVICE_ROLE_KEY"),
    ) {
        (Some(url), Some(service_key)) => Some(SupabaseSettings { url, service_key }),
        _ => None,
    };

    Ok(ResolvedConfig {
        home,
        config_file,
        orchestrator,
        provider,
        activities: file.activities.unwrap_or_default(),
        games_db,
        supabase,
    })
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().ok();
    load_config_with(cwd.as_deref(), env_var)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
