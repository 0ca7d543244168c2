//! Client configuration and factory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizforge_core::model::default_engines;
use quizforge_core::persistence::{FileStore, RoundPersistence};
use quizforge_core::traits::QuestionService;

use crate::http::{HttpQuestionService, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};

/// Top-level quizforge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizforgeConfig {
    /// Base URL of the question service.
    #[serde(default = "default_service_url")]
    pub service_url: String,
    /// Per-request timeout. Generation fans out to several engines, so this
    /// is generous.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Where the last round and purged ids are kept between runs.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Engines used when a generate command names none.
    #[serde(default = "default_engines")]
    pub default_engines: BTreeSet<String>,
}

fn default_service_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_state_file() -> PathBuf {
    dirs_path()
        .map(|dir| dir.join("state.json"))
        .unwrap_or_else(|| PathBuf::from(".quizforge-state.json"))
}

impl Default for QuizforgeConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            timeout_secs: default_timeout_secs(),
            state_file: default_state_file(),
            default_engines: default_engines(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quizforge.toml` in the current directory
/// 2. `~/.config/quizforge/config.toml`
///
/// Environment variable overrides: `QUIZFORGE_SERVICE_URL`, `QUIZFORGE_STATE_FILE`.
pub fn load_config() -> Result<QuizforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizforgeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizforge.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<QuizforgeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            config
        }
        None => QuizforgeConfig::default(),
    };

    // Apply env var overrides
    if let Ok(url) = std::env::var("QUIZFORGE_SERVICE_URL") {
        config.service_url = url;
    }
    if let Ok(state_file) = std::env::var("QUIZFORGE_STATE_FILE") {
        config.state_file = PathBuf::from(state_file);
    }

    config.service_url = resolve_env_vars(&config.service_url);
    config.state_file = PathBuf::from(resolve_env_vars(&config.state_file.to_string_lossy()));

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizforge"))
}

/// The HTTP client for the service `config` points at.
pub fn create_http_client(config: &QuizforgeConfig) -> Result<HttpQuestionService> {
    HttpQuestionService::new(&config.service_url, config.timeout_secs)
        .with_context(|| format!("cannot use service_url {}", config.service_url))
}

/// Create the question service client described by `config`.
pub fn create_service(config: &QuizforgeConfig) -> Result<Arc<dyn QuestionService>> {
    Ok(Arc::new(create_http_client(config)?))
}

/// Round persistence backed by the configured state file.
pub fn open_persistence(config: &QuizforgeConfig) -> RoundPersistence {
    RoundPersistence::new(Arc::new(FileStore::new(&config.state_file)))
}

/// Render `config` as the contents of a `quizforge.toml`.
pub fn render_config(config: &QuizforgeConfig) -> Result<String> {
    toml::to_string_pretty(config).context("failed to serialize config")
}
