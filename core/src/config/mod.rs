//! Layered configuration: compiled-in defaults < `mylm.toml` < environment
//! variables, resolved against the platform config directory via `dirs`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::logger::{FileRotation, LogConfig, LogMode};
use crate::scratchpad::LimitConfig;

const DEFAULT_MAX_ITERATIONS: u32 = 10;
const DEFAULT_BASE_DIR: &str = ".mini-agent";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub model_provider: String,
    pub fast_model: Option<String>,
    pub max_iterations: u32,
    pub base_dir: PathBuf,
    pub max_calls_per_tool: u32,
    pub similarity_threshold: f64,

    pub log_level: String,
    pub log_mode: String,
    pub log_dir: Option<PathBuf>,
    pub log_rotation: String,
    pub log_retention: usize,
    pub log_compression: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            model_provider: "openai-compatible".to_string(),
            fast_model: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            max_calls_per_tool: 3,
            similarity_threshold: 0.7,
            log_level: "info".to_string(),
            log_mode: "development".to_string(),
            log_dir: None,
            log_rotation: "daily".to_string(),
            log_retention: 7,
            log_compression: false,
        }
    }
}

impl Config {
    /// Assemble the effective config: defaults, then an optional TOML
    /// file (`mylm.toml` in the cwd, else the platform config dir),
    /// then environment variables.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = find_config_file() {
            let contents = std::fs::read_to_string(&path)?;
            let from_file: Config = toml::from_str(&contents)
                .map_err(|e| AgentError::InvalidConfig { message: e.to_string() })?;
            config = from_file;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MYLM_MODEL") {
            self.model = v;
        }
        if let Ok(v) = std::env::var("MYLM_MODEL_PROVIDER") {
            self.model_provider = v;
        }
        if let Ok(v) = std::env::var("MYLM_FAST_MODEL") {
            self.fast_model = Some(v);
        }
        if let Ok(v) = std::env::var("MYLM_MAX_ITERATIONS") {
            if let Ok(n) = v.parse() {
                self.max_iterations = n;
            }
        }
        if let Ok(v) = std::env::var("MYLM_BASE_DIR") {
            self.base_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("LOG_MODE") {
            self.log_mode = v;
        }
        if let Ok(v) = std::env::var("LOG_DIR") {
            self.log_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("LOG_ROTATION") {
            self.log_rotation = v;
        }
        if let Ok(v) = std::env::var("LOG_RETENTION") {
            if let Ok(n) = v.parse() {
                self.log_retention = n;
            }
        }
        if let Ok(v) = std::env::var("LOG_COMPRESSION") {
            self.log_compression = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.base_dir.join("sessions")
    }

    pub fn context_dir(&self) -> PathBuf {
        self.base_dir.join("context")
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.base_dir.join("memory")
    }

    pub fn scratchpad_dir(&self) -> PathBuf {
        self.base_dir.join("scratchpad")
    }

    pub fn limit_config(&self) -> LimitConfig {
        LimitConfig {
            max_calls_per_tool: self.max_calls_per_tool,
            similarity_threshold: self.similarity_threshold,
        }
    }

    pub fn log_config(&self) -> LogConfig {
        let mode = self.log_mode.parse().unwrap_or(LogMode::Development);
        let rotation = self.log_rotation.parse().unwrap_or(FileRotation::Daily);
        LogConfig {
            level: self.log_level.clone(),
            mode,
            dir: self.log_dir.clone(),
            rotation,
            retention: self.log_retention,
            compression: self.log_compression,
        }
    }
}

/// `./mylm.toml`, else `<platform config dir>/mylm/mylm.toml`.
fn find_config_file() -> Option<PathBuf> {
    let local = Path::new("mylm.toml");
    if local.exists() {
        return Some(local.to_path_buf());
    }
    let dir = get_config_dir();
    let candidate = dir.join("mylm.toml");
    candidate.exists().then_some(candidate)
}

/// `dirs::config_dir()/mylm`, falling back to `~/.config/mylm`.
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| home::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mylm")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.base_dir, PathBuf::from(".mini-agent"));
        assert_eq!(config.max_calls_per_tool, 3);
    }

    #[test]
    fn sub_dirs_fan_out_from_base_dir() {
        let config = Config {
            base_dir: PathBuf::from("/tmp/x"),
            ..Config::default()
        };
        assert_eq!(config.sessions_dir(), PathBuf::from("/tmp/x/sessions"));
        assert_eq!(config.context_dir(), PathBuf::from("/tmp/x/context"));
        assert_eq!(config.memory_dir(), PathBuf::from("/tmp/x/memory"));
    }
}
