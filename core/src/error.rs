//! Structured error types for the agent runtime.
//!
//! Provides type-safe error handling with rich context for debugging,
//! user-friendly messages, and retry policy.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Primary error type for agent runtime operations.
#[derive(Error, Debug)]
pub enum AgentError {
    // =========================================================================
    // Model Errors (fatal for the reasoning step)
    // =========================================================================
    #[error("model request failed: {message}")]
    ModelRequest { message: String },

    #[error("model returned malformed structured output: {reason}")]
    ModelMalformedOutput { reason: String },

    #[error("rate limit exceeded: {limit_type}")]
    RateLimitExceeded { limit_type: String },

    #[error("model {model} is at capacity")]
    ModelCapacity {
        model: String,
        retry_after: Option<Duration>,
    },

    // =========================================================================
    // Tool Errors (non-fatal; journalled and surfaced as ToolError events)
    // =========================================================================
    #[error("tool not found: {tool_name}")]
    ToolNotFound { tool_name: String },

    #[error("tool execution failed: {tool_name} - {error}")]
    ToolExecutionFailed { tool_name: String, error: String },

    #[error("tool timeout: {tool_name} after {duration:?}")]
    ToolTimeout { tool_name: String, duration: Duration },

    #[error("invalid tool arguments for {tool_name}: {reason}")]
    InvalidToolArguments { tool_name: String, reason: String },

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    #[error("session append failed for {session_key}")]
    SessionAppendFailed { session_key: String },

    #[error("session not found: {session_key}")]
    SessionNotFound { session_key: String },

    #[error("scratchpad journal write failed: {path}")]
    ScratchpadWriteFailed { path: PathBuf },

    #[error("scratchpad journal corrupted: {path} at line {line}")]
    ScratchpadCorrupted { path: PathBuf, line: usize },

    #[error("session history corrupted: {path} at line {line}")]
    SessionCorrupted { path: PathBuf, line: usize },

    #[error("context store write failed: {path}")]
    ContextWriteFailed { path: PathBuf },

    #[error("memory store write failed: {path}")]
    MemoryWriteFailed { path: PathBuf },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("missing required configuration: {key}")]
    MissingConfig { key: String },

    // =========================================================================
    // Input / Skill Errors
    // =========================================================================
    #[error("invalid session key: {raw}")]
    InvalidSessionKey { raw: String },

    #[error("skill not found: {name}")]
    SkillNotFound { name: String },

    #[error("invalid skill front matter in {path}: {reason}")]
    InvalidSkill { path: PathBuf, reason: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    // =========================================================================
    // Internal / wrapped errors
    // =========================================================================
    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),
}

impl AgentError {
    /// Whether a retry of the same operation is likely to succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } => true,
            Self::ModelCapacity { .. } => true,
            Self::ToolTimeout { .. } => true,
            Self::ModelRequest { .. } => true,

            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),

            Self::ModelMalformedOutput { .. }
            | Self::ToolNotFound { .. }
            | Self::ToolExecutionFailed { .. }
            | Self::InvalidToolArguments { .. }
            | Self::SessionAppendFailed { .. }
            | Self::SessionNotFound { .. }
            | Self::ScratchpadWriteFailed { .. }
            | Self::ScratchpadCorrupted { .. }
            | Self::SessionCorrupted { .. }
            | Self::ContextWriteFailed { .. }
            | Self::MemoryWriteFailed { .. }
            | Self::InvalidConfig { .. }
            | Self::MissingConfig { .. }
            | Self::InvalidSessionKey { .. }
            | Self::SkillNotFound { .. }
            | Self::InvalidSkill { .. }
            | Self::InvalidInput { .. }
            | Self::FileNotFound { .. }
            | Self::Internal { .. }
            | Self::Json(_) => false,
        }
    }

    /// Suggested delay before retrying, when `is_retryable()` is true.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { .. } => Some(Duration::from_secs(5)),
            Self::ModelCapacity { retry_after, .. } => *retry_after,
            Self::ModelRequest { .. } => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    /// A short message suitable to show directly to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimitExceeded { .. } => {
                "The model is rate-limited right now. Try again shortly.".to_string()
            }
            Self::ToolExecutionFailed { tool_name, .. } => {
                format!("Failed to execute tool '{}'.", tool_name)
            }
            Self::SkillNotFound { name } => format!("No skill named '{}' is available.", name),
            Self::InvalidConfig { .. } | Self::MissingConfig { .. } => {
                "The agent is misconfigured. Check your config file and environment.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return Self::Io(std::io::Error::new(io_err.kind(), io_err.to_string()));
        }
        Self::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Extension trait for converting `Option` to `Result<_, AgentError>`.
pub trait OptionExt<T> {
    fn ok_or_not_found(self, path: impl Into<PathBuf>) -> Result<T>;
    fn ok_or_missing(self, key: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, path: impl Into<PathBuf>) -> Result<T> {
        self.ok_or_else(|| AgentError::FileNotFound { path: path.into() })
    }

    fn ok_or_missing(self, key: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| AgentError::MissingConfig { key: key.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AgentError::RateLimitExceeded {
            limit_type: "requests".to_string()
        }
        .is_retryable());

        assert!(!AgentError::SkillNotFound {
            name: "dcf".to_string()
        }
        .is_retryable());

        assert!(!AgentError::InvalidConfig {
            message: "missing model".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_user_messages() {
        let err = AgentError::SkillNotFound {
            name: "dcf".to_string(),
        };
        assert!(err.user_message().contains("dcf"));
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_not_found("/tmp/test");
        assert!(matches!(result, Err(AgentError::FileNotFound { .. })));

        let opt: Option<i32> = None;
        let result = opt.ok_or_missing("api_key");
        assert!(matches!(result, Err(AgentError::MissingConfig { .. })));
    }
}
