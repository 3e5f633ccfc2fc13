//! The typed progress events a running query emits.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One completed tool invocation, as surfaced in the terminal `Done` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub args: Value,
    pub result: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Thinking {
        message: String,
    },
    ToolStart {
        tool: String,
        args: Value,
    },
    ToolEnd {
        tool: String,
        args: Value,
        result: String,
        duration_ms: u64,
    },
    ToolError {
        tool: String,
        error: String,
    },
    ToolLimit {
        tool: String,
        warning: String,
        blocked: bool,
    },
    AnswerStart,
    Done {
        answer: String,
        tool_calls: Vec<ToolCallRecord>,
        iterations: u32,
    },
}
