//! Per-query scratchpad: an append-only JSONL journal plus the
//! in-memory counters that drive the soft per-tool call limits.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::error::Result;

const DEFAULT_MAX_CALLS_PER_TOOL: u32 = 3;
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScratchpadEntry {
    Init {
        timestamp: String,
        content: String,
    },
    Thinking {
        timestamp: String,
        content: String,
    },
    ToolResult {
        timestamp: String,
        tool_name: String,
        args: Value,
        result: Value,
        llm_summary: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct LimitConfig {
    pub max_calls_per_tool: u32,
    pub similarity_threshold: f64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_calls_per_tool: DEFAULT_MAX_CALLS_PER_TOOL,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Returned by `can_call_tool`: never blocks, only advises.
#[derive(Debug, Clone)]
pub struct ToolLimitCheck {
    pub warning: Option<String>,
}

impl ToolLimitCheck {
    fn none() -> Self {
        Self { warning: None }
    }
    fn warn(message: impl Into<String>) -> Self {
        Self { warning: Some(message.into()) }
    }
}

struct State {
    tool_call_counts: HashMap<String, u32>,
    tool_queries: HashMap<String, Vec<String>>,
    entries: Vec<ScratchpadEntry>,
}

pub struct Scratchpad {
    journal_path: PathBuf,
    limits: LimitConfig,
    state: RwLock<State>,
}

impl Scratchpad {
    /// Create a new scratchpad for `query`, writing the `init` entry
    /// immediately so the journal always starts with the triggering
    /// query even if the run crashes on the first tool call.
    pub async fn create(journal_path: PathBuf, query: &str, limits: LimitConfig) -> Result<Self> {
        let pad = Self {
            journal_path,
            limits,
            state: RwLock::new(State {
                tool_call_counts: HashMap::new(),
                tool_queries: HashMap::new(),
                entries: Vec::new(),
            }),
        };
        let entry = ScratchpadEntry::Init {
            timestamp: Utc::now().to_rfc3339(),
            content: query.to_string(),
        };
        pad.append_entry(entry).await?;
        Ok(pad)
    }

    async fn append_entry(&self, entry: ScratchpadEntry) -> Result<()> {
        {
            self.state.write().entries.push(entry.clone());
        }
        if let Some(parent) = self.journal_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    pub async fn add_thinking(&self, text: &str) -> Result<()> {
        self.append_entry(ScratchpadEntry::Thinking {
            timestamp: Utc::now().to_rfc3339(),
            content: text.to_string(),
        })
        .await
    }

    pub async fn add_tool_result(
        &self,
        tool_name: &str,
        args: Value,
        result: &str,
        llm_summary: &str,
    ) -> Result<()> {
        let decoded = serde_json::from_str(result).unwrap_or_else(|_| Value::String(result.to_string()));
        self.append_entry(ScratchpadEntry::ToolResult {
            timestamp: Utc::now().to_rfc3339(),
            tool_name: tool_name.to_string(),
            args,
            result: decoded,
            llm_summary: llm_summary.to_string(),
        })
        .await
    }

    /// Advisory-only limit check; never returns a blocking verdict.
    pub fn can_call_tool(&self, tool_name: &str, query: Option<&str>) -> ToolLimitCheck {
        let state = self.state.read();
        let count = state.tool_call_counts.get(tool_name).copied().unwrap_or(0);

        if count >= self.limits.max_calls_per_tool {
            return ToolLimitCheck::warn(format!(
                "Tool '{}' has been called {} times, at or over the suggested limit of {}.",
                tool_name, count, self.limits.max_calls_per_tool
            ));
        }

        if let Some(query) = query {
            if let Some(previous) = state.tool_queries.get(tool_name) {
                if let Some(similar) = find_similar(query, previous, self.limits.similarity_threshold) {
                    return ToolLimitCheck::warn(format!(
                        "Tool '{}' was already called with a similar query: \"{}\".",
                        tool_name, similar
                    ));
                }
            }
        }

        if count + 1 == self.limits.max_calls_per_tool {
            return ToolLimitCheck::warn(format!(
                "Tool '{}' is approaching its suggested limit of {} calls.",
                tool_name, self.limits.max_calls_per_tool
            ));
        }

        ToolLimitCheck::none()
    }

    pub fn record_tool_call(&self, tool_name: &str, query: Option<&str>) {
        let mut state = self.state.write();
        *state.tool_call_counts.entry(tool_name.to_string()).or_insert(0) += 1;
        if let Some(query) = query {
            state
                .tool_queries
                .entry(tool_name.to_string())
                .or_default()
                .push(query.to_string());
        }
    }

    pub fn tool_call_count(&self, tool_name: &str) -> u32 {
        self.state.read().tool_call_counts.get(tool_name).copied().unwrap_or(0)
    }

    pub fn tool_call_counts(&self) -> HashMap<String, u32> {
        self.state.read().tool_call_counts.clone()
    }

    /// True iff a `skill` tool call with `args.skill == skill_name` has
    /// already produced a recorded result this run.
    pub fn has_executed_skill(&self, skill_name: &str) -> bool {
        self.state.read().entries.iter().any(|entry| {
            matches!(entry, ScratchpadEntry::ToolResult { tool_name, args, .. }
                if tool_name == "skill" && args.get("skill").and_then(|v| v.as_str()) == Some(skill_name))
        })
    }

    pub fn has_any_tool_result(&self) -> bool {
        self.state
            .read()
            .entries
            .iter()
            .any(|e| matches!(e, ScratchpadEntry::ToolResult { .. }))
    }

    /// `(description, summary)` pairs, in journal order, for prompt text.
    pub fn get_tool_summaries(&self) -> Vec<(String, String)> {
        self.state
            .read()
            .entries
            .iter()
            .filter_map(|e| match e {
                ScratchpadEntry::ToolResult { tool_name, llm_summary, .. } => {
                    Some((tool_name.clone(), llm_summary.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn get_tool_call_records(&self) -> Vec<(String, Value, String)> {
        self.state
            .read()
            .entries
            .iter()
            .filter_map(|e| match e {
                ScratchpadEntry::ToolResult { tool_name, args, result, .. } => {
                    Some((tool_name.clone(), args.clone(), result_to_text(result)))
                }
                _ => None,
            })
            .collect()
    }

    /// Full contexts alongside their summaries, for the context compactor.
    pub fn get_full_contexts_with_summaries(&self) -> Vec<crate::context::CompactableResult> {
        self.state
            .read()
            .entries
            .iter()
            .filter_map(|e| match e {
                ScratchpadEntry::ToolResult { tool_name, args, result, llm_summary, .. } => {
                    Some(crate::context::CompactableResult {
                        tool_name: tool_name.clone(),
                        description: crate::context::store::ToolContextStore::tool_description(tool_name, args),
                        result: result_to_text(result),
                        summary: llm_summary.clone(),
                    })
                }
                _ => None,
            })
            .collect()
    }
}

fn result_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Exact string match counts as similar; otherwise Jaccard similarity of
/// lowercased word-tokens (length >= 2) at or above `threshold`.
fn find_similar<'a>(query: &str, previous: &'a [String], threshold: f64) -> Option<&'a str> {
    let query_norm = query.trim().to_lowercase();
    if previous.iter().any(|p| p.trim().to_lowercase() == query_norm) {
        return previous
            .iter()
            .find(|p| p.trim().to_lowercase() == query_norm)
            .map(|s| s.as_str());
    }

    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return None;
    }

    previous.iter().find(|prev| {
        let prev_tokens = tokenize(prev);
        jaccard(&query_tokens, &prev_tokens) >= threshold
    }).map(|s| s.as_str())
}

fn tokenize(text: &str) -> std::collections::HashSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() >= 2)
        .collect()
}

fn jaccard(a: &std::collections::HashSet<String>, b: &std::collections::HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_entry_is_written_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratchpad.jsonl");
        Scratchpad::create(path.clone(), "hello", LimitConfig::default()).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("\"type\":\"init\""));
    }

    #[tokio::test]
    async fn journal_round_trips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratchpad.jsonl");
        let pad = Scratchpad::create(path.clone(), "q", LimitConfig::default()).await.unwrap();
        pad.add_thinking("thinking about it").await.unwrap();
        pad.add_tool_result("search", serde_json::json!({"query": "x"}), "\"done\"", "summary").await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"init\""));
        assert!(lines[1].contains("\"thinking\""));
        assert!(lines[2].contains("\"tool_result\""));
    }

    #[tokio::test]
    async fn soft_limit_warns_but_never_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratchpad.jsonl");
        let limits = LimitConfig { max_calls_per_tool: 2, similarity_threshold: 0.7 };
        let pad = Scratchpad::create(path, "q", limits).await.unwrap();

        assert!(pad.can_call_tool("search", None).warning.is_none());
        pad.record_tool_call("search", None);
        assert!(pad.can_call_tool("search", None).warning.is_some()); // approaching
        pad.record_tool_call("search", None);
        assert!(pad.can_call_tool("search", None).warning.is_some()); // at/over
    }

    #[tokio::test]
    async fn exact_repeat_query_is_flagged_similar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratchpad.jsonl");
        let pad = Scratchpad::create(path, "q", LimitConfig::default()).await.unwrap();
        pad.record_tool_call("search", Some("rust async runtimes"));
        let check = pad.can_call_tool("search", Some("rust async runtimes"));
        assert!(check.warning.unwrap().contains("similar"));
    }

    #[tokio::test]
    async fn skill_dedup_detects_prior_execution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratchpad.jsonl");
        let pad = Scratchpad::create(path, "q", LimitConfig::default()).await.unwrap();
        assert!(!pad.has_executed_skill("dcf"));
        pad.add_tool_result("skill", serde_json::json!({"skill": "dcf"}), "\"ok\"", "s").await.unwrap();
        assert!(pad.has_executed_skill("dcf"));
    }

    #[test]
    fn jaccard_similarity_of_disjoint_sets_is_zero() {
        let a = tokenize("hello world");
        let b = tokenize("goodbye moon");
        assert_eq!(jaccard(&a, &b), 0.0);
    }
}
