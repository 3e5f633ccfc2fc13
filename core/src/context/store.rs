//! Content-addressed on-disk cache of tool invocations.
//!
//! One file per `(tool_name, args)` pair; the filename is derived from a
//! hash of the canonicalized arguments so repeat calls with identical
//! arguments overwrite rather than accumulate.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::util::content_hash;

pub use crate::util::hash_query;

/// A lightweight reference to a saved context file, kept in memory for
/// the lifetime of one run so later stages (selection, summarisation)
/// don't need to re-scan the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPointer {
    pub filepath: PathBuf,
    pub filename: String,
    pub tool_name: String,
    pub args: Value,
    pub tool_description: String,
    pub task_id: Option<String>,
    pub query_id: Option<String>,
    pub source_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextData {
    pub tool_name: String,
    pub tool_description: String,
    pub args: Value,
    pub timestamp_utc: String,
    pub task_id: Option<String>,
    pub query_id: Option<String>,
    pub source_urls: Option<Vec<String>>,
    pub result: Value,
}

pub struct ToolContextStore {
    base_dir: PathBuf,
    pointers: RwLock<Vec<Arc<ContextPointer>>>,
}

impl ToolContextStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            pointers: RwLock::new(Vec::new()),
        }
    }

    fn args_hash(args: &Value) -> String {
        content_hash(args)
    }

    fn filename_for(tool_name: &str, args: &Value) -> String {
        format!("{}_{}.json", tool_name, Self::args_hash(args))
    }

    /// Render a human-readable label for `(tool_name, args)`: prefers a
    /// `query`/date-range phrasing, falls back to `[k=v, ...]`.
    pub fn tool_description(tool_name: &str, args: &Value) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut consumed: Vec<&str> = Vec::new();

        if let Some(query) = args.get("query").and_then(|v| v.as_str()) {
            parts.push(query.to_string());
            consumed.push("query");
        }

        if let (Some(start), Some(end)) = (
            args.get("start_date").and_then(|v| v.as_str()),
            args.get("end_date").and_then(|v| v.as_str()),
        ) {
            parts.push(format!("from {} to {}", start, end));
            consumed.push("start_date");
            consumed.push("end_date");
        }

        if let Value::Object(map) = args {
            let remainder: Vec<String> = map
                .iter()
                .filter(|(k, _)| !consumed.contains(&k.as_str()))
                .map(|(k, v)| format!("{}={}", k, compact_value(v)))
                .collect();
            if !remainder.is_empty() {
                parts.push(format!("[{}]", remainder.join(", ")));
            }
        }

        if parts.is_empty() {
            tool_name.to_string()
        } else {
            parts.join(" ")
        }
    }

    /// Persist a tool result. If `result` parses as JSON and carries a
    /// top-level `source_urls` array, it is hoisted onto the record and
    /// the stored result becomes the remaining `data` field (or the full
    /// object, when there is no `data` field).
    pub async fn save(
        &self,
        tool_name: &str,
        args: Value,
        result: &str,
        task_id: Option<String>,
        query_id: Option<String>,
    ) -> Result<Arc<ContextPointer>> {
        let tool_description = Self::tool_description(tool_name, &args);
        let (source_urls, stored_result) = split_source_urls(result);

        let record = ContextData {
            tool_name: tool_name.to_string(),
            tool_description: tool_description.clone(),
            args: args.clone(),
            timestamp_utc: Utc::now().to_rfc3339(),
            task_id: task_id.clone(),
            query_id: query_id.clone(),
            source_urls: source_urls.clone(),
            result: stored_result,
        };

        tokio::fs::create_dir_all(&self.base_dir).await?;
        let filename = Self::filename_for(tool_name, &args);
        let filepath = self.base_dir.join(&filename);
        let body = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&filepath, body).await?;

        let pointer = Arc::new(ContextPointer {
            filepath,
            filename,
            tool_name: tool_name.to_string(),
            args,
            tool_description,
            task_id,
            query_id,
            source_urls,
        });
        self.pointers.write().push(pointer.clone());
        Ok(pointer)
    }

    pub fn all_pointers(&self) -> Vec<Arc<ContextPointer>> {
        self.pointers.read().clone()
    }

    pub fn pointers_for_query(&self, query_id: &str) -> Vec<Arc<ContextPointer>> {
        self.pointers
            .read()
            .iter()
            .filter(|p| p.query_id.as_deref() == Some(query_id))
            .cloned()
            .collect()
    }

    /// Load the full `ContextData` for a set of filepaths, silently
    /// skipping any that no longer exist on disk.
    pub async fn load_contexts(&self, filepaths: &[PathBuf]) -> Result<Vec<ContextData>> {
        let mut out = Vec::with_capacity(filepaths.len());
        for path in filepaths {
            match tokio::fs::read_to_string(path).await {
                Ok(contents) => out.push(serde_json::from_str(&contents)?),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(out)
    }
}

fn compact_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn split_source_urls(result: &str) -> (Option<Vec<String>>, Value) {
    let Ok(parsed) = serde_json::from_str::<Value>(result) else {
        return (None, Value::String(result.to_string()));
    };
    let Some(obj) = parsed.as_object() else {
        return (None, parsed);
    };
    let source_urls = obj
        .get("source_urls")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect());

    if source_urls.is_none() {
        return (None, parsed);
    }

    let data = obj.get("data").cloned().unwrap_or(parsed.clone());
    (source_urls, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ToolContextStore::new(dir.path());
        let args = json!({"query": "rust async"});

        let p1 = store.save("search", args.clone(), "\"ok\"", None, None).await.unwrap();
        let p2 = store.save("search", args.clone(), "\"ok2\"", None, None).await.unwrap();

        assert_eq!(p1.filename, p2.filename);
        let contents = tokio::fs::read_to_string(&p2.filepath).await.unwrap();
        assert!(contents.contains("ok2"));
    }

    #[tokio::test]
    async fn save_extracts_source_urls() {
        let dir = tempfile::tempdir().unwrap();
        let store = ToolContextStore::new(dir.path());
        let result = json!({"data": {"answer": 42}, "source_urls": ["https://a", "https://b"]}).to_string();

        let pointer = store
            .save("search", json!({"query": "x"}), &result, None, Some("q1".into()))
            .await
            .unwrap();

        assert_eq!(
            pointer.source_urls,
            Some(vec!["https://a".to_string(), "https://b".to_string()])
        );
        let loaded = store.load_contexts(&[pointer.filepath.clone()]).await.unwrap();
        assert_eq!(loaded[0].result, json!({"answer": 42}));
    }

    #[test]
    fn tool_description_prefers_query_then_dates_then_remainder() {
        let args = json!({"query": "weather", "units": "metric"});
        assert_eq!(
            ToolContextStore::tool_description("forecast", &args),
            "weather [units=metric]"
        );

        let args = json!({"start_date": "2026-01-01", "end_date": "2026-01-31"});
        assert_eq!(
            ToolContextStore::tool_description("range", &args),
            "from 2026-01-01 to 2026-01-31"
        );
    }

    #[tokio::test]
    async fn load_contexts_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ToolContextStore::new(dir.path());
        let missing = dir.path().join("gone.json");
        let loaded = store.load_contexts(&[missing]).await.unwrap();
        assert!(loaded.is_empty());
    }
}
