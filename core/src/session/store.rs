//! Append-only session history, one JSONL file per session key.
//!
//! Lazy directory creation, atomic append writes, and a memory-first
//! cache; history is a write-once sequence of messages, so there's no
//! need for a debounced checkpoint writer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One piece of structured message content. Most messages are a single
/// `Text` block; assistant turns that invoked tools carry `ToolUse`
/// blocks alongside the text, and the following turn carries the
/// matching `ToolResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { name: String, args: serde_json::Value },
    ToolResult { name: String, result: String },
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub timestamp_ms: i64,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Flattened plain-text view, joining all `Text` blocks.
    pub fn plain_text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct SessionStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Vec<Message>>>>,
}

impl SessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn path_for(&self, session_key: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.jsonl", urlencoding::encode(session_key)))
    }

    /// Legacy path kept for migration: older versions replaced any
    /// character outside `[a-zA-Z0-9_-]` with `_` instead of URL-encoding.
    fn legacy_path_for(&self, session_key: &str) -> PathBuf {
        let sanitized: String = session_key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base_dir.join(format!("{}.jsonl", sanitized))
    }

    /// Load history for `session_key`, memory cache first, disk on miss.
    pub async fn load(&self, session_key: &str) -> Result<Arc<Vec<Message>>> {
        if let Some(hit) = self.cache.read().get(session_key).cloned() {
            return Ok(hit);
        }

        let primary = self.path_for(session_key);
        let messages = match tokio::fs::read_to_string(&primary).await {
            Ok(contents) => parse_jsonl(&contents, &primary)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let legacy = self.legacy_path_for(session_key);
                match tokio::fs::read_to_string(&legacy).await {
                    Ok(contents) => parse_jsonl(&contents, &legacy)?,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                    Err(err) => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        };

        let arc = Arc::new(messages);
        self.cache.write().insert(session_key.to_string(), arc.clone());
        Ok(arc)
    }

    /// Cache-only read; empty when the session has not been loaded yet.
    pub fn get(&self, session_key: &str) -> Arc<Vec<Message>> {
        self.cache
            .read()
            .get(session_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Append one message to both the cache and the on-disk log.
    pub async fn append(&self, session_key: &str, message: Message) -> Result<()> {
        {
            let mut cache = self.cache.write();
            let entry = cache
                .entry(session_key.to_string())
                .or_insert_with(|| Arc::new(Vec::new()));
            let mut updated = (**entry).clone();
            updated.push(message.clone());
            *entry = Arc::new(updated);
        }

        tokio::fs::create_dir_all(&self.base_dir).await?;
        let path = self.path_for(session_key);
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|_| AgentError::SessionAppendFailed {
                session_key: session_key.to_string(),
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|_| AgentError::SessionAppendFailed {
                session_key: session_key.to_string(),
            })?;
        Ok(())
    }

    /// Drop the cache entry and delete both the current and legacy files.
    pub async fn clear(&self, session_key: &str) -> Result<()> {
        self.cache.write().remove(session_key);
        for path in [self.path_for(session_key), self.legacy_path_for(session_key)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// URL-decoded stems of every `*.jsonl` file in the base directory.
    pub async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(decoded) = urlencoding::decode(stem) {
                    sessions.push(decoded.into_owned());
                }
            }
        }
        Ok(sessions)
    }
}

fn parse_jsonl(contents: &str, path: &Path) -> Result<Vec<Message>> {
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(line_no, line)| {
            serde_json::from_str(line).map_err(|_| AgentError::SessionCorrupted {
                path: path.to_path_buf(),
                line: line_no + 1,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let key = "agent:main:main";

        store.append(key, Message::text(Role::User, "hello")).await.unwrap();
        store
            .append(key, Message::text(Role::Assistant, "hi there"))
            .await
            .unwrap();

        // Fresh store, same directory: forces a disk read.
        let reloaded = SessionStore::new(dir.path());
        let messages = reloaded.load(key).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].plain_text(), "hello");
        assert_eq!(messages[1].plain_text(), "hi there");
    }

    #[tokio::test]
    async fn cache_reflects_appends_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store
            .append("agent:main:main", Message::text(Role::User, "q"))
            .await
            .unwrap();
        assert_eq!(store.get("agent:main:main").len(), 1);
    }

    #[tokio::test]
    async fn clear_removes_cache_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let key = "agent:main:main";
        store.append(key, Message::text(Role::User, "q")).await.unwrap();
        store.clear(key).await.unwrap();
        assert_eq!(store.get(key).len(), 0);
        let reloaded = store.load(key).await.unwrap();
        assert_eq!(reloaded.len(), 0);
    }

    #[tokio::test]
    async fn list_sessions_returns_decoded_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store
            .append("agent:main:main", Message::text(Role::User, "q"))
            .await
            .unwrap();
        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions, vec!["agent:main:main".to_string()]);
    }
}
