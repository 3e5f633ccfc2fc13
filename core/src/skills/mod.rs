//! Markdown-front-matter skills, discovered from three directories in
//! precedence order (builtin < user < project) and addressed by name
//! through the `skill` meta-tool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillSource {
    Builtin,
    User,
    Project,
}

#[derive(Debug, Clone)]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    pub source: SkillSource,
}

#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub triggers: Vec<String>,
    pub instructions: String,
    pub resources: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SkillFrontmatter {
    name: String,
    description: String,
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    tools: Option<Vec<String>>,
}

/// Parse a `SKILL.md` body: YAML front matter delimited by `---` lines,
/// then free-text instructions.
fn parse_skill_file(contents: &str, path: &Path) -> Result<(SkillFrontmatter, String)> {
    let rest = contents.strip_prefix("---").ok_or_else(|| AgentError::InvalidSkill {
        path: path.to_path_buf(),
        reason: "missing front matter opening delimiter".to_string(),
    })?;
    let close = rest.find("\n---").ok_or_else(|| AgentError::InvalidSkill {
        path: path.to_path_buf(),
        reason: "unclosed front matter".to_string(),
    })?;
    let yaml = &rest[..close];
    let instructions = rest[close + 4..].trim_start_matches('\n').trim().to_string();

    let frontmatter: SkillFrontmatter =
        serde_yml::from_str(yaml).map_err(|e| AgentError::InvalidSkill {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok((frontmatter, instructions))
}

async fn load_resources(skill_dir: &Path) -> HashMap<String, String> {
    let mut resources = HashMap::new();
    for sub in ["templates", "scripts"] {
        let dir = skill_dir.join(sub);
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Ok(contents) = tokio::fs::read_to_string(entry.path()).await {
                if let Some(name) = entry.file_name().to_str() {
                    resources.insert(format!("{}/{}", sub, name), contents);
                }
            }
        }
    }
    resources
}

async fn load_skill_from_path(dir: &Path) -> Result<Skill> {
    let skill_file = dir.join("SKILL.md");
    let contents = tokio::fs::read_to_string(&skill_file).await?;
    let (frontmatter, instructions) = parse_skill_file(&contents, &skill_file)?;
    let resources = load_resources(dir).await;
    Ok(Skill {
        name: frontmatter.name,
        description: frontmatter.description,
        triggers: frontmatter.triggers,
        instructions,
        resources,
    })
}

async fn scan_directory(dir_path: &Path, source: SkillSource) -> Vec<SkillMetadata> {
    let Ok(mut entries) = tokio::fs::read_dir(dir_path).await else { return Vec::new() };
    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let skill_file = path.join("SKILL.md");
        if !skill_file.exists() {
            continue;
        }
        let Ok(contents) = tokio::fs::read_to_string(&skill_file).await else { continue };
        if let Ok((frontmatter, _)) = parse_skill_file(&contents, &skill_file) {
            found.push(SkillMetadata {
                name: frontmatter.name,
                description: frontmatter.description,
                path,
                source,
            });
        }
    }
    found
}

/// Discovers and caches skill metadata from the three standard
/// directories, builtin first so user and project skills can override
/// it by name. The cache is process-wide and lazily populated; call
/// `clear_cache` to force a rescan (tests, or a directory changing
/// underneath a long-running process).
pub struct SkillRegistry {
    directories: Vec<(PathBuf, SkillSource)>,
    cache: RwLock<Option<HashMap<String, SkillMetadata>>>,
}

impl SkillRegistry {
    pub fn new(builtin_dir: PathBuf, user_dir: PathBuf, project_dir: PathBuf) -> Self {
        Self {
            directories: vec![
                (builtin_dir, SkillSource::Builtin),
                (user_dir, SkillSource::User),
                (project_dir, SkillSource::Project),
            ],
            cache: RwLock::new(None),
        }
    }

    /// Standard layout: builtin skills ship with the binary (passed in
    /// by the caller), user skills live in `~/.dexter/skills`, project
    /// skills in `./.dexter/skills`.
    pub fn standard(builtin_dir: PathBuf) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(builtin_dir, home.join(".dexter/skills"), cwd.join(".dexter/skills"))
    }

    pub async fn discover(&self) -> Vec<SkillMetadata> {
        if let Some(cached) = self.cache.read().as_ref() {
            return cached.values().cloned().collect();
        }

        let mut by_name = HashMap::new();
        for (dir, source) in &self.directories {
            for metadata in scan_directory(dir, *source).await {
                by_name.insert(metadata.name.clone(), metadata);
            }
        }
        let values: Vec<SkillMetadata> = by_name.values().cloned().collect();
        *self.cache.write() = Some(by_name);
        values
    }

    pub async fn get(&self, name: &str) -> Result<Skill> {
        if self.cache.read().is_none() {
            self.discover().await;
        }
        let path = self
            .cache
            .read()
            .as_ref()
            .and_then(|c| c.get(name))
            .map(|m| m.path.clone())
            .ok_or_else(|| AgentError::SkillNotFound { name: name.to_string() })?;
        load_skill_from_path(&path).await
    }

    /// `"- **name**: description"` bullet list for system-prompt injection.
    pub async fn build_metadata_section(&self) -> String {
        let skills = self.discover().await;
        if skills.is_empty() {
            return "No skills available.".to_string();
        }
        let mut sorted = skills;
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted
            .iter()
            .map(|s| format!("- **{}**: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear_cache(&self) {
        *self.cache.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_skill(dir: &Path, name: &str, description: &str, instructions: &str) {
        let skill_dir = dir.join(name);
        tokio::fs::create_dir_all(&skill_dir).await.unwrap();
        let body = format!(
            "---\nname: {}\ndescription: {}\n---\n{}",
            name, description, instructions
        );
        tokio::fs::write(skill_dir.join("SKILL.md"), body).await.unwrap();
    }

    #[tokio::test]
    async fn discovers_skill_from_builtin_dir() {
        let builtin = tempfile::tempdir().unwrap();
        write_skill(builtin.path(), "dcf", "discounted cash flow", "do the math").await;

        let registry = SkillRegistry::new(
            builtin.path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
        );

        let skills = registry.discover().await;
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "dcf");
    }

    #[tokio::test]
    async fn project_overrides_builtin_by_name() {
        let builtin = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        write_skill(builtin.path(), "dcf", "builtin version", "old").await;
        write_skill(project.path(), "dcf", "project version", "new").await;

        let registry = SkillRegistry::new(
            builtin.path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
            project.path().to_path_buf(),
        );

        let skill = registry.get("dcf").await.unwrap();
        assert_eq!(skill.description, "project version");
        assert_eq!(skill.instructions, "new");
    }

    #[tokio::test]
    async fn get_missing_skill_errors() {
        let registry = SkillRegistry::new(
            tempfile::tempdir().unwrap().path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
        );
        assert!(registry.get("nope").await.is_err());
    }

    #[tokio::test]
    async fn clear_cache_forces_rescan() {
        let builtin = tempfile::tempdir().unwrap();
        let registry = SkillRegistry::new(
            builtin.path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
        );
        assert!(registry.discover().await.is_empty());

        write_skill(builtin.path(), "new_skill", "desc", "body").await;
        assert!(registry.discover().await.is_empty()); // still cached

        registry.clear_cache();
        assert_eq!(registry.discover().await.len(), 1);
    }

    #[test]
    fn parse_skill_file_rejects_missing_delimiter() {
        let err = parse_skill_file("no frontmatter here", Path::new("x/SKILL.md")).unwrap_err();
        assert!(matches!(err, AgentError::InvalidSkill { .. }));
    }
}
