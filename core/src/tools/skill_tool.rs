//! The `skill` meta-tool: bridges the skill registry into the tool
//! registry so the model can invoke a skill like any other tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::skills::SkillRegistry;
use crate::tools::Tool;

const SKILL_TOOL_DESCRIPTION: &str = "Invoke a named skill to get detailed instructions for a specialized task. \
Use this when the available skills list names something matching the user's request. \
Do not invoke the same skill twice in one run; its instructions don't change between calls. \
Pass `args` as a short string of extra parameters the skill's instructions say it accepts, if any.";

pub struct SkillTool {
    registry: Arc<SkillRegistry>,
}

impl SkillTool {
    pub fn new(registry: Arc<SkillRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        "skill"
    }

    fn description(&self) -> &str {
        SKILL_TOOL_DESCRIPTION
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "skill": {"type": "string", "description": "name of the skill to invoke"},
                "args": {"type": "string", "description": "optional extra arguments for the skill"},
            },
            "required": ["skill"],
        })
    }

    async fn call(&self, args: &Value) -> Result<String> {
        let name = args
            .get("skill")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::InvalidToolArguments {
                tool_name: self.name().to_string(),
                reason: "missing `skill` argument".to_string(),
            })?;

        let skill = self.registry.get(name).await?;

        let mut out = format!("## Skill: {}\n\n", skill.name);
        if let Some(extra) = args.get("args").and_then(|v| v.as_str()) {
            if !extra.is_empty() {
                out.push_str(&format!("Arguments: {}\n\n", extra));
            }
        }
        out.push_str(&skill.instructions);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::SkillRegistry;
    use std::path::PathBuf;

    async fn registry_with_skill(dir: &std::path::Path) -> Arc<SkillRegistry> {
        let skill_dir = dir.join("dcf");
        tokio::fs::create_dir_all(&skill_dir).await.unwrap();
        tokio::fs::write(
            skill_dir.join("SKILL.md"),
            "---\nname: dcf\ndescription: discounted cash flow\n---\nDo the math.",
        )
        .await
        .unwrap();
        Arc::new(SkillRegistry::new(
            dir.to_path_buf(),
            PathBuf::from("/nonexistent-user"),
            PathBuf::from("/nonexistent-project"),
        ))
    }

    #[tokio::test]
    async fn invokes_skill_and_returns_instructions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_skill(dir.path()).await;
        let tool = SkillTool::new(registry);

        let out = tool.call(&serde_json::json!({"skill": "dcf"})).await.unwrap();
        assert!(out.contains("Do the math."));
    }

    #[tokio::test]
    async fn missing_skill_argument_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_skill(dir.path()).await;
        let tool = SkillTool::new(registry);
        assert!(tool.call(&serde_json::json!({})).await.is_err());
    }
}
