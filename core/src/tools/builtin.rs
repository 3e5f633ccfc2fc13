//! Thin built-in tools so the driver has something real to dispatch
//! against. Bodies are intentionally simple — the built-in tool set
//! itself is not the point of this crate, the driver that schedules
//! them is.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::tools::Tool;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }
    fn description(&self) -> &str {
        "Read the contents of a file at a given path."
    }
    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
        })
    }
    async fn call(&self, args: &Value) -> Result<String> {
        let path = arg_str(args, "path")?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed {
                tool_name: self.name().to_string(),
                error: e.to_string(),
            })
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }
    fn description(&self) -> &str {
        "Write (overwrite) a file with the given contents, creating parent directories as needed."
    }
    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
            "required": ["path", "content"],
        })
    }
    async fn call(&self, args: &Value) -> Result<String> {
        let path = arg_str(args, "path")?;
        let content = arg_str(args, "content")?;
        if let Some(parent) = std::path::Path::new(&path).parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| AgentError::ToolExecutionFailed {
                tool_name: self.name().to_string(),
                error: e.to_string(),
            })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed {
                tool_name: self.name().to_string(),
                error: e.to_string(),
            })?;
        Ok(format!("wrote {} bytes to {}", content.len(), path))
    }
}

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }
    fn description(&self) -> &str {
        "Replace the first occurrence of `find` with `replace` in a file."
    }
    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "find": {"type": "string"},
                "replace": {"type": "string"},
            },
            "required": ["path", "find", "replace"],
        })
    }
    async fn call(&self, args: &Value) -> Result<String> {
        let path = arg_str(args, "path")?;
        let find = arg_str(args, "find")?;
        let replace = arg_str(args, "replace")?;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed {
                tool_name: self.name().to_string(),
                error: e.to_string(),
            })?;
        let Some(pos) = contents.find(&find) else {
            return Err(AgentError::ToolExecutionFailed {
                tool_name: self.name().to_string(),
                error: "pattern not found".to_string(),
            });
        };
        let updated = format!("{}{}{}", &contents[..pos], replace, &contents[pos + find.len()..]);
        tokio::fs::write(&path, updated).await.map_err(|e| AgentError::ToolExecutionFailed {
            tool_name: self.name().to_string(),
            error: e.to_string(),
        })?;
        Ok(format!("edited {}", path))
    }
}

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }
    fn description(&self) -> &str {
        "List entries of a directory, non-recursively."
    }
    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"],
        })
    }
    async fn call(&self, args: &Value) -> Result<String> {
        let path = arg_str(args, "path")?;
        let mut entries = tokio::fs::read_dir(&path).await.map_err(|e| AgentError::ToolExecutionFailed {
            tool_name: self.name().to_string(),
            error: e.to_string(),
        })?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| AgentError::ToolExecutionFailed {
            tool_name: self.name().to_string(),
            error: e.to_string(),
        })? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names.join("\n"))
    }
}

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }
    fn description(&self) -> &str {
        "Search a file's lines for a literal substring."
    }
    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "pattern": {"type": "string"}},
            "required": ["path", "pattern"],
        })
    }
    async fn call(&self, args: &Value) -> Result<String> {
        let path = arg_str(args, "path")?;
        let pattern = arg_str(args, "pattern")?;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed {
                tool_name: self.name().to_string(),
                error: e.to_string(),
            })?;
        let matches: Vec<String> = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains(&pattern))
            .map(|(i, line)| format!("{}:{}", i + 1, line))
            .collect();
        Ok(matches.join("\n"))
    }
}

pub struct ExecTool;

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }
    fn description(&self) -> &str {
        "Run a shell command and return its combined stdout/stderr."
    }
    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"command": {"type": "string"}},
            "required": ["command"],
        })
    }
    async fn call(&self, args: &Value) -> Result<String> {
        let command = arg_str(args, "command")?;
        let parts = shell_words::split(&command).map_err(|e| AgentError::InvalidToolArguments {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;
        let Some((program, rest)) = parts.split_first() else {
            return Err(AgentError::InvalidToolArguments {
                tool_name: self.name().to_string(),
                reason: "empty command".to_string(),
            });
        };
        let output = tokio::process::Command::new(program)
            .args(rest)
            .output()
            .await
            .map_err(|e| AgentError::ToolExecutionFailed {
                tool_name: self.name().to_string(),
                error: e.to_string(),
            })?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }
}

fn arg_str(args: &Value, key: &str) -> Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| AgentError::InvalidToolArguments {
            tool_name: key.to_string(),
            reason: format!("missing string argument `{}`", key),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let path_str = path.to_string_lossy().to_string();

        WriteFileTool
            .call(&serde_json::json!({"path": path_str, "content": "hello"}))
            .await
            .unwrap();
        let read = ReadFileTool.call(&serde_json::json!({"path": path_str})).await.unwrap();
        assert_eq!(read, "hello");
    }

    #[tokio::test]
    async fn edit_replaces_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let path_str = path.to_string_lossy().to_string();
        tokio::fs::write(&path, "foo bar foo").await.unwrap();

        EditFileTool
            .call(&serde_json::json!({"path": path_str, "find": "foo", "replace": "baz"}))
            .await
            .unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "baz bar foo");
    }

    #[tokio::test]
    async fn grep_reports_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let path_str = path.to_string_lossy().to_string();
        tokio::fs::write(&path, "one\ntwo\nthree two").await.unwrap();

        let out = GrepTool
            .call(&serde_json::json!({"path": path_str, "pattern": "two"}))
            .await
            .unwrap();
        assert_eq!(out, "2:two\n3:three two");
    }

    #[tokio::test]
    async fn exec_runs_a_command() {
        let out = ExecTool.call(&serde_json::json!({"command": "echo hi"})).await.unwrap();
        assert!(out.contains("hi"));
    }
}
