//! The `Model` capability: the agent runtime's only seam onto an LLM.
//!
//! `ModelCapability` is deliberately tiny — `generate` (chat + optional
//! tool declarations) and `generate_structured` (JSON-schema-constrained
//! output) — so the driver never has to know which provider it's
//! talking to. `OpenAiCompatibleModel` is the one concrete adapter this
//! crate ships, talking to any OpenAI-compatible chat-completions
//! endpoint; swapping in another provider means implementing the trait,
//! not touching the driver.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::util::{sanitize_base_url, validate_api_key};

/// A tool declaration passed to the model so it can emit calls against it.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One tool call the model asked the driver to perform.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

/// The model's answer to one `generate` call.
#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait ModelCapability: Send + Sync {
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        tools: Option<&[ToolSpec]>,
    ) -> Result<GenerateResponse>;

    async fn generate_structured(&self, system: &str, prompt: &str, schema: &Value) -> Result<Value>;
}

/// Minimal adapter to an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleModel {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleModel {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let base_url = sanitize_base_url(base_url, "base_url")
            .map_err(|e| AgentError::InvalidConfig { message: e.to_string() })?;
        let api_key = validate_api_key(api_key)
            .map_err(|e| AgentError::InvalidConfig { message: e.to_string() })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::ModelRequest { message: e.to_string() })?;

        Ok(Self {
            http,
            base_url,
            api_key,
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn chat(&self, body: Value) -> Result<Value> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ModelRequest { message: e.to_string() })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AgentError::RateLimitExceeded {
                limit_type: "requests".to_string(),
            });
        }
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(AgentError::ModelCapacity {
                model: self.model.clone(),
                retry_after: None,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::ModelRequest {
                message: format!("http {}: {}", status.as_u16(), body),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AgentError::ModelMalformedOutput { reason: e.to_string() })
    }
}

#[async_trait]
impl ModelCapability for OpenAiCompatibleModel {
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        tools: Option<&[ToolSpec]>,
    ) -> Result<GenerateResponse> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });

        if let Some(tools) = tools {
            let declared: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(declared);
        }

        let response = self.chat(body).await?;
        parse_chat_response(&response)
    }

    async fn generate_structured(&self, system: &str, prompt: &str, schema: &Value) -> Result<Value> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "response_format": {"type": "json_object"},
        });
        let _ = schema; // informational only for providers without strict schema support
        let response = self.chat(body).await?;
        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AgentError::ModelMalformedOutput {
                reason: "missing message content".to_string(),
            })?;
        serde_json::from_str(content).map_err(|e| AgentError::ModelMalformedOutput {
            reason: e.to_string(),
        })
    }
}

fn parse_chat_response(response: &Value) -> Result<GenerateResponse> {
    let message = &response["choices"][0]["message"];
    let text = message["content"].as_str().unwrap_or_default().to_string();

    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    let name = c["function"]["name"].as_str()?.to_string();
                    let raw_args = c["function"]["arguments"].as_str().unwrap_or("{}");
                    let args = serde_json::from_str(raw_args).unwrap_or(Value::Null);
                    Some(ToolCall { name, args })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(GenerateResponse { text, tool_calls })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_only_response() {
        let raw = serde_json::json!({
            "choices": [{"message": {"content": "hi", "tool_calls": Value::Null}}]
        });
        let parsed = parse_chat_response(&raw).unwrap();
        assert_eq!(parsed.text, "hi");
        assert!(parsed.tool_calls.is_empty());
    }

    #[test]
    fn parses_tool_call_response() {
        let raw = serde_json::json!({
            "choices": [{"message": {
                "content": Value::Null,
                "tool_calls": [{"function": {"name": "list_files", "arguments": "{\"path\":\".\"}"}}]
            }}]
        });
        let parsed = parse_chat_response(&raw).unwrap();
        assert_eq!(parsed.text, "");
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "list_files");
    }
}
