//! The iteration driver: the bounded reason/act loop that ties every
//! other component together into one query.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use futures::Stream;
use serde_json::Value;

use crate::context::{self, CompactableResult, ToolContextStore};
use crate::events::{AgentEvent, ToolCallRecord};
use crate::memory::{MemorySource, MemoryStore};
use crate::model::ModelCapability;
use crate::scratchpad::{LimitConfig, Scratchpad};
use crate::session::store::{Message, Role, SessionStore};
use crate::tools::ToolRegistry;

const MAX_HISTORY_MESSAGES: usize = 10;
const HISTORY_TRUNCATE_CHARS: usize = 200;
const MEMORY_MIN_ANSWER_LEN: usize = 50;
const QUERY_KEYS: [&str; 6] = ["query", "search", "question", "q", "text", "input"];

pub struct DriverConfig {
    pub max_iterations: u32,
    pub scratchpad_dir: PathBuf,
    pub limits: LimitConfig,
}

pub struct AgentDriver {
    sessions: Arc<SessionStore>,
    contexts: Arc<ToolContextStore>,
    memory: Arc<MemoryStore>,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelCapability>,
    fast_model: Arc<dyn ModelCapability>,
    config: DriverConfig,
}

impl AgentDriver {
    pub fn new(
        sessions: Arc<SessionStore>,
        contexts: Arc<ToolContextStore>,
        memory: Arc<MemoryStore>,
        tools: Arc<ToolRegistry>,
        model: Arc<dyn ModelCapability>,
        fast_model: Arc<dyn ModelCapability>,
        config: DriverConfig,
    ) -> Self {
        Self {
            sessions,
            contexts,
            memory,
            tools,
            model,
            fast_model,
            config,
        }
    }

    /// Drive one query to completion, yielding events as they occur.
    /// The stream always ends in exactly one `Done`, except when the
    /// reasoning step itself fails, in which case the stream ends
    /// without a `Done` and the caller should treat stream exhaustion
    /// with no `Done` as a fatal run.
    pub fn run(
        self: Arc<Self>,
        query: String,
        session_key: Option<String>,
    ) -> Pin<Box<dyn Stream<Item = AgentEvent> + Send>> {
        Box::pin(stream! {
            if self.tools.is_empty() {
                yield AgentEvent::Done {
                    answer: "No tools available to process this request.".to_string(),
                    tool_calls: vec![],
                    iterations: 0,
                };
                return;
            }

            let session_key = session_key
                .map(|k| crate::session::key::resolve(None, None, Some(&k)))
                .unwrap_or_else(|| crate::session::key::resolve(None, None, None));
            let query_id = context::hash_query(&query);

            let scratchpad = match Scratchpad::create(
                self.config.scratchpad_dir.join(format!("{}.jsonl", query_id)),
                &query,
                self.config.limits,
            )
            .await
            {
                Ok(pad) => pad,
                Err(_) => {
                    yield AgentEvent::Done {
                        answer: "Failed to initialize this query's scratchpad.".to_string(),
                        tool_calls: vec![],
                        iterations: 0,
                    };
                    return;
                }
            };

            let history = self.sessions.load(&session_key).await.unwrap_or_default();
            let memory_snippets = self.memory.search(&query, 5).await.unwrap_or_default();

            if self
                .sessions
                .append(&session_key, Message::text(Role::User, query.clone()))
                .await
                .is_err()
            {
                yield AgentEvent::Done {
                    answer: "Failed to persist the incoming message.".to_string(),
                    tool_calls: vec![],
                    iterations: 0,
                };
                return;
            }

            let system_prompt = "You are a tool-using assistant. Call tools when you need information, \
                respond with plain text when you have the answer.";

            let mut current_prompt = build_initial_prompt(&query, &history, &memory_snippets);
            let mut iteration: u32 = 0;
            let mut tool_calls_seen: Vec<ToolCallRecord> = Vec::new();

            loop {
                iteration += 1;
                let tool_specs = self.tools.specs();
                let response = match self.model.generate(system_prompt, &current_prompt, Some(&tool_specs)).await {
                    Ok(r) => r,
                    Err(_) => return, // fatal: reasoning step failed, no Done emitted.
                };

                if !response.text.trim().is_empty() && !response.tool_calls.is_empty() {
                    let _ = scratchpad.add_thinking(&response.text).await;
                    yield AgentEvent::Thinking { message: response.text.clone() };
                }

                if response.tool_calls.is_empty() {
                    let answer = if !scratchpad.has_any_tool_result() {
                        response.text
                    } else {
                        let context_block = build_full_context(&self.fast_model, &query, &scratchpad).await;
                        let final_prompt = format!("{}\n\n## Gathered Context\n{}", current_prompt, context_block);
                        match self.model.generate(system_prompt, &final_prompt, None).await {
                            Ok(r) => r.text,
                            Err(_) => return,
                        }
                    };
                    yield AgentEvent::AnswerStart;
                    self.finalize(&session_key, &query, &answer, &scratchpad).await;
                    yield AgentEvent::Done { answer, tool_calls: tool_calls_seen, iterations: iteration };
                    return;
                }

                for call in &response.tool_calls {
                    if call.name == "skill" {
                        if let Some(skill_name) = call.args.get("skill").and_then(|v| v.as_str()) {
                            if scratchpad.has_executed_skill(skill_name) {
                                continue;
                            }
                        }
                    }

                    let query_key = extract_query_key(&call.args);
                    let check = scratchpad.can_call_tool(&call.name, query_key.as_deref());
                    if let Some(warning) = check.warning {
                        yield AgentEvent::ToolLimit { tool: call.name.clone(), warning, blocked: false };
                    }

                    yield AgentEvent::ToolStart { tool: call.name.clone(), args: call.args.clone() };
                    let start = Instant::now();
                    let Some(tool) = self.tools.get(&call.name) else {
                        let error = format!("tool not found: {}", call.name);
                        yield AgentEvent::ToolError { tool: call.name.clone(), error: error.clone() };
                        let summary = context::summarize_result(self.fast_model.as_ref(), &query, &format!("Error: {}", error)).await;
                        let _ = scratchpad.add_tool_result(&call.name, call.args.clone(), &format!("Error: {}", error), &summary).await;
                        scratchpad.record_tool_call(&call.name, query_key.as_deref());
                        continue;
                    };

                    match tool.call(&call.args).await {
                        Ok(result) => {
                            let duration_ms = start.elapsed().as_millis() as u64;
                            yield AgentEvent::ToolEnd {
                                tool: call.name.clone(),
                                args: call.args.clone(),
                                result: result.clone(),
                                duration_ms,
                            };
                            tool_calls_seen.push(ToolCallRecord {
                                tool: call.name.clone(),
                                args: call.args.clone(),
                                result: result.clone(),
                            });
                            let _ = self.contexts.save(&call.name, call.args.clone(), &result, None, Some(query_id.clone())).await;
                            let summary = context::summarize_result(self.fast_model.as_ref(), &query, &result).await;
                            let _ = scratchpad.add_tool_result(&call.name, call.args.clone(), &result, &summary).await;
                        }
                        Err(err) => {
                            let message = err.to_string();
                            yield AgentEvent::ToolError { tool: call.name.clone(), error: message.clone() };
                            let summary = context::summarize_result(self.fast_model.as_ref(), &query, &format!("Error: {}", message)).await;
                            let _ = scratchpad.add_tool_result(&call.name, call.args.clone(), &format!("Error: {}", message), &summary).await;
                        }
                    }
                    scratchpad.record_tool_call(&call.name, query_key.as_deref());
                }

                current_prompt = rebuild_prompt(&query, &scratchpad, self.config.limits.max_calls_per_tool);

                if iteration >= self.config.max_iterations {
                    let context_block = build_full_context(&self.fast_model, &query, &scratchpad).await;
                    let final_prompt = format!(
                        "{}\n\n## Gathered Context\n{}\n\nReached maximum iterations ({}). Provide the best answer you can.",
                        current_prompt, context_block, self.config.max_iterations
                    );
                    let answer = match self.model.generate(system_prompt, &final_prompt, None).await {
                        Ok(r) => r.text,
                        Err(_) => format!("Reached maximum iterations ({}).", self.config.max_iterations),
                    };
                    yield AgentEvent::AnswerStart;
                    self.finalize(&session_key, &query, &answer, &scratchpad).await;
                    yield AgentEvent::Done { answer, tool_calls: tool_calls_seen, iterations: iteration };
                    return;
                }
            }
        })
    }

    async fn finalize(&self, session_key: &str, query: &str, answer: &str, scratchpad: &Scratchpad) {
        let _ = self
            .sessions
            .append(session_key, Message::text(Role::Assistant, answer.to_string()))
            .await;

        if scratchpad.has_any_tool_result() && answer.chars().count() > MEMORY_MIN_ANSWER_LEN {
            let truncated_answer: String = answer.chars().take(500).collect();
            let content = format!("Q: {}\nA: {}", query, truncated_answer);
            let mut tags = vec!["qa".to_string(), "conversation".to_string()];
            for (tool_name, _) in scratchpad.get_tool_summaries().into_iter().take(5) {
                tags.push(format!("tool:{}", tool_name));
            }
            let _ = self.memory.add(&content, MemorySource::Agent, tags).await;
        }
    }
}

async fn build_full_context(model: &Arc<dyn ModelCapability>, query: &str, scratchpad: &Scratchpad) -> String {
    let results: Vec<CompactableResult> = scratchpad.get_full_contexts_with_summaries();
    context::build_context(model.as_ref(), query, &results).await
}

fn extract_query_key(args: &Value) -> Option<String> {
    QUERY_KEYS
        .iter()
        .find_map(|key| args.get(*key).and_then(|v| v.as_str()).map(str::to_string))
}

fn build_initial_prompt(
    query: &str,
    history: &[Message],
    memory_snippets: &[crate::memory::MemorySearchResult],
) -> String {
    let mut prompt = format!("Query: {}", query);

    if !history.is_empty() {
        prompt.push_str("\n\n## Conversation History\n");
        let recent = &history[history.len().saturating_sub(MAX_HISTORY_MESSAGES)..];
        for message in recent {
            let label = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            let text = truncate(&message.plain_text(), HISTORY_TRUNCATE_CHARS);
            prompt.push_str(&format!("{}: {}\n", label, text));
        }
    }

    if !memory_snippets.is_empty() {
        prompt.push_str("\n\n## Relevant Context from Memory\n");
        for snippet in memory_snippets {
            prompt.push_str(&format!("- {}\n", snippet.snippet));
        }
    }

    prompt
}

fn rebuild_prompt(query: &str, scratchpad: &Scratchpad, max_calls_per_tool: u32) -> String {
    let mut prompt = format!("Query: {}", query);

    let summaries = scratchpad.get_tool_summaries();
    if !summaries.is_empty() {
        prompt.push_str("\n\n## Tool Results So Far\n");
        for (tool_name, summary) in &summaries {
            prompt.push_str(&format!("- {}: {}\n", tool_name, summary));
        }
    }

    let counts = scratchpad.tool_call_counts();
    if !counts.is_empty() {
        prompt.push_str("\n\n## Tool Usage\n");
        for (tool_name, count) in &counts {
            if *count >= max_calls_per_tool {
                prompt.push_str(&format!(
                    "- {}: {} calls [over suggested limit of {}]\n",
                    tool_name, count, max_calls_per_tool
                ));
            } else {
                prompt.push_str(&format!("- {}: {} calls\n", tool_name, count));
            }
        }
        prompt.push_str("(Advisory: avoid repeating calls beyond the suggested per-tool limit.)\n");
    }

    prompt
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max_chars).collect();
        format!("{}…", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ToolContextStore;
    use crate::error::Result;
    use crate::memory::MemoryStore;
    use crate::model::{GenerateResponse, ToolCall, ToolSpec};
    use crate::session::store::SessionStore;
    use crate::tools::builtin::ListFilesTool;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        calls: AtomicUsize,
        responses: Vec<GenerateResponse>,
    }

    #[async_trait]
    impl ModelCapability for ScriptedModel {
        async fn generate(&self, _s: &str, _p: &str, _t: Option<&[ToolSpec]>) -> Result<GenerateResponse> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses.get(i).cloned().unwrap_or(GenerateResponse {
                text: "done".to_string(),
                tool_calls: vec![],
            }))
        }
        async fn generate_structured(&self, _s: &str, _p: &str, _schema: &Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn driver_with(model_responses: Vec<GenerateResponse>, dir: &std::path::Path) -> Arc<AgentDriver> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ListFilesTool));

        let model = Arc::new(ScriptedModel { calls: AtomicUsize::new(0), responses: model_responses });
        Arc::new(AgentDriver::new(
            Arc::new(SessionStore::new(dir.join("sessions"))),
            Arc::new(ToolContextStore::new(dir.join("context"))),
            Arc::new(MemoryStore::new(dir.join("memory"))),
            Arc::new(registry),
            model.clone(),
            model,
            DriverConfig {
                max_iterations: 10,
                scratchpad_dir: dir.join("scratchpad"),
                limits: LimitConfig::default(),
            },
        ))
    }

    #[tokio::test]
    async fn greeting_with_no_tool_calls_terminates_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver_with(
            vec![GenerateResponse { text: "Hi!".to_string(), tool_calls: vec![] }],
            dir.path(),
        );

        let events: Vec<AgentEvent> = driver.run("hello".to_string(), None).collect().await;
        assert!(matches!(events.last(), Some(AgentEvent::Done { iterations: 1, .. })));
        assert!(matches!(events[0], AgentEvent::AnswerStart));
    }

    #[tokio::test]
    async fn no_tools_registered_yields_immediate_done() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ToolRegistry::new());
        let model = Arc::new(ScriptedModel { calls: AtomicUsize::new(0), responses: vec![] });
        let driver = Arc::new(AgentDriver::new(
            Arc::new(SessionStore::new(dir.path().join("sessions"))),
            Arc::new(ToolContextStore::new(dir.path().join("context"))),
            Arc::new(MemoryStore::new(dir.path().join("memory"))),
            registry,
            model.clone(),
            model,
            DriverConfig { max_iterations: 10, scratchpad_dir: dir.path().join("scratchpad"), limits: LimitConfig::default() },
        ));

        let events: Vec<AgentEvent> = driver.run("hi".to_string(), None).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], AgentEvent::Done { iterations: 0, .. }));
    }

    #[tokio::test]
    async fn tool_call_then_final_answer() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver_with(
            vec![
                GenerateResponse {
                    text: String::new(),
                    tool_calls: vec![ToolCall { name: "list_files".to_string(), args: serde_json::json!({"path": "."}) }],
                },
                GenerateResponse { text: "here is the listing".to_string(), tool_calls: vec![] },
                GenerateResponse { text: "final answer based on listing".to_string(), tool_calls: vec![] },
            ],
            dir.path(),
        );

        let events: Vec<AgentEvent> = driver.run("list files".to_string(), None).collect().await;
        assert!(events.iter().any(|e| matches!(e, AgentEvent::ToolStart { tool, .. } if tool == "list_files")));
        assert!(events.iter().any(|e| matches!(e, AgentEvent::ToolEnd { .. })));
        assert!(matches!(events.last(), Some(AgentEvent::Done { .. })));
    }
}
