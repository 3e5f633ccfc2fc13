//! Summarises tool results as they land and, at final-answer time,
//! decides under a fixed token budget which full results to inject into
//! the prompt versus which to keep as summaries only.

use serde_json::Value;

use crate::model::ModelCapability;

/// `tokens(text) ≈ len(text) / 4`, the same crude estimator the rest of
/// the runtime uses for budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4 + 1
}

pub const TOKEN_BUDGET: usize = 8000;

/// One tool result plus its one-line summary, ready for context assembly.
#[derive(Debug, Clone)]
pub struct CompactableResult {
    pub tool_name: String,
    pub description: String,
    pub result: String,
    pub summary: String,
}

impl CompactableResult {
    fn is_error(&self) -> bool {
        self.result.trim_start().starts_with("Error:")
    }

    fn token_cost(&self) -> usize {
        estimate_tokens(&self.result)
    }
}

/// Ask the fast model for a 1-2 sentence summary of a tool result,
/// focused on the originating query. Falls back to a truncated prefix of
/// the raw result on any model failure, so a summarisation outage never
/// aborts the run.
pub async fn summarize_result(model: &dyn ModelCapability, query: &str, result: &str) -> String {
    let system = "Summarize the following tool result in 1-2 sentences, focused on answering the user's query. Be concise.";
    let prompt = format!("Query: {}\n\nTool result:\n{}", query, truncate(result, 4000));
    match model.generate(system, &prompt, None).await {
        Ok(response) if !response.text.trim().is_empty() => response.text.trim().to_string(),
        _ => truncate(result, 200),
    }
}

/// Build the final-answer context block from the accumulated tool
/// results, honouring `TOKEN_BUDGET`.
pub async fn build_context(
    model: &dyn ModelCapability,
    query: &str,
    results: &[CompactableResult],
) -> String {
    let usable: Vec<&CompactableResult> = results.iter().filter(|r| !r.is_error()).collect();
    if usable.is_empty() {
        return "No data was successfully gathered.".to_string();
    }

    let total_tokens: usize = usable.iter().map(|r| r.token_cost()).sum();
    if total_tokens <= TOKEN_BUDGET {
        return render_full(&usable);
    }

    match select_with_budget(model, query, &usable).await {
        Some(rendered) => rendered,
        None => render_summaries_only(&usable),
    }
}

fn render_full(results: &[&CompactableResult]) -> String {
    results
        .iter()
        .map(|r| format!("### {}\n{}", r.description, pretty(&r.result)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_summaries_only(results: &[&CompactableResult]) -> String {
    let body = results
        .iter()
        .map(|r| format!("### {}\n{}", r.description, r.summary))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("## Data Summaries\n\n{}", body)
}

async fn select_with_budget(
    model: &dyn ModelCapability,
    query: &str,
    results: &[&CompactableResult],
) -> Option<String> {
    let catalogue: Vec<Value> = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            serde_json::json!({
                "index": i,
                "tool_name": r.tool_name,
                "summary": r.summary,
                "token_cost": r.token_cost(),
            })
        })
        .collect();

    let system = "Given a query and a catalogue of tool results, return a JSON array of the indices \
        most relevant to answering the query. Respond with ONLY a JSON array of integers.";
    let prompt = format!(
        "Query: {}\n\nResults:\n{}",
        query,
        serde_json::to_string_pretty(&catalogue).ok()?
    );

    let response = model.generate(system, &prompt, None).await.ok()?;
    let indices: Vec<usize> = serde_json::from_str(response.text.trim()).ok()?;

    let mut full_section = Vec::new();
    let mut running = 0usize;
    let mut summarized_indices = std::collections::HashSet::new();

    for &i in &indices {
        let Some(r) = results.get(i) else { continue };
        let cost = r.token_cost();
        if running + cost <= TOKEN_BUDGET {
            full_section.push(format!("### {}\n{}", r.description, pretty(&r.result)));
            running += cost;
            summarized_indices.insert(i);
        }
    }

    let summary_section: Vec<String> = results
        .iter()
        .enumerate()
        .filter(|(i, _)| !summarized_indices.contains(i))
        .map(|(_, r)| format!("- {}: {}", r.description, r.summary))
        .collect();

    let mut out = String::new();
    if !full_section.is_empty() {
        out.push_str("## Full Data\n\n");
        out.push_str(&full_section.join("\n\n"));
    }
    if !summary_section.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str("## Summary Data\n");
        out.push_str(&summary_section.join("\n"));
    }
    Some(out)
}

fn pretty(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max_chars).collect();
        format!("{}…", prefix)
    }
}
