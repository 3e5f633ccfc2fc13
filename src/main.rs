//! `dexter` - a bounded reason/act LLM agent runtime.
//!
//! Thin CLI: parse a query, build the runtime's collaborators from
//! `Config`, drive one query to completion, and print each event as it
//! arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;

use dexter_core::{
    AgentDriver, AgentEvent, Config, DriverConfig, MemoryStore, OpenAiCompatibleModel,
    SessionStore, SkillRegistry, ToolContextStore, ToolRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "dexter", version, about = "A bounded reason/act LLM agent runtime")]
struct Cli {
    /// The query to run.
    query: String,

    /// Session key to continue (defaults to the main thread of the default agent).
    #[arg(long)]
    session_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;
    let _logger_guard = dexter_core::logger::init(&config.log_config());

    let api_key = std::env::var("MYLM_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .context("no API key set (MYLM_API_KEY or OPENAI_API_KEY)")?;
    let base_url = std::env::var("MYLM_BASE_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let model: Arc<dyn dexter_core::ModelCapability> =
        Arc::new(OpenAiCompatibleModel::new(&base_url, &api_key, &config.model)?);
    let fast_model: Arc<dyn dexter_core::ModelCapability> = match &config.fast_model {
        Some(fast) => Arc::new(OpenAiCompatibleModel::new(&base_url, &api_key, fast)?),
        None => model.clone(),
    };

    let sessions = Arc::new(SessionStore::new(config.sessions_dir()));
    let contexts = Arc::new(ToolContextStore::new(config.context_dir()));
    let memory = Arc::new(MemoryStore::new(config.memory_dir()));

    let skills = Arc::new(SkillRegistry::standard(config.base_dir.join("builtin_skills")));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(dexter_core::tools::builtin::ReadFileTool));
    registry.register(Arc::new(dexter_core::tools::builtin::WriteFileTool));
    registry.register(Arc::new(dexter_core::tools::builtin::EditFileTool));
    registry.register(Arc::new(dexter_core::tools::builtin::ListFilesTool));
    registry.register(Arc::new(dexter_core::tools::builtin::GrepTool));
    registry.register(Arc::new(dexter_core::tools::builtin::ExecTool));
    registry.register(Arc::new(dexter_core::tools::skill_tool::SkillTool::new(skills)));
    let tools = Arc::new(registry);

    let driver = Arc::new(AgentDriver::new(
        sessions,
        contexts,
        memory,
        tools,
        model,
        fast_model,
        DriverConfig {
            max_iterations: config.max_iterations,
            scratchpad_dir: config.scratchpad_dir(),
            limits: config.limit_config(),
        },
    ));

    let mut events = driver.run(cli.query, cli.session_key);
    while let Some(event) = events.next().await {
        match &event {
            AgentEvent::Done { answer, .. } => {
                println!("{}", serde_json::to_string(&event)?);
                println!("{}", answer);
            }
            _ => println!("{}", serde_json::to_string(&event)?),
        }
    }

    Ok(())
}
