//! `agentmesh`: run the hub, run a text worker, or plan a request.

mod config;

use agentmesh_agent::{
    AgentConfig, AgentRuntime, HttpOrchestratorClient, InstructionHandler, TextProcessor,
};
use agentmesh_core::RegisterRequest;
use agentmesh_gateway::{format_agent_context, AgentRecord, AgentRegistry, HubServer, HubState};
use agentmesh_planner::{DecisionEngine, InMemoryPlanRepository, OpenAiClient, PlanRepository};
use clap::{Parser, Subcommand};
use config::MeshConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agentmesh", version, about = "AgentMesh - AI planning and agent coordination")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "agentmesh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent hub.
    Serve {
        /// Overrides `hub.bind_addr`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run a text processing worker against a hub.
    Worker {
        #[arg(long)]
        agent_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Hub base URL, e.g. `http://127.0.0.1:7400`.
        #[arg(long)]
        hub: Option<String>,
    },
    /// Analyze a request and print the decision and any execution plan.
    Plan {
        /// The user request.
        input: String,
        #[arg(long, default_value = "cli")]
        user_id: String,
        /// Read the agent roster from a running hub instead of the local worker.
        #[arg(long)]
        hub: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cli = Cli::parse();
    let config = MeshConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await,
        Commands::Worker {
            agent_id,
            name,
            hub,
        } => worker(config, agent_id, name, hub).await,
        Commands::Plan {
            input,
            user_id,
            hub,
        } => plan(config, &input, &user_id, hub).await,
    }
}

async fn serve(config: MeshConfig, bind: Option<String>) -> anyhow::Result<()> {
    let mut hub = config.hub;
    if let Some(bind) = bind {
        hub.bind_addr = bind;
    }
    let state = HubState::new(&hub);
    let shutdown = CancellationToken::new();

    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        token.cancel();
    });

    HubServer::serve(&hub, state, shutdown).await?;
    Ok(())
}

/// Worker identity: command-line flags over the `[worker]` table over defaults.
fn worker_config(
    configured: Option<AgentConfig>,
    agent_id: Option<String>,
    name: Option<String>,
    hub: Option<String>,
) -> AgentConfig {
    let mut config = configured.unwrap_or_else(|| {
        AgentConfig::new(
            format!("text-processor-{}", uuid::Uuid::new_v4().simple()),
            "Text Processor",
        )
    });
    if let Some(agent_id) = agent_id {
        config.agent_id = agent_id;
    }
    if let Some(name) = name {
        config.name = name;
    }
    if let Some(hub) = hub {
        config.orchestrator_url = hub;
    }
    config
}

async fn worker(
    config: MeshConfig,
    agent_id: Option<String>,
    name: Option<String>,
    hub: Option<String>,
) -> anyhow::Result<()> {
    let agent = worker_config(config.worker, agent_id, name, hub);
    let client = HttpOrchestratorClient::new(&agent.orchestrator_url)?;
    info!(agent_id = %agent.agent_id, hub = %agent.orchestrator_url, "Starting worker");

    let mut runtime = AgentRuntime::new(agent, Arc::new(client), Arc::new(TextProcessor::new()));
    runtime.start().await?;

    let stopped = runtime.shutdown_token();
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
        }
        _ = stopped.cancelled() => warn!("Conversation with the hub ended, stopping worker"),
    }
    runtime.shutdown().await;
    Ok(())
}

/// Roster of a running hub, or of a local text worker when no hub is given.
async fn agent_context(config: &MeshConfig, hub: Option<String>) -> anyhow::Result<String> {
    if let Some(hub) = hub {
        let url = format!("{}/agents", hub.trim_end_matches('/'));
        let records: Vec<AgentRecord> = reqwest::get(&url).await?.error_for_status()?.json().await?;
        return Ok(format_agent_context(&records));
    }

    let agent = worker_config(config.worker.clone(), None, None, None);
    let registry = AgentRegistry::new();
    registry
        .register(RegisterRequest {
            agent_id: agent.agent_id,
            name: agent.name,
            agent_type: agent.agent_type,
            capabilities: TextProcessor::new().capabilities(),
            version: agent.version,
        })
        .await?;
    Ok(registry.agent_context().await)
}

async fn plan(
    config: MeshConfig,
    input: &str,
    user_id: &str,
    hub: Option<String>,
) -> anyhow::Result<()> {
    let context = agent_context(&config, hub).await?;
    let model = config
        .model
        .ok_or_else(|| anyhow::anyhow!("a [model] table is required for planning"))?;

    let ai = Arc::new(OpenAiClient::new(model)?);
    let plans = Arc::new(InMemoryPlanRepository::new());
    let engine = DecisionEngine::new(ai, plans.clone());

    let request_id = uuid::Uuid::new_v4().to_string();
    let analysis = engine
        .explore_and_analyze(input, user_id, &context, &request_id)
        .await?;
    let decision = engine
        .make_decision(input, user_id, &analysis, &request_id)
        .await?;
    let plan = plans.get_by_analysis_id(analysis.id()).await?;

    let report = serde_json::json!({
        "analysis": analysis,
        "decision": decision,
        "plan": plan,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
