use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use fabriq_rs::adk::model::anthropic::AnthropicProvider;
use fabriq_rs::fabriq::agents::AgentTypeRegistry;
use fabriq_rs::fabriq::config::{ConfigStore, EngineConfig};
use fabriq_rs::fabriq::graph::{GraphCache, GraphCompiler, RunExecutor};
use fabriq_rs::fabriq::runtime::Engine;
use fabriq_rs::fabriq::scheduler::Scheduler;
use fabriq_rs::fabriq::server::{self, AppState};
use fabriq_rs::fabriq::tools::ToolRegistry;
use futures::StreamExt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the configured endpoints over HTTP
    Serve {
        /// Path to the engine config
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
    },
    /// Run one system on a prompt and print its events as JSON lines
    Run {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// System id to run
        #[arg(short, long)]
        system: String,

        #[arg(short, long)]
        prompt: String,
    },
    /// Check a config file without running anything
    Validate {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

async fn build_engine(agent_types: Arc<AgentTypeRegistry>) -> anyhow::Result<Engine> {
    let tools = ToolRegistry::with_builtins().await;
    log::info!("Registered tools: {}", tools.names().await.join(", "));

    let provider = AnthropicProvider::from_env().context("Model provider unavailable")?;
    let compiler = GraphCompiler::new(tools, Arc::new(provider));
    Ok(Engine::new(
        agent_types,
        Arc::new(GraphCache::new(compiler)),
        RunExecutor::new(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let agent_types = Arc::new(AgentTypeRegistry::builtin());

    match args.command {
        Commands::Serve { config, port, host } => {
            let store = ConfigStore::open(&config, agent_types.clone())
                .with_context(|| format!("Failed to load {}", config.display()))?;
            let engine = build_engine(agent_types).await?;

            let scheduler = Arc::new(Scheduler::new());
            scheduler.start(store.get().await, engine.clone()).await;

            let state = AppState::new(engine, store, scheduler.clone());
            let result = server::serve(state, SocketAddr::new(host, port)).await;
            scheduler.shutdown().await;
            log::info!("Engine shutting down");
            result?;
        }
        Commands::Run {
            config,
            system,
            prompt,
        } => {
            let config = EngineConfig::load(&config, &agent_types)
                .with_context(|| format!("Failed to load {}", config.display()))?;
            let system = config.get_system(&system)?;
            let engine = build_engine(agent_types).await?;

            let mut events = engine.execute_run(system, prompt).await;
            while let Some(event) = events.next().await {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        Commands::Validate { config } => {
            let loaded = EngineConfig::load(&config, &agent_types)
                .with_context(|| format!("Invalid config {}", config.display()))?;
            println!(
                "{} is valid: {} systems, {} endpoints, {} async functions",
                config.display(),
                loaded.systems.len(),
                loaded.endpoints.len(),
                loaded.async_functions.len()
            );
        }
    }

    Ok(())
}
