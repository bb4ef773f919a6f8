use clap::{command, Parser};
use flowlet::collaborator::MockOrchestrator;
use flowlet::config::RuntimeConfig;
use flowlet::{Error, Flow, FlowRuntime};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Path to the flow document
    #[arg(short, long, default_value = "app.flow.json")]
    flow: PathBuf,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let config: RuntimeConfig = if cli.config.exists() {
        let content = std::fs::read_to_string(&cli.config)
            .map_err(|e| Error::Internal(format!("Failed to read config file: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?
    } else {
        RuntimeConfig::default()
    };

    info!("config loaded.");
    debug!("config: {:?}", config);

    let raw = std::fs::read_to_string(&cli.flow)
        .map_err(|e| Error::Internal(format!("Failed to read flow file: {}", e)))?;
    let flow = Flow::from_json(&raw)?;

    debug!("flow {} with {} screens", flow.app.id, flow.screens.len());

    let orchestrator = Arc::new(MockOrchestrator::with_delay(config.mock_agent_delay));
    let runtime = FlowRuntime::new(flow, config)?;
    runtime.boot(orchestrator)?;

    println!(
        "Flow runtime started on screen {:?}. Press Ctrl+C to shutdown.",
        runtime.active_screen().unwrap_or_default()
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::Internal(format!("Failed to wait for Ctrl+C: {}", e)))?;

    println!("Shutdown signal received, persisting state...");

    runtime.shutdown()?;

    println!("Runtime shutdown completed.");

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("flowlet=debug")
            .init();
    } else {
        tracing_subscriber::fmt().init();
    }

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
