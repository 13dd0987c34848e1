use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use elcom_tariffs::config::Config;
use elcom_tariffs::coordinator::{CoordinatorRegistry, RefreshState, TariffPipeline};
use elcom_tariffs::logging::init_logging;
use elcom_tariffs::search::search_municipalities;
use elcom_tariffs::sensor::current_report;
use elcom_tariffs::sparql::SparqlClient;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "elcom-tariffs",
    version = env!("APP_VERSION"),
    about = "Swiss electricity tariffs from ElCom/LINDAS"
)]
struct Cli {
    /// Configuration file (defaults to the standard search paths)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep every configured entity refreshed and serve the API (default)
    Run,

    /// Search municipalities by name
    Search {
        /// Part of the municipality name
        term: String,

        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one refresh cycle and print the resulting reports as JSON
    Refresh {
        /// Only refresh this entity
        #[arg(long)]
        entity: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
        None => Ok(Config::load()?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_logging(&config.logging)?;

    let client = SparqlClient::from_config(&config.endpoint)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, client).await,
        Commands::Search { term, json } => search(&client, &term, json).await,
        Commands::Refresh { entity } => refresh_once(config, client, entity.as_deref()).await,
    }
}

async fn run(config: Config, client: SparqlClient) -> Result<()> {
    info!(
        "elcom-tariffs {} starting with {} entities",
        env!("APP_VERSION"),
        config.entities.len()
    );
    if config.entities.is_empty() {
        warn!("No entities configured; only search is useful");
    }

    let pipeline = Arc::new(TariffPipeline::new(client.clone(), &config));
    let registry = Arc::new(CoordinatorRegistry::start(
        &config.entities,
        pipeline,
        &config.refresh,
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let web_task = spawn_web(&config, registry.clone(), client, stop_rx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    let _ = stop_tx.send(true);
    if let Some(task) = web_task
        && let Err(e) = task.await
    {
        error!("Web server task failed: {}", e);
    }
    registry.shutdown_all().await;
    info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "web")]
fn spawn_web(
    config: &Config,
    registry: Arc<CoordinatorRegistry>,
    client: SparqlClient,
    mut stop_rx: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    use elcom_tariffs::web::{AppState, serve};

    if !config.web.enabled {
        return None;
    }
    let state = AppState { registry, client };
    let host = config.web.host.clone();
    let port = config.web.port;
    Some(tokio::spawn(async move {
        let shutdown = async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        };
        if let Err(e) = serve(state, &host, port, shutdown).await {
            error!("Web server error: {}", e);
        }
    }))
}

#[cfg(not(feature = "web"))]
fn spawn_web(
    _config: &Config,
    _registry: Arc<CoordinatorRegistry>,
    _client: SparqlClient,
    _stop_rx: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    None
}

async fn search(client: &SparqlClient, term: &str, json: bool) -> Result<()> {
    let matches = search_municipalities(client, term).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }
    if matches.is_empty() {
        println!("No municipality matches '{}'", term.trim());
    }
    for m in &matches {
        println!("{:.2}  {}  <{}>", m.score, m.label, m.uri);
    }
    Ok(())
}

async fn refresh_once(config: Config, client: SparqlClient, only: Option<&str>) -> Result<()> {
    let entities: Vec<_> = config
        .entities
        .iter()
        .filter(|e| only.is_none_or(|id| e.id == id))
        .cloned()
        .collect();
    if entities.is_empty() {
        anyhow::bail!("No matching entity configured");
    }

    let pipeline = Arc::new(TariffPipeline::new(client, &config));
    let registry = CoordinatorRegistry::start(&entities, pipeline, &config.refresh);

    let mut reports = Vec::with_capacity(registry.len());
    let mut failed = 0;
    for handle in registry.iter() {
        let state = handle
            .subscribe_status()
            .wait_for(|s| matches!(s.state, RefreshState::Succeeded | RefreshState::Failed))
            .await
            .map(|s| s.state)
            .context("Coordinator stopped before finishing")?;
        if state == RefreshState::Failed {
            failed += 1;
        }
        reports.push(current_report(handle));
    }
    registry.shutdown_all().await;

    println!("{}", serde_json::to_string_pretty(&reports)?);
    if failed > 0 {
        anyhow::bail!("{} of {} refreshes failed", failed, reports.len());
    }
    Ok(())
}
