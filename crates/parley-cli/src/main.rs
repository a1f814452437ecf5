use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use parley_core::{
    AdapterSet, DispatchConfig, Dispatcher, ProviderCatalog, RoundEvent, Session, TargetId,
    TargetStore,
};
use parley_gateway::GatewayServer;

mod config;

use config::ParleyConfig;

#[derive(Parser)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Parley: ask several LLMs the same question at once")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration (secrets masked)
    Config,

    /// List providers and their models
    Models,

    /// Send one prompt to every configured target and print the answers
    Ask {
        /// The prompt to send
        prompt: String,
    },

    /// Run the HTTP gateway until Ctrl+C
    Serve {
        /// Override the bind address from the config file
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Models => cmd_models(&cli.config),
        Commands::Ask { prompt } => cmd_ask(&cli.config, &prompt).await,
        Commands::Serve { bind } => cmd_serve(&cli.config, bind).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("Parley initialized at {}", config_dir.display());
    println!(
        "Export OPENAI_API_KEY, ANTHROPIC_API_KEY and GEMINI_API_KEY, or edit {} to pick targets.",
        config_path.display()
    );
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = ParleyConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.masked())?);
    Ok(())
}

fn cmd_models(config_path: &Option<PathBuf>) -> Result<()> {
    // Models can be listed before `parley init`
    let catalog = match ParleyConfig::load(config_path) {
        Ok(cfg) => cfg.catalog(),
        Err(e) => {
            warn!("Using built-in catalog: {:#}", e);
            ProviderCatalog::builtin()
        }
    };
    for entry in catalog.entries() {
        println!("{} ({})", entry.name, entry.provider.id());
        for model in &entry.models {
            println!("  {}", model);
        }
    }
    Ok(())
}

async fn cmd_ask(config_path: &Option<PathBuf>, prompt: &str) -> Result<()> {
    let cfg = ParleyConfig::load(config_path)?;
    let (store, dispatcher) = build_runtime(&cfg)?;
    if store.is_empty() {
        anyhow::bail!("No targets configured. Add [[targets]] entries to your config.");
    }

    let labels: HashMap<TargetId, String> = store
        .list()
        .iter()
        .map(|t| {
            let provider = t.provider.map(|p| p.display_name()).unwrap_or("Unknown");
            (t.id.clone(), format!("{} · {}", provider, t.model))
        })
        .collect();

    let (progress_tx, mut progress_rx) = mpsc::channel::<RoundEvent>(32);
    let dispatcher = dispatcher.with_progress(progress_tx);
    let progress_labels = labels.clone();
    let progress = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            let label = progress_labels
                .get(&event.target_id)
                .map(String::as_str)
                .unwrap_or("?");
            info!("{}: {}", label, event.status);
        }
    });

    let round = dispatcher.dispatch(prompt, &store.snapshot()).await?;
    drop(dispatcher);
    if let Err(e) = progress.await {
        warn!("Progress printer stopped: {}", e);
    }

    print!(
        "{}",
        round.format_cards(|id| labels.get(id).cloned().unwrap_or_else(|| id.to_string()))
    );

    if round.succeeded() == 0 {
        anyhow::bail!("All {} targets failed", round.failed());
    }
    Ok(())
}

async fn cmd_serve(config_path: &Option<PathBuf>, bind: Option<SocketAddr>) -> Result<()> {
    let cfg = ParleyConfig::load(config_path)?;
    let (store, dispatcher) = build_runtime(&cfg)?;
    let bind = match bind {
        Some(addr) => addr,
        None => cfg
            .gateway
            .bind
            .parse()
            .with_context(|| format!("Invalid gateway bind address '{}'", cfg.gateway.bind))?,
    };

    info!("Starting gateway with {} configured targets", store.len());
    let session = Arc::new(Session::new(store, dispatcher));
    let server = GatewayServer::new(bind, cfg.auth_token(), session);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    let mut server_task = tokio::spawn(server.run(async move { shutdown.cancelled().await }));

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
        }
        // Bind failures end the server before any signal arrives
        result = &mut server_task => {
            return result.context("Gateway task panicked")?;
        }
    }

    server_task.await.context("Gateway task panicked")??;
    println!("Parley stopped.");
    Ok(())
}

/// Catalog, HTTP adapters and target store from the loaded config.
fn build_runtime(cfg: &ParleyConfig) -> Result<(TargetStore, Dispatcher)> {
    let catalog = Arc::new(cfg.catalog());
    let timeout = cfg.call_timeout();
    let adapters = AdapterSet::http(&catalog, timeout)?;
    let dispatcher = Dispatcher::new(adapters, DispatchConfig { call_timeout: timeout });
    let store = cfg.target_store(catalog)?;
    Ok((store, dispatcher))
}
