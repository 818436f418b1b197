use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use otsu_relay::client::{find_blob, HttpStoreClient, Menu, OrchestrationMode, Orchestrator, RemoteStore};
use otsu_relay::config::{AppConfig, ClientConfig};
use otsu_relay::errors::error_logging;
use otsu_relay::observability;
use otsu_relay::observability_config::presets;

/// Menu-driven client for the Otsu relay store
#[derive(Debug, Parser)]
#[command(name = "otsu-client", version, about)]
struct Cli {
    /// Store base URL (overrides OTSU_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Directory for locally saved results (overrides LOCAL_OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Open the store's web interface before starting
    #[arg(long, global = true)]
    open_browser: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive menu (default)
    Menu,
    /// List images available on the store
    List,
    /// Process a single image without the menu
    Run {
        #[arg(long, value_enum)]
        mode: ModeArg,
        /// Local path for client-to-server, otherwise part of a stored image name
        #[arg(long)]
        image: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    ServerToServer,
    ClientToServer,
    ServerToClient,
    ServerToBoth,
}

fn client_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = AppConfig::from_env()
        .map_err(|e| {
            error_logging::log_config_error(&e, "environment", "load_client_configuration");
            anyhow::anyhow!("{}", e)
        })?
        .client;

    if let Some(server) = &cli.server {
        config.server_url = server.trim_end_matches('/').to_string();
    }
    if let Some(dir) = &cli.output_dir {
        config.local_output_dir = dir.clone();
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
    Ok(config)
}

/// Resolve a `--image` pattern to the URL of the first matching stored image
async fn resolve_remote(store: &HttpStoreClient, pattern: &str) -> Result<String> {
    let entries = store.list_available().await?;
    find_blob(&entries, pattern)
        .map(|entry| entry.url.clone())
        .ok_or_else(|| anyhow::anyhow!("No image on the server matches '{}'", pattern))
}

async fn run_once(config: ClientConfig, mode: ModeArg, image: &str) -> Result<()> {
    let store = HttpStoreClient::new(&config)?;
    let orchestrator = Orchestrator::new(store, config.local_output_dir.clone());

    let mode = match mode {
        ModeArg::ClientToServer => OrchestrationMode::LocalToRemote {
            path: PathBuf::from(image),
        },
        ModeArg::ServerToServer => OrchestrationMode::RemoteToRemote {
            source: resolve_remote(orchestrator.store(), image).await?,
        },
        ModeArg::ServerToClient => OrchestrationMode::RemoteToLocal {
            source: resolve_remote(orchestrator.store(), image).await?,
        },
        ModeArg::ServerToBoth => OrchestrationMode::RemoteToBoth {
            source: resolve_remote(orchestrator.store(), image).await?,
        },
    };

    let outcome = orchestrator.run(mode).await?;
    println!(
        "Threshold {} applied to {}x{} image",
        outcome.threshold, outcome.dimensions.0, outcome.dimensions.1
    );
    for deposit in &outcome.deposits {
        println!("Saved {} at {}", deposit.name, deposit.locator);
    }
    Ok(())
}

async fn list(config: ClientConfig) -> Result<()> {
    let store = HttpStoreClient::new(&config)?;
    let entries = store.list_available().await?;
    if entries.is_empty() {
        println!("No images on the server.");
    }
    for entry in entries {
        println!("{}\t{}", entry.name, entry.url);
    }
    Ok(())
}

async fn execute(cli: Cli) -> Result<()> {
    let config = client_config(&cli)?;

    if cli.open_browser {
        if let Err(e) = webbrowser::open(&config.server_url) {
            eprintln!("Could not open a browser: {}", e);
        }
    }

    match cli.command.unwrap_or(Command::Menu) {
        Command::Menu => {
            let stdin = std::io::stdin();
            let mut menu = Menu::new(stdin.lock(), std::io::stdout(), config);
            menu.run().await?;
        }
        Command::List => list(config).await?,
        Command::Run { mode, image } => run_once(config, mode, &image).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let mut observability_config = presets::interactive_client();
    if let Ok(level) = std::env::var("OBSERVABILITY_LOG_LEVEL") {
        observability_config.log_level = level;
    }
    observability_config.otlp_endpoint = std::env::var("OTLP_ENDPOINT").ok();
    if let Err(e) = observability::init_client_observability(&observability_config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match execute(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
