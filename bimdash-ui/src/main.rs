//! bimdash-ui - project metadata dashboard service
//!
//! Serves the project, lookup, contact, user, dashboard and report APIs
//! over a SQLite-backed tree store.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bimdash_common::config;
use bimdash_common::db::{init_database, DATABASE_FILE};
use bimdash_common::events::EventBus;
use bimdash_common::lookups::LookupStore;
use bimdash_common::store::TreeStore;
use bimdash_ui::ai::{LlmClient, LlmColumnClassifier, LlmReportGenerator};
use bimdash_ui::{build_router, AppState};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Store change events buffered per subscriber
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for bimdash-ui
#[derive(Parser, Debug)]
#[command(name = "bimdash-ui")]
#[command(about = "Project metadata dashboard service")]
#[command(version)]
struct Args {
    /// Port to listen on (falls back to `port` in the config file, then 5790)
    #[arg(short, long, env = "BIMDASH_PORT")]
    port: Option<u16>,

    /// Folder holding the database
    #[arg(short, long, env = "BIMDASH_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "BIMDASH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (toml_config, config_source) =
        config::load_config(args.config.as_deref()).context("Failed to load configuration")?;

    init_tracing(&toml_config.logging)?;

    info!(
        "Starting bimdash-ui v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => warn!("No config file found, using compiled defaults"),
    }

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let db_path = root_folder.join(DATABASE_FILE);
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("Database: {}", db_path.display());

    let store = TreeStore::new(pool, EventBus::new(EVENT_BUS_CAPACITY));

    let normalized = LookupStore::new(store.clone())
        .normalize_legacy()
        .await
        .context("Failed to normalize lookup lists")?;
    if normalized > 0 {
        info!("Normalized {} legacy lookup list(s)", normalized);
    }

    let api_key = config::resolve_ai_api_key(&toml_config);
    let llm = LlmClient::new(&toml_config.ai, api_key).context("Failed to set up AI client")?;
    info!("AI endpoint: {} (model {})", toml_config.ai.base_url, toml_config.ai.model);

    let state = AppState::new(
        store,
        toml_config.fields.clone(),
        Arc::new(LlmColumnClassifier::new(llm.clone())),
        Arc::new(LlmReportGenerator::new(llm)),
    );
    let app = build_router(state);

    let port = args.port.unwrap_or(toml_config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("bimdash-ui listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` when set, otherwise the `[logging] level` for this service
fn init_tracing(logging: &config::LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "bimdash_ui={level},bimdash_common={level},tower_http={level}",
            level = logging.level
        )
        .into()
    });

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
