//! aedpics-api - AED registry and inspection service
//!
//! Startup order: tracing, build identification, root folder, config,
//! database, photo storage, router.

use aedpics_api::{build_router, AppState};
use aedpics_common::config::{RootFolderInitializer, RootFolderResolver, ServiceConfig, TomlConfig};
use aedpics_common::db::init_database;
use anyhow::{Context, Result};
use clap::Parser;
use object_store::local::LocalFileSystem;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MODULE_NAME: &str = "aedpics-api";

/// Command-line arguments for aedpics-api
#[derive(Parser, Debug)]
#[command(name = "aedpics-api")]
#[command(about = "AED registry, inspection and compliance API")]
#[command(version)]
struct Args {
    /// Root folder holding the database and photo storage
    #[arg(short, long, env = "AEDPICS_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = TomlConfig::load_or_default(MODULE_NAME);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("aedpics_api={0},aedpics_common={0},tower_http=info", toml_config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting AED registry API (aedpics-api) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let mut config = ServiceConfig::resolve(&toml_config).context("Invalid configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if config.vapid_public_key.is_none() {
        info!("VAPID public key not configured; push subscription key endpoint returns 503");
    }

    let db_path = initializer.database_path();
    if initializer.database_exists() {
        info!("Database: {}", db_path.display());
    } else {
        info!("Creating new database: {}", db_path.display());
    }
    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;
    info!("✓ Database ready");

    let storage_path = initializer.storage_path();
    std::fs::create_dir_all(&storage_path)
        .with_context(|| format!("Failed to create storage folder {}", storage_path.display()))?;
    let store = LocalFileSystem::new_with_prefix(&storage_path)
        .with_context(|| format!("Failed to open storage folder {}", storage_path.display()))?;
    info!("Photo storage: {}", storage_path.display());

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, Arc::new(store), config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("aedpics-api listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
