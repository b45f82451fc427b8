use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plugin_builder_core::{
    config::config_path, load_config, validate_config, ArtifactStore, BuildEnvironment,
    BuildGate, BuildOrchestrator, BuildStore, DockerEnvironment, EventBus, FsArtifactStore,
    ProcessRunner, SqliteBuildStore, TokioProcessRunner,
};
use plugin_builder_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long shutdown waits for cancelled builds to clean up
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("plugin-builder {} starting", VERSION);

    // Load configuration
    let config_path = config_path();
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Configuration loaded successfully (hash {})", &config_hash[..16]);
    info!("Database path: {:?}", config.database.path);

    // Build metadata
    let store: Arc<dyn BuildStore> = Arc::new(
        SqliteBuildStore::new(&config.database.path).context("Failed to create build store")?,
    );
    info!("Build store initialized");

    // Sandbox
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::new());
    let environment: Arc<dyn BuildEnvironment> = Arc::new(DockerEnvironment::new(
        config.docker.clone(),
        Arc::clone(&runner),
    ));
    info!(
        "Using {} build environment with image {}",
        environment.name(),
        config.docker.image
    );

    // Artifact storage
    std::fs::create_dir_all(&config.storage.root).with_context(|| {
        format!(
            "Failed to create artifact directory {:?}",
            config.storage.root
        )
    })?;
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(config.storage.clone()));
    info!(
        "Artifacts stored under {:?}, served at {}",
        config.storage.root, config.storage.public_base_url
    );

    // Orchestrator
    let events = EventBus::new(config.orchestrator.event_buffer_size);
    let orchestrator = Arc::new(
        BuildOrchestrator::new(
            BuildGate::new(config.orchestrator.max_concurrent_builds),
            store,
            environment,
            runner,
            artifacts,
            events,
        )
        .with_config(config.orchestrator.clone()),
    );
    info!(
        "Build orchestrator ready ({} concurrent builds)",
        config.orchestrator.max_concurrent_builds
    );

    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&orchestrator)));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    let cancelled = orchestrator.shutdown().await;
    if cancelled > 0 {
        info!("Cancelled {} build(s) in progress", cancelled);
    }

    // Let cancelled builds dispose of their workspaces
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while !orchestrator.status().await.active_builds.is_empty() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if drained.is_err() {
        error!(
            "Builds still running after {:?}, exiting anyway",
            SHUTDOWN_GRACE
        );
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
}
