pub mod api;
pub mod cli;
pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod services;
pub mod session_store;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cli::{Commands, ServerCommands};
pub use config::Config;
use state::SharedState;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);

pub async fn run(command: Option<Commands>, config: Config) -> anyhow::Result<()> {
    init_tracing(&config);
    match &config.source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => info!("No config file found, using defaults"),
    }
    config.validate()?;

    match command.unwrap_or(Commands::Web) {
        Commands::Web => run_web(config).await,
        Commands::Servers { command } => match command {
            ServerCommands::List => cli::cmd_server_list(&config).await,
            ServerCommands::Add {
                host,
                port,
                password,
            } => cli::cmd_server_add(&config, &host, port, &password).await,
            ServerCommands::Remove { id } => cli::cmd_server_remove(&config, id).await,
            ServerCommands::Cmd { id, command } => {
                cli::cmd_server_command(&config, id, &command.join(" ")).await
            }
        },
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    // A second init (tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

async fn run_web(config: Config) -> anyhow::Result<()> {
    info!("Sorbet v{} starting...", env!("CARGO_PKG_VERSION"));

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    let addr = config.bind_address();
    let shared = Arc::new(SharedState::new(config).await?);
    let app_state = api::create_app_state(shared, prometheus_handle).await?;

    let cleanup_handle = app_state
        .session_store
        .clone()
        .spawn_cleanup(SESSION_CLEANUP_INTERVAL);

    let app = api::router(app_state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Starting webserver on http://{addr}");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    cleanup_handle.abort();

    if let Err(e) = &result {
        error!("Web server error: {e}");
    }
    info!("Webserver stopped");

    result.map_err(Into::into)
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {e}"),
    }
}
