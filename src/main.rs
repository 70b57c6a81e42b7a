use alert_engine::config::EngineConfig;
use alert_engine::engine::Engine;
use alert_engine::rules;
use alert_engine::search_client::SearchClient;
use alert_engine::state_store::StateStore;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "alert-engine", about = "Rule evaluation engine for search-store-backed alerting")]
struct Cli {
    #[arg(long, env = "ALERT_ENGINE_CONFIG", default_value = "config")]
    config: String,

    #[arg(long, env = "ALERT_ENGINE_RULES", default_value = "rules.yaml")]
    rules: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler and the admin HTTP surface (default).
    Serve {
        #[arg(long, default_value = "0.0.0.0:8090")]
        listen: SocketAddr,
    },
    /// Load configuration and rules, probe the search store, and exit.
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> alert_engine::Result<()> {
    let config = EngineConfig::load(&cli.config)?;
    let loaded_rules = rules::load_rules_from_yaml(&cli.rules)?;
    tracing::info!(count = loaded_rules.len(), "loaded rules");

    let search = SearchClient::new(&config.search_store)?;
    search.health_probe().await.map_err(|e| {
        tracing::error!(error = %e, "search store health probe failed");
        e
    })?;

    let store = StateStore::connect(&config.state_store).await?;
    tracing::info!(dialect = ?store.dialect(), "state store connected");

    let engine = Engine::new(config, search, store, loaded_rules);

    let command = cli.command.unwrap_or(Command::Serve {
        listen: "0.0.0.0:8090".parse().expect("valid default address"),
    });

    match command {
        Command::Validate => {
            tracing::info!("configuration and rules are valid");
            Ok(())
        }
        Command::Serve { listen } => serve(engine, listen).await,
    }
}

async fn serve(engine: Arc<Engine>, listen: SocketAddr) -> alert_engine::Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let scheduler_engine = engine.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler_engine.run_scheduler(shutdown_rx).await;
    });

    let admin_router = alert_engine::admin::router(engine);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(%listen, "admin surface listening");

    let server = axum::serve(listener, admin_router).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        tracing::error!(error = %err, "admin server error");
    }

    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
