//! pr-dispatch — pull-request event dispatcher.
//!
//! A standalone binary that ingests GitHub pull-request webhooks, records
//! them as pending events, and runs a dispatch loop that deduplicates bursts
//! per pull request, matches events to configured dispatch rules, checks
//! downstream pipeline capacity, and triggers executions via HTTP callback.

mod config;
mod metrics;
mod models;
mod predicate;
mod routes;
mod services;
mod store;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tower_http::trace::TraceLayer;

use crate::predicate::CelEngine;
use crate::services::capacity::{GateRegistry, TektonGate};
use crate::services::dispatcher::Dispatcher;
use crate::services::github::GithubLabeler;
use crate::services::matcher::RuleMatcher;
use crate::services::trigger::HttpTrigger;
use crate::store::memory::MemoryStore;
use crate::store::EventStore;

#[derive(Parser)]
#[command(name = "pr-dispatch", about = "Pull-request event dispatcher")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "DISPATCH_PORT", default_value = "8080")]
    port: u16,

    /// Path to the dispatch rules file (JSON array)
    #[arg(long, env = "DISPATCH_RULES_PATH", default_value = "rules.json")]
    rules: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();
    let config = config::DispatchConfig::from_env();

    tracing::info!("Starting pr-dispatch...");

    let rules = config::load_rules(&cli.rules)?;
    tracing::info!(rules = rules.len(), path = %cli.rules.display(), "Loaded dispatch rules");

    let mut gates = GateRegistry::new();
    gates.register(
        "tekton",
        Arc::new(TektonGate::new(
            config.orchestrator_url.clone(),
            config.orchestrator_token.clone(),
        )),
    );
    gates.validate(&rules)?;

    let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
    let matcher = RuleMatcher::new(rules, Arc::new(CelEngine));
    let labeler = Arc::new(GithubLabeler::new(config.github_token.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        matcher,
        gates,
        Arc::new(HttpTrigger::new()),
        labeler,
        Duration::from_millis(config.settle_delay_ms),
    ));

    tokio::spawn(dispatcher.run(Duration::from_secs(config.tick_interval_secs)));

    // Initialize metrics
    metrics::init_metrics();

    let state = routes::AppState {
        store,
        config: config.clone(),
    };
    let app = routes::app_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("pr-dispatch listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
