//! Standalone dispatcher node.
//!
//! Runs the task broker loop and serves the health, dispatcher state and
//! publish problem endpoints. The node starts with an empty publisher
//! registry and build store and has no event ingress of its own: it is an
//! observability shell around [`EventDispatcher`], which a host embeds to
//! feed build notifications and register publishers.

use std::env;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use commit_status_dispatch::broker::LocalTaskBroker;
use commit_status_dispatch::builds::InMemoryBuildStore;
use commit_status_dispatch::cluster::SingleNode;
use commit_status_dispatch::dispatch::{Collaborators, ConfigError, DispatcherConfig, EventDispatcher};
use commit_status_dispatch::problems::InMemoryProblems;
use commit_status_dispatch::publisher::InMemoryRegistry;
use commit_status_dispatch::server::{AppState, build_router};
use commit_status_dispatch::types::NodeId;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_BROKER_POLL_MS: u64 = 1000;
const DEFAULT_NODE_ID: &str = "main";

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid STATUS_DISPATCH_LISTEN_ADDR {value:?}: {source}")]
    ListenAddr {
        value: String,
        source: std::net::AddrParseError,
    },

    #[error("invalid STATUS_DISPATCH_BROKER_POLL_MS {0:?}: expected a positive number")]
    PollPeriod(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "commit_status_dispatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Dispatcher failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = DispatcherConfig::from_env()?;
    let addr = listen_addr()?;
    let poll_period = broker_poll_period()?;
    let node = NodeId::new(env::var("STATUS_DISPATCH_NODE_ID").unwrap_or_else(|_| DEFAULT_NODE_ID.to_string()));

    let broker = Arc::new(LocalTaskBroker::new());
    let problems = Arc::new(InMemoryProblems::new());
    let registry = Arc::new(InMemoryRegistry::new());
    if registry.is_empty() {
        warn!("No publishers registered, events will be dispatched but nothing published");
    }

    let dispatcher = EventDispatcher::new(
        config,
        Collaborators {
            registry,
            builds: Arc::new(InMemoryBuildStore::new()),
            cluster: Arc::new(SingleNode::new(node)),
            problems: problems.clone(),
            broker: broker.clone(),
        },
    );
    dispatcher.register();

    let cancel = CancellationToken::new();
    let broker_task = tokio::spawn(broker.clone().run(poll_period, cancel.clone()));

    let app = build_router(AppState::new(dispatcher, broker, problems));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "Cannot listen for shutdown signal");
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    if let Err(err) = broker_task.await {
        error!(error = %err, "Broker task failed");
    }
    Ok(())
}

fn listen_addr() -> Result<SocketAddr, StartupError> {
    let value = env::var("STATUS_DISPATCH_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
    value
        .parse()
        .map_err(|source| StartupError::ListenAddr { value, source })
}

fn broker_poll_period() -> Result<Duration, StartupError> {
    match env::var("STATUS_DISPATCH_BROKER_POLL_MS") {
        Err(_) => Ok(Duration::from_millis(DEFAULT_BROKER_POLL_MS)),
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => Err(StartupError::PollPeriod(value)),
        },
    }
}
