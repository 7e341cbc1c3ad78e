//! Shipyard controller worker
//!
//! Hosts one reconciler per job kind against the Postgres job store and the
//! Kubernetes Jobs API, until interrupted.

use anyhow::{Context, Result};
use shipyard_controller::backend::{ExecutionBackend, KubernetesBackend};
use shipyard_controller::config::Config;
use shipyard_controller::db;
use shipyard_controller::reconcile::Reconciler;
use shipyard_controller::repository::{JobStore, PgJobStore};
use shipyard_controller::service::JobController;
use shipyard_core::domain::job::JobKind;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shipyard_controller=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Shipyard Controller");

    let config = load_config()?;
    info!(
        "Loaded configuration: namespace={}, reconcile_interval={:?}, policy={}",
        config.namespace, config.reconcile_interval, config.transition_policy
    );

    info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to create database pool")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));

    let backend: Arc<dyn ExecutionBackend> = Arc::new(
        KubernetesBackend::try_default(&config.namespace)
            .await
            .context("Failed to create Kubernetes client")?,
    );

    info!("Kubernetes client initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    for kind in JobKind::ALL {
        let controller = JobController::new(kind, Arc::clone(&store), config.transition_policy);
        let reconciler = Reconciler::new(controller, Arc::clone(&backend), &config);
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { reconciler.run(shutdown).await }));
    }

    info!("Controller initialized successfully");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received, stopping reconcilers");
    shutdown_tx.send(true).ok();

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Reconciler task panicked: {}", e);
        }
    }

    info!("Shipyard Controller stopped");
    Ok(())
}

/// Loads configuration from environment variables, falling back to defaults
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Invalid configuration")?;
    config.validate()?;
    Ok(config)
}
