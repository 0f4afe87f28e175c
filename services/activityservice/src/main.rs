use std::sync::Arc;

use abstractgateway::{Publisher, Supervisor};
use activityservice::{ApiState, IngestPipeline, NonRtService, RestApiService, ServiceConfig};
use amqp::AmqpConnector;
use anyhow::{Context, Result};
use clap::Parser;
use postgresdb::PostgresEventStore;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = ServiceConfig::parse();

    let store = PostgresEventStore::new(&cfg.event_store()).context("invalid record store configuration")?;
    if let Err(e) = store.warm_up().await {
        // Inserts reconnect on their own; until then requests answer 500.
        warn!("Record store not reachable yet: {e}");
    }

    let supervisor = Supervisor::start(Arc::new(AmqpConnector::new(cfg.amqp())), cfg.supervisor());

    let pipeline = IngestPipeline::new(
        Arc::new(store),
        supervisor.handle(),
        Publisher::new(cfg.queue_name.clone()),
        cfg.publish_policy,
    );
    let state = Arc::new(ApiState::new(pipeline, cfg.api()));

    let mut api = RestApiService::new(&cfg.bind_host, cfg.port, state);
    api.start().await.context("starting REST API")?;
    info!(
        host = %cfg.bind_host,
        port = cfg.port,
        queue = %cfg.queue_name,
        policy = ?cfg.publish_policy,
        "Activity-Service listening"
    );

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    info!("Ctrl+C received, shutting down...");

    api.stop().await.context("stopping REST API")?;
    supervisor.stop().await;

    info!("Activity-Service stopped.");
    Ok(())
}
