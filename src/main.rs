use anyhow::Context;
use chorus::api::{self, AppState};
use chorus::config::AppConfig;
use chorus::dispatch::Dispatcher;
use chorus::events::JobEventBus;
use chorus::jobs::JobOrchestrator;
use chorus::store::StateStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    tokio::fs::create_dir_all(&config.pipeline.upload_dir)
        .await
        .context("creating upload directory")?;
    tokio::fs::create_dir_all(&config.pipeline.chunks_dir)
        .await
        .context("creating chunks directory")?;

    let store = StateStore::connect(&config.store).await;

    // The worker list persists in the store; configured workers are merged
    // in at startup so a fresh deployment starts with a usable pool.
    let known = store.worker_urls().await;
    for url in &config.workers.initial {
        if !known.contains(url) {
            store.add_worker(url).await;
        }
    }

    let worker_urls = store.worker_urls().await;
    info!("Starting with {} known workers", worker_urls.len());

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        worker_urls,
        Duration::from_secs(config.workers.probe_timeout_secs),
    ));
    let events = JobEventBus::new();
    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone(),
        Arc::clone(&dispatcher),
        events.clone(),
        config.splitter.clone(),
        config.pipeline.clone(),
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = api::router(AppState {
        store,
        dispatcher,
        orchestrator,
        events,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await.context("serving")?;

    Ok(())
}
