use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use docflow::application::ports::{Extractor, JobQueue, JobStore, RecordSync};
use docflow::application::services::{SubmissionService, WorkerConfig, WorkerPool};
use docflow::infrastructure::llm::OllamaExtractor;
use docflow::infrastructure::observability::{TracingConfig, init_tracing};
use docflow::infrastructure::persistence::{
    InMemoryJobQueue, InMemoryJobStore, PgJobQueue, PgJobStore, create_pool,
};
use docflow::infrastructure::sync::{QuickbaseConfig, QuickbaseSync};
use docflow::presentation::{AppState, Environment, Settings, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().map_err(anyhow::Error::msg)?;
    let environment = Environment::try_from(
        std::env::var("APP_ENV").unwrap_or_else(|_| "local".to_string()),
    )
    .map_err(anyhow::Error::msg)?;

    init_tracing(
        TracingConfig {
            environment: environment.to_string(),
            ..TracingConfig::from_env()
        },
        settings.server.port,
    );

    let (job_store, job_queue): (Arc<dyn JobStore>, Arc<dyn JobQueue>) =
        match &settings.database_url {
            Some(url) => {
                let pool = create_pool(url, 10).await?;
                (
                    Arc::new(PgJobStore::new(pool.clone())),
                    Arc::new(PgJobQueue::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store and queue");
                (
                    Arc::new(InMemoryJobStore::new()),
                    Arc::new(InMemoryJobQueue::new()),
                )
            }
        };

    let extractor: Arc<dyn Extractor> = Arc::new(OllamaExtractor::new(
        &settings.ollama.base_url,
        &settings.ollama.model,
        settings.ollama_timeout(),
    ));

    let record_sync: Arc<dyn RecordSync> = Arc::new(QuickbaseSync::new(QuickbaseConfig {
        api_url: settings.quickbase.api_url.clone(),
        realm: settings.quickbase.realm.clone(),
        user_token: settings.quickbase.user_token.clone(),
        table_id: settings.quickbase.table_id.clone(),
        record_field_id: settings.quickbase.record_field_id,
        field_ids: settings.quickbase.field_ids.clone(),
        error_field_id: settings.quickbase.error_field_id,
        timeout: settings.sync_timeout(),
    }));

    let worker_config = WorkerConfig {
        max_attempts: settings.worker.max_attempts,
        visibility_timeout: Duration::from_secs(settings.worker.visibility_timeout_secs),
        poll_interval: Duration::from_millis(settings.worker.poll_interval_ms),
        extract_timeout: settings.ollama_timeout(),
        sync_timeout: settings.sync_timeout(),
    };
    let worker_pool = WorkerPool::new(
        Arc::clone(&job_store),
        Arc::clone(&job_queue),
        extractor,
        record_sync,
        worker_config,
    );
    let pool_handle = worker_pool.spawn(settings.worker.count);

    let state = AppState {
        submission_service: Arc::new(SubmissionService::new(job_store, job_queue)),
    };
    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, workers = settings.worker.count, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool_handle.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
