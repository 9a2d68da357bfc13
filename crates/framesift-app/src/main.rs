//! Framesift application binary - composition root.
//!
//! One executable, one role per process:
//! - `registry`: worker lease registry over SQLite
//! - `dispatcher`: leases a worker and forwards extraction jobs to it
//! - `extractor`: runs ffmpeg for one job at a time and reports back
//! - `embedder`: polls extracted frame directories and stores embeddings
//! - `query`: text search over the stored embeddings

mod cli;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::Parser;

use framesift_core::config::{expand_home, resolve_in_data_dir, FramesiftConfig};
use framesift_core::error::FramesiftError;
use framesift_core::sleep::TokioSleeper;
use framesift_storage::Database;
use framesift_vector::{
    EmbeddingService, HttpEmbeddingService, IngestionPipeline, MockEmbedding, PipelineSettings,
    SearchEngine, SqliteVectorStore, VectorStore,
};

use framesift_api::routes;
use framesift_api::state::{DispatcherState, ExtractorState, QueryState, RegistryState};
use framesift_api::{Dispatcher, HttpJobForwarder};
use framesift_extract::{ExtractionWorker, FfmpegExtractor, WorkerSettings};
use framesift_registry::{HttpRegistryClient, Registry};

use crate::cli::{CliArgs, Command, EmbedderArgs};

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);
const REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let mut config = FramesiftConfig::load_or_default(&config_file);
    config.apply_env_overrides();
    args.apply_to(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!(
        role = args.command.role(),
        config = %config_file.display(),
        "Starting Framesift v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.vector.metric != "l2" {
        return Err(FramesiftError::Config(format!(
            "Unsupported distance metric '{}', only 'l2' is available",
            config.vector.metric
        ))
        .into());
    }

    match &args.command {
        Command::Registry(_) => run_registry(&config).await,
        Command::Dispatcher(_) => run_dispatcher(&config).await,
        Command::Extractor(_) => run_extractor(&config).await,
        Command::Embedder(embedder_args) => run_embedder(&config, embedder_args).await,
        Command::Query(_) => run_query(&config).await,
    }
}

async fn run_registry(config: &FramesiftConfig) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = resolve_in_data_dir(&config.general.data_dir, &config.registry.database_path);
    let db = Arc::new(Database::new(&db_path)?);
    let registry = Registry::new(db);
    tracing::info!(
        path = %db_path.display(),
        available = registry.available_count()?,
        "Registry database opened"
    );

    serve(&config.registry.bind, routes::registry_router(RegistryState::new(registry))).await
}

async fn run_dispatcher(config: &FramesiftConfig) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(config.dispatcher.request_timeout_secs);
    let registry = HttpRegistryClient::new(&config.dispatcher.registry_url, timeout)?;
    let forwarder = HttpJobForwarder::new(timeout)?;
    tracing::info!(registry = %registry.base_url(), "Dispatcher using remote registry");

    let dispatcher = Dispatcher::new(Arc::new(registry), Arc::new(forwarder));
    serve(
        &config.dispatcher.bind,
        routes::dispatcher_router(DispatcherState::new(dispatcher)),
    )
    .await
}

async fn run_extractor(config: &FramesiftConfig) -> Result<(), Box<dyn std::error::Error>> {
    let settings = WorkerSettings::from_config(&config.extractor);
    std::fs::create_dir_all(&settings.frames_root)?;

    let registry = HttpRegistryClient::new(&config.extractor.registry_url, REGISTRY_TIMEOUT)?;
    let extractor = FfmpegExtractor::new(expand_home(&config.extractor.ffmpeg_path));
    let worker = Arc::new(ExtractionWorker::new(
        settings,
        Arc::new(extractor),
        Arc::new(registry),
        Arc::new(TokioSleeper),
    ));

    let listener = bind(&config.extractor.bind).await?;

    // Registration only starts once the listener can accept jobs.
    let registering = Arc::clone(&worker);
    tokio::spawn(async move {
        if let Err(e) = registering.register().await {
            tracing::error!(error = %e, "Worker will not receive jobs until restarted");
        }
    });

    let router = routes::extractor_router(ExtractorState::new(worker));
    axum::serve(listener, router).await?;
    Ok(())
}

async fn run_embedder(
    config: &FramesiftConfig,
    args: &EmbedderArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = PipelineSettings::from_config(&config.ingest);
    std::fs::create_dir_all(&settings.frames_root)?;

    let store: Arc<dyn VectorStore> = Arc::new(open_store(config)?);

    if config.vector.embedding_url.trim().is_empty() {
        tracing::warn!("No embedding_url configured, using the mock embedder");
        let embedder = MockEmbedding::with_dimensions(config.vector.dimensions);
        drive_pipeline(embedder, store, settings, args.once).await
    } else {
        let embedder = HttpEmbeddingService::new(
            &config.vector.embedding_url,
            config.vector.dimensions,
            EMBEDDING_TIMEOUT,
        )?;
        drive_pipeline(embedder, store, settings, args.once).await
    }
}

async fn drive_pipeline<E: EmbeddingService>(
    embedder: E,
    store: Arc<dyn VectorStore>,
    settings: PipelineSettings,
    once: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = IngestionPipeline::new(embedder, store, Arc::new(TokioSleeper), settings);
    if once {
        let report = pipeline.run_cycle().await?;
        tracing::info!(
            directories = report.directories_completed,
            frames = report.frames_embedded,
            failed = report.frames_failed,
            "Single ingestion cycle finished"
        );
        return Ok(());
    }
    pipeline.run().await;
    Ok(())
}

async fn run_query(config: &FramesiftConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = match open_store(config) {
        Ok(store) => {
            let store: Arc<dyn VectorStore> = Arc::new(store);
            let engine = if config.vector.embedding_url.trim().is_empty() {
                tracing::warn!("No embedding_url configured, using the mock embedder");
                SearchEngine::new(
                    store,
                    MockEmbedding::with_dimensions(config.vector.dimensions),
                )
            } else {
                SearchEngine::new(
                    store,
                    HttpEmbeddingService::new(
                        &config.vector.embedding_url,
                        config.vector.dimensions,
                        EMBEDDING_TIMEOUT,
                    )?,
                )
            };
            QueryState::new(engine.with_limits(&config.query, &config.vector))
        }
        Err(e) => {
            tracing::error!(error = %e, "Vector store unavailable, searches will answer 503");
            QueryState::unavailable(e.to_string())
        }
    };

    serve(&config.query.bind, routes::query_router(state)).await
}

fn open_store(config: &FramesiftConfig) -> Result<SqliteVectorStore, FramesiftError> {
    let path = resolve_in_data_dir(&config.general.data_dir, &config.vector.database_path);
    SqliteVectorStore::open(&path, config.vector.dimensions)
}

async fn bind(addr: &str) -> Result<tokio::net::TcpListener, Box<dyn std::error::Error>> {
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            tracing::info!(addr = %addr, "Listening");
            Ok(listener)
        }
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind, is another instance running?");
            Err(e.into())
        }
    }
}

async fn serve(addr: &str, router: Router) -> Result<(), Box<dyn std::error::Error>> {
    let listener = bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
