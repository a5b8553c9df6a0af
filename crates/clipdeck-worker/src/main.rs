//! Media pipeline worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipdeck_media::{ChildRegistry, CommandExecutor, MediaTools, ProcessExecutor};
use clipdeck_source::{HttpMediaSource, MediaSource, SourceError, SourceRouter, VideoHostSource};
use clipdeck_store::{MemoryStore, Store};
use clipdeck_worker::{PipelineConfig, PipelineContext, PipelineService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("clipdeck=info".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting clipdeck-worker");

    let config = PipelineConfig::from_env();
    info!("Pipeline config: {:?}", config);

    let tools = MediaTools::from_env();
    for check in [tools.check_ffmpeg(), tools.check_ffprobe()] {
        check.context("required media tool missing")?;
    }
    if let Err(e) = tools.check_ytdlp() {
        warn!("Video host downloads unavailable: {}", e);
    }

    let registry = ChildRegistry::new();
    let executor: Arc<dyn CommandExecutor> =
        Arc::new(ProcessExecutor::with_registry(registry.clone()));
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    let mut router = SourceRouter::new().with_video_host(Arc::new(VideoHostSource::new(
        Arc::clone(&executor),
        tools.clone(),
        config.probe_exec(),
        config.download_exec(),
    )));
    match HttpMediaSource::from_env() {
        Ok(source) => router = router.with_media_server(Arc::new(source)),
        Err(SourceError::NotConfigured(reason)) => {
            info!("Media server source disabled: {}", reason)
        }
        Err(e) => return Err(e).context("invalid media server configuration"),
    }
    let source: Arc<dyn MediaSource> = Arc::new(router);

    let ctx = PipelineContext::new(config, store, executor, source).with_tools(tools);
    let service = PipelineService::new(ctx).with_child_registry(registry);

    let report = service.startup().await.context("startup recovery failed")?;
    info!(
        "Recovery: {} jobs failed, {} resources reset",
        report.jobs_failed, report.resources_reset
    );
    let summary = service.status_summary().await?;
    info!("Job summary: {} total, by status {:?}", summary.total, summary.by_status);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    service.shutdown().await;
    info!("Worker shutdown complete");
    Ok(())
}
