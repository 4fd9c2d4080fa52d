// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Context;
use corp_crawler::application::use_cases::crawl_use_case::CrawlUseCase;
use corp_crawler::config::settings::{BackendKind, RunMode, Settings};
use corp_crawler::directory::GraphQlDirectoryClient;
use corp_crawler::domain::models::crawl_job::CrawlJob;
use corp_crawler::domain::repositories::status_repository::StatusStore;
use corp_crawler::domain::services::aggregator::Aggregator;
use corp_crawler::domain::services::pipeline::CrawlPipeline;
use corp_crawler::infrastructure::redis_client::RedisClient;
use corp_crawler::infrastructure::status_store::{InMemoryStatusStore, RedisStatusStore};
use corp_crawler::infrastructure::storage::LocalArtifactSink;
use corp_crawler::presentation::routes;
use corp_crawler::queue::backend::{ConcurrencyBackend, DurableBackend, InProcessBackend};
use corp_crawler::queue::barrier::RedisBarrierStore;
use corp_crawler::queue::task_queue::RedisTaskQueue;
use corp_crawler::workers::manager::WorkerManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use corp_crawler::utils::telemetry;

/// 主函数
///
/// 应用程序入口点，按运行模式初始化组件
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Settings::new().context("failed to load configuration")?;

    // 2. Initialize logging and metrics
    telemetry::init_telemetry(settings.logging.json);
    info!("Starting corp-crawler in {:?} mode...", settings.mode);
    corp_crawler::infrastructure::metrics::init_metrics(&settings.metrics)?;

    match settings.mode {
        RunMode::Serve => serve(settings).await,
        RunMode::Worker => worker(settings).await,
        RunMode::Once => once(settings).await,
    }
}

fn build_pipeline(
    settings: &Settings,
    status: Arc<dyn StatusStore>,
) -> anyhow::Result<Arc<CrawlPipeline>> {
    let client = Arc::new(GraphQlDirectoryClient::new(&settings.directory)?);
    info!("Directory client targeting {}", client.endpoint());

    let sink = Arc::new(LocalArtifactSink::from_settings(&settings.storage));
    info!("Artifacts will be written to {}", sink.base_path().display());

    let aggregator = Aggregator::new(sink, status.clone());
    Ok(Arc::new(CrawlPipeline::new(client, aggregator, status)))
}

async fn connect_redis(settings: &Settings) -> anyhow::Result<RedisClient> {
    let redis = RedisClient::connect(&settings.redis.url, &settings.redis.key_prefix)
        .await
        .context("failed to connect to redis")?;
    redis.ping().await.context("redis ping failed")?;
    info!("Redis client initialized");
    Ok(redis)
}

fn worker_manager(
    settings: &Settings,
    redis: &RedisClient,
    queue: Arc<RedisTaskQueue>,
    pipeline: Arc<CrawlPipeline>,
) -> WorkerManager<RedisTaskQueue, RedisBarrierStore> {
    let barrier = Arc::new(RedisBarrierStore::new(
        redis.clone(),
        settings.redis.result_ttl_secs,
        Duration::from_secs(settings.backend.barrier_lease_secs),
    ));
    WorkerManager::new(
        queue,
        barrier,
        pipeline,
        settings.backend.retry_policy(),
        Duration::from_millis(settings.backend.idle_poll_ms),
    )
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let mut workers = None;

    let (backend, status): (Arc<dyn ConcurrencyBackend>, Arc<dyn StatusStore>) =
        match settings.backend.kind {
            BackendKind::InProcess => {
                let status: Arc<dyn StatusStore> = Arc::new(InMemoryStatusStore::with_ttl(
                    Duration::from_secs(settings.redis.result_ttl_secs),
                ));
                let pipeline = build_pipeline(&settings, status.clone())?;
                let backend = Arc::new(InProcessBackend::new(
                    pipeline,
                    settings.backend.max_concurrent_details,
                ));
                (backend, status)
            }
            BackendKind::Redis => {
                let redis = connect_redis(&settings).await?;
                let status: Arc<dyn StatusStore> = Arc::new(RedisStatusStore::new(
                    redis.clone(),
                    settings.redis.result_ttl_secs,
                ));
                let queue = Arc::new(RedisTaskQueue::new(redis.clone()));

                if settings.backend.worker_count > 0 {
                    let pipeline = build_pipeline(&settings, status.clone())?;
                    let mut manager = worker_manager(&settings, &redis, queue.clone(), pipeline);
                    if settings.backend.recover_on_start {
                        manager.recover().await?;
                    }
                    manager.start_workers(settings.backend.worker_count);
                    workers = Some(manager);
                }

                (Arc::new(DurableBackend::new(queue)), status)
            }
        };
    info!("Using {} backend", backend.name());

    let use_case = Arc::new(CrawlUseCase::new(backend, status, settings.crawl.clone()));
    let app = routes::routes(use_case);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(mut manager) = workers {
        manager.shutdown();
    }
    Ok(())
}

async fn worker(settings: Settings) -> anyhow::Result<()> {
    if settings.backend.kind != BackendKind::Redis {
        anyhow::bail!("worker mode requires backend.kind = \"redis\"");
    }

    let redis = connect_redis(&settings).await?;
    let status: Arc<dyn StatusStore> = Arc::new(RedisStatusStore::new(
        redis.clone(),
        settings.redis.result_ttl_secs,
    ));
    let queue = Arc::new(RedisTaskQueue::new(redis.clone()));
    let pipeline = build_pipeline(&settings, status)?;

    let mut manager = worker_manager(&settings, &redis, queue, pipeline);
    if settings.backend.recover_on_start {
        manager.recover().await?;
    }
    manager.start_workers(settings.backend.worker_count.max(1));
    manager.wait_for_shutdown().await;
    Ok(())
}

async fn once(settings: Settings) -> anyhow::Result<()> {
    let status = Arc::new(InMemoryStatusStore::new());
    let pipeline = build_pipeline(&settings, status.clone())?;
    let backend = InProcessBackend::new(pipeline, settings.backend.max_concurrent_details);

    let job = CrawlJob::for_range(settings.crawl.first_page, settings.crawl.last_page);
    status.register(&job).await?;
    backend.submit(&job).await?;
    info!(
        batch_id = %job.id(),
        first_page = settings.crawl.first_page,
        last_page = settings.crawl.last_page,
        "Batch submitted"
    );

    let progress = status
        .wait_for_completion(job.id())
        .await
        .context("batch disappeared while waiting")?;
    let reports = status.page_reports(job.id()).await?.unwrap_or_default();

    let mut failed = 0;
    for report in &reports {
        match report.failure() {
            None => info!(page = report.page, "Page succeeded"),
            Some(failure) => {
                failed += 1;
                warn!(page = report.page, %failure, "Page failed");
            }
        }
    }
    info!(
        batch_id = %progress.batch_id,
        pages = progress.pages_total,
        failed,
        "Batch completed"
    );

    if failed > 0 {
        error!("{} of {} pages failed", failed, progress.pages_total);
        std::process::exit(1);
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}
