// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::domain::models::crawl_job::{BatchId, CrawlJob};
use crate::domain::services::fetch_tasks::{DetailFetchTask, TaskFailure};
use crate::domain::services::pipeline::CrawlPipeline;
use crate::queue::task_queue::{QueueError, TaskEnvelope, TaskQueue};

/// 后端错误类型
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// 并发后端
///
/// 批次控制器只依赖这个接口：提交后立即返回，
/// 页面的执行、扇出与汇合都由后端负责
#[async_trait]
pub trait ConcurrencyBackend: Send + Sync {
    /// 提交批次中的全部页面
    async fn submit(&self, job: &CrawlJob) -> Result<(), BackendError>;

    /// 后端名称
    fn name(&self) -> &'static str;
}

/// 进程内后端
///
/// 每页一个 tokio 任务，页内详情任务放进 `JoinSet`，
/// 全部详情共享一个信号量限制并发。不持久，进程退出即丢失
pub struct InProcessBackend {
    pipeline: Arc<CrawlPipeline>,
    permits: Arc<Semaphore>,
}

impl InProcessBackend {
    pub fn new(pipeline: Arc<CrawlPipeline>, max_concurrent_details: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent_details.max(1))),
        }
    }

    #[instrument(skip(pipeline, permits))]
    async fn run_page(
        pipeline: Arc<CrawlPipeline>,
        permits: Arc<Semaphore>,
        batch_id: BatchId,
        page: u32,
    ) {
        let listing = match pipeline.list(batch_id, page).await {
            Ok(listing) => listing,
            Err(failure) => {
                if let Err(e) = pipeline.listing_failed(batch_id, page, failure).await {
                    error!(%batch_id, page, error = %e, "Failed to record page outcome");
                }
                return;
            }
        };

        let expected = listing.len();
        let mut details = JoinSet::new();
        for (slot, identifier) in listing.identifiers.into_iter().enumerate() {
            let task = DetailFetchTask::new(slot, identifier);
            let pipeline = pipeline.clone();
            let permits = permits.clone();

            details.spawn(async move {
                // 信号量从不关闭
                let _permit = permits.acquire_owned().await.ok();
                match AssertUnwindSafe(pipeline.detail(batch_id, &task))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(%batch_id, page, identifier = task.identifier(), "Detail task panicked");
                        task.failure(TaskFailure::Failed {
                            cause: "detail task panicked".to_string(),
                            retryable: false,
                        })
                    }
                }
            });
        }

        let mut outcomes = Vec::with_capacity(expected);
        while let Some(joined) = details.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                // 缺失的槽位由聚合器记为失败
                Err(e) => error!(%batch_id, page, error = %e, "Detail task aborted"),
            }
        }

        if let Err(e) = pipeline
            .aggregator()
            .resolve(batch_id, page, expected, outcomes)
            .await
        {
            error!(%batch_id, page, error = %e, "Failed to record page outcome");
        }
    }
}

#[async_trait]
impl ConcurrencyBackend for InProcessBackend {
    async fn submit(&self, job: &CrawlJob) -> Result<(), BackendError> {
        let batch_id = job.id();
        for &page in job.pages() {
            tokio::spawn(Self::run_page(
                self.pipeline.clone(),
                self.permits.clone(),
                batch_id,
                page,
            ));
        }
        info!(%batch_id, pages = job.pages().len(), "Batch dispatched in-process");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_process"
    }
}

/// 持久后端
///
/// 提交时把全部页面任务一次性推入队列，由工作进程消费
pub struct DurableBackend<Q: TaskQueue> {
    queue: Arc<Q>,
}

impl<Q: TaskQueue> DurableBackend<Q> {
    pub fn new(queue: Arc<Q>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl<Q: TaskQueue + 'static> ConcurrencyBackend for DurableBackend<Q> {
    async fn submit(&self, job: &CrawlJob) -> Result<(), BackendError> {
        let batch_id = job.id();
        let tasks = job
            .pages()
            .iter()
            .map(|&page| TaskEnvelope::page(batch_id, page))
            .collect();
        self.queue.enqueue_many(tasks).await?;
        info!(%batch_id, pages = job.pages().len(), "Batch enqueued");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
