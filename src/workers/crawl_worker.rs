// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::crawl_job::BatchId;
use crate::domain::models::page::DetailResult;
use crate::domain::services::fetch_tasks::{DetailFetchTask, TaskFailure};
use crate::domain::services::pipeline::CrawlPipeline;
use crate::queue::barrier::{Arrival, BarrierStore};
use crate::queue::task_queue::{QueuedTask, TaskEnvelope, TaskKind, TaskQueue};
use crate::utils::errors::WorkerError;
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::worker::Worker;

/// 爬取工作器
///
/// 从持久队列消费页面任务与详情任务。处理失败（例如 Redis 不可用）时
/// 任务不确认，留在处理中列表，由重启恢复重新投递
pub struct CrawlWorker<Q: TaskQueue, B: BarrierStore> {
    queue: Arc<Q>,
    barrier: Arc<B>,
    pipeline: Arc<CrawlPipeline>,
    retry_policy: RetryPolicy,
    idle_poll: Duration,
    worker_id: Uuid,
    name: String,
}

impl<Q: TaskQueue, B: BarrierStore> CrawlWorker<Q, B> {
    /// 创建新的爬取工作器实例
    pub fn new(
        queue: Arc<Q>,
        barrier: Arc<B>,
        pipeline: Arc<CrawlPipeline>,
        retry_policy: RetryPolicy,
        idle_poll: Duration,
    ) -> Self {
        let worker_id = Uuid::new_v4();
        Self {
            queue,
            barrier,
            pipeline,
            retry_policy,
            idle_poll,
            worker_id,
            name: format!("crawl-worker-{}", worker_id),
        }
    }

    /// 处理一个任务；队列为空时返回 `false`
    pub async fn process_next_task(&self) -> Result<bool, WorkerError> {
        let Some(task) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        self.process_task(&task).await?;
        Ok(true)
    }

    #[instrument(
        skip(self, task),
        fields(
            worker = %self.worker_id,
            task_id = %task.envelope.id,
            batch_id = %task.envelope.batch_id,
            page = task.envelope.page_number(),
            attempt = task.envelope.attempt
        )
    )]
    async fn process_task(&self, task: &QueuedTask) -> Result<(), WorkerError> {
        let batch_id = task.envelope.batch_id;
        match &task.envelope.kind {
            TaskKind::Page { page } => self.process_page(task, batch_id, *page).await,
            TaskKind::Detail {
                page,
                slot,
                identifier,
            } => {
                let detail = DetailFetchTask::new(*slot, identifier.clone());
                self.process_detail(task, batch_id, *page, detail).await
            }
        }
    }

    async fn process_page(
        &self,
        task: &QueuedTask,
        batch_id: BatchId,
        page: u32,
    ) -> Result<(), WorkerError> {
        if self.pipeline.recorded(batch_id, page).await?.is_some() {
            debug!("Page already resolved, dropping redelivered task");
            self.queue.ack(task).await?;
            return Ok(());
        }

        // 重投的页面任务沿用首次登记的列表，槽位与标识符的对应关系不变
        let identifiers = match self.barrier.listing(batch_id, page).await? {
            Some(identifiers) => {
                debug!("Page already listed, fanning out from stored listing");
                identifiers
            }
            None => match self.pipeline.list(batch_id, page).await {
                Ok(listing) if listing.is_empty() => {
                    // 空页直接产出空产物，不经过屏障
                    self.pipeline
                        .aggregator()
                        .resolve(batch_id, page, 0, Vec::new())
                        .await?;
                    self.queue.ack(task).await?;
                    return Ok(());
                }
                Ok(listing) => self.barrier.open(batch_id, page, listing.identifiers).await?,
                Err(failure) if self.should_retry(task, &failure) => {
                    return self.schedule_retry(task, "page").await;
                }
                Err(failure) => {
                    self.pipeline.listing_failed(batch_id, page, failure).await?;
                    self.queue.ack(task).await?;
                    return Ok(());
                }
            },
        };

        let details = identifiers
            .iter()
            .enumerate()
            .map(|(slot, id)| TaskEnvelope::detail(batch_id, page, slot, id.as_str()))
            .collect();
        self.queue.enqueue_many(details).await?;
        info!(details = identifiers.len(), "Page fanned out");

        self.queue.ack(task).await?;
        Ok(())
    }

    async fn process_detail(
        &self,
        task: &QueuedTask,
        batch_id: BatchId,
        page: u32,
        detail: DetailFetchTask,
    ) -> Result<(), WorkerError> {
        let outcome = self.pipeline.detail(batch_id, &detail).await;

        if let DetailResult::Failed { failure } = &outcome.result {
            if self
                .retry_policy
                .should_retry(task.envelope.attempt, failure.retryable)
            {
                return self.schedule_retry(task, "detail").await;
            }
        }

        match self.barrier.arrive(batch_id, page, outcome).await? {
            Arrival::Released { expected, outcomes } => {
                self.pipeline
                    .aggregator()
                    .resolve(batch_id, page, expected, outcomes)
                    .await?;
                self.barrier.finish(batch_id, page).await?;
            }
            Arrival::Waiting { arrived, expected } => {
                debug!(arrived, expected, "Waiting for remaining details");
            }
            Arrival::AlreadyReleased => {
                debug!("Page already aggregated");
            }
            Arrival::Unknown => {
                warn!("No barrier for page, outcome dropped");
            }
        }

        self.queue.ack(task).await?;
        Ok(())
    }

    fn should_retry(&self, task: &QueuedTask, failure: &TaskFailure) -> bool {
        self.retry_policy
            .should_retry(task.envelope.attempt, failure.is_retryable())
    }

    async fn schedule_retry(&self, task: &QueuedTask, kind: &'static str) -> Result<(), WorkerError> {
        let next = task.envelope.next_attempt();
        let at = self.retry_policy.next_retry_time(next.attempt, Utc::now());
        info!(retry_at = %at, "Retryable failure, rescheduling");
        metrics::counter!("corp_crawler_task_retries_total", "kind" => kind).increment(1);
        self.queue.retry_later(task, next, at).await?;
        Ok(())
    }
}

#[async_trait]
impl<Q, B> Worker for CrawlWorker<Q, B>
where
    Q: TaskQueue + 'static,
    B: BarrierStore + 'static,
{
    async fn run(&self) -> Result<(), WorkerError> {
        info!("Crawl worker {} started", self.worker_id);

        loop {
            match self.process_next_task().await {
                Ok(processed) => {
                    if !processed {
                        sleep(self.idle_poll).await;
                    }
                }
                Err(e) => {
                    error!("Error processing task: {}", e);
                    sleep(self.idle_poll).await;
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
