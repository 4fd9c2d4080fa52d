// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{pipeline, StubDirectory};
use chrono::Utc;
use corp_crawler::domain::models::crawl_job::{BatchStatus, CrawlJob};
use corp_crawler::domain::models::page::PageFailure;
use corp_crawler::domain::repositories::status_repository::StatusStore;
use corp_crawler::domain::repositories::storage_repository::ArtifactSink;
use corp_crawler::infrastructure::status_store::InMemoryStatusStore;
use corp_crawler::infrastructure::storage::InMemoryArtifactSink;
use corp_crawler::queue::backend::{ConcurrencyBackend, DurableBackend};
use corp_crawler::queue::barrier::InMemoryBarrierStore;
use corp_crawler::queue::task_queue::{InMemoryTaskQueue, TaskEnvelope, TaskKind, TaskQueue};
use corp_crawler::utils::retry_policy::RetryPolicy;
use corp_crawler::workers::crawl_worker::CrawlWorker;
use std::sync::Arc;
use std::time::Duration;

struct DurableHarness {
    queue: Arc<InMemoryTaskQueue>,
    status: Arc<InMemoryStatusStore>,
    sink: Arc<InMemoryArtifactSink>,
    worker: CrawlWorker<InMemoryTaskQueue, InMemoryBarrierStore>,
    backend: DurableBackend<InMemoryTaskQueue>,
}

impl DurableHarness {
    fn new(directory: Arc<StubDirectory>, max_retries: u32) -> Self {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let status = Arc::new(InMemoryStatusStore::new());
        let sink = Arc::new(InMemoryArtifactSink::new());
        let retry_policy = RetryPolicy {
            max_retries,
            initial_backoff: Duration::ZERO,
            enable_jitter: false,
            ..RetryPolicy::default()
        };
        let worker = CrawlWorker::new(
            queue.clone(),
            Arc::new(InMemoryBarrierStore::new()),
            pipeline(directory, sink.clone(), status.clone()),
            retry_policy,
            Duration::from_millis(10),
        );
        Self {
            backend: DurableBackend::new(queue.clone()),
            queue,
            status,
            sink,
            worker,
        }
    }

    async fn submit(&self, first: u32, last: u32) -> CrawlJob {
        let job = CrawlJob::for_range(first, last);
        self.status.register(&job).await.unwrap();
        self.backend.submit(&job).await.unwrap();
        job
    }

    /// 处理到队列与延迟集合都为空
    async fn drain(&self) {
        loop {
            while self.worker.process_next_task().await.unwrap() {}
            if self.queue.promote_due(Utc::now()).await.unwrap() == 0 {
                break;
            }
        }
    }
}

#[tokio::test]
async fn durable_run_writes_every_page() {
    let directory = Arc::new(StubDirectory::new().page(1, &["a", "b"]).page(2, &["c"]));
    let harness = DurableHarness::new(directory, 3);

    let job = harness.submit(1, 2).await;
    assert_eq!(harness.queue.len().await.unwrap(), 2);
    harness.drain().await;

    let progress = harness.status.progress(job.id()).await.unwrap().unwrap();
    assert_eq!(progress.status, BatchStatus::Completed);
    assert_eq!(harness.sink.pages(), vec![1, 2]);
    assert_eq!(harness.sink.read(1).await.unwrap().unwrap().record_count, 2);
    assert_eq!(harness.queue.in_flight().await, 0);
}

#[tokio::test]
async fn transient_failures_are_retried_transparently() {
    let directory = Arc::new(StubDirectory::new().page(1, &["a", "b"]).flaky_detail("b", 2));
    let harness = DurableHarness::new(directory.clone(), 3);

    let job = harness.submit(1, 1).await;
    harness.drain().await;

    assert_eq!(directory.detail_calls("b"), 3);
    let artifact = harness.sink.read(1).await.unwrap().unwrap();
    assert_eq!(artifact.record_count, 2);
    assert_eq!(artifact.records[1]["id"], "b");

    let reports = harness.status.page_reports(job.id()).await.unwrap().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_success());
    assert_eq!(harness.queue.delayed().await, 0);
}

#[tokio::test]
async fn retries_are_bounded() {
    let directory = Arc::new(StubDirectory::new().page(1, &["a"]).flaky_detail("a", 10));
    let harness = DurableHarness::new(directory.clone(), 2);

    let job = harness.submit(1, 1).await;
    harness.drain().await;

    assert_eq!(directory.detail_calls("a"), 3);
    let reports = harness.status.page_reports(job.id()).await.unwrap().unwrap();
    match reports[0].failure() {
        Some(PageFailure::Details { failures }) => {
            assert_eq!(failures[0].identifier, "a");
            assert!(failures[0].retryable);
        }
        other => panic!("unexpected failure: {:?}", other),
    }
    assert!(harness.sink.pages().is_empty());
}

#[tokio::test]
async fn listing_failure_without_retries_fails_page() {
    let directory = Arc::new(StubDirectory::new().broken_page(1));
    let harness = DurableHarness::new(directory.clone(), 0);

    let job = harness.submit(1, 1).await;
    harness.drain().await;

    assert_eq!(directory.list_calls(), 1);
    let reports = harness.status.page_reports(job.id()).await.unwrap().unwrap();
    assert!(matches!(
        reports[0].failure(),
        Some(PageFailure::Listing { .. })
    ));
}

#[tokio::test]
async fn redelivered_detail_counts_once() {
    let directory = Arc::new(StubDirectory::new().page(1, &["a", "b"]));
    let harness = DurableHarness::new(directory.clone(), 3);

    let job = harness.submit(1, 1).await;
    // 页面任务扇出两个详情任务
    assert!(harness.worker.process_next_task().await.unwrap());
    assert!(harness.worker.process_next_task().await.unwrap());

    // 取出一个详情任务后模拟进程崩溃，未确认的任务在重启时被放回
    let lost = harness.queue.dequeue().await.unwrap().unwrap();
    assert!(matches!(lost.envelope.kind, TaskKind::Detail { .. }));
    assert_eq!(harness.queue.requeue_processing().await.unwrap(), 1);

    harness.drain().await;

    let reports = harness.status.page_reports(job.id()).await.unwrap().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_success());
    assert_eq!(harness.sink.writes(), 1);
    assert_eq!(harness.sink.read(1).await.unwrap().unwrap().record_count, 2);
}

#[tokio::test]
async fn duplicated_detail_delivery_does_not_release_early() {
    let directory = Arc::new(StubDirectory::new().page(1, &["a", "b", "c"]));
    let harness = DurableHarness::new(directory.clone(), 3);

    let job = harness.submit(1, 1).await;
    assert!(harness.worker.process_next_task().await.unwrap());

    let mut details = Vec::new();
    while let Some(task) = harness.queue.dequeue().await.unwrap() {
        harness.queue.ack(&task).await.unwrap();
        details.push(task.envelope);
    }
    assert_eq!(details.len(), 3);

    // 第一个详情任务被投递两次
    harness
        .queue
        .enqueue_many(vec![details[0].clone(), details[0].clone()])
        .await
        .unwrap();
    assert!(harness.worker.process_next_task().await.unwrap());
    assert!(harness.worker.process_next_task().await.unwrap());
    let progress = harness.status.progress(job.id()).await.unwrap().unwrap();
    assert_eq!(progress.pages_resolved, 0);

    harness
        .queue
        .enqueue_many(details[1..].to_vec())
        .await
        .unwrap();
    harness.drain().await;
    let progress = harness.status.progress(job.id()).await.unwrap().unwrap();
    assert_eq!(progress.status, BatchStatus::Completed);
    assert_eq!(harness.sink.read(1).await.unwrap().unwrap().record_count, 3);
}

#[tokio::test]
async fn empty_page_resolves_without_fan_out() {
    let directory = Arc::new(StubDirectory::new().page(4, &[]));
    let harness = DurableHarness::new(directory, 3);

    let job = harness.submit(4, 4).await;
    harness.drain().await;

    let progress = harness.status.progress(job.id()).await.unwrap().unwrap();
    assert_eq!(progress.status, BatchStatus::Completed);
    assert_eq!(harness.sink.read(4).await.unwrap().unwrap().record_count, 0);
}

#[tokio::test]
async fn redelivered_page_fans_out_from_first_listing() {
    let directory = Arc::new(
        StubDirectory::new()
            .page(1, &["a", "b"])
            .reordered_on_relist(1),
    );
    let harness = DurableHarness::new(directory.clone(), 3);

    let job = harness.submit(1, 1).await;
    assert!(harness.worker.process_next_task().await.unwrap());

    // 第一个详情任务完成，第二个随崩溃的工作进程丢失，页面任务被再次投递
    assert!(harness.worker.process_next_task().await.unwrap());
    let lost = harness.queue.dequeue().await.unwrap().unwrap();
    harness.queue.ack(&lost).await.unwrap();
    harness
        .queue
        .enqueue_many(vec![TaskEnvelope::page(job.id(), 1)])
        .await
        .unwrap();
    harness.drain().await;

    assert_eq!(directory.list_calls(), 1);
    let artifact = harness.sink.read(1).await.unwrap().unwrap();
    let ids: Vec<&str> = artifact
        .records
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn redelivered_failed_page_stays_failed_without_artifact() {
    let directory = Arc::new(StubDirectory::new().page(1, &["a", "b"]).flaky_page(1, 1));
    let harness = DurableHarness::new(directory.clone(), 0);

    let job = harness.submit(1, 1).await;
    harness.drain().await;

    harness
        .queue
        .enqueue_many(vec![TaskEnvelope::page(job.id(), 1)])
        .await
        .unwrap();
    harness.drain().await;

    assert_eq!(directory.list_calls(), 1);
    assert_eq!(directory.total_detail_calls(), 0);
    assert!(harness.sink.pages().is_empty());
    let reports = harness.status.page_reports(job.id()).await.unwrap().unwrap();
    assert!(matches!(
        reports[0].failure(),
        Some(PageFailure::Listing { .. })
    ));
    assert_eq!(harness.queue.in_flight().await, 0);
}
