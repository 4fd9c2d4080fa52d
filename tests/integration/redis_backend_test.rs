// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{redis_harness, StubDirectory};
use chrono::{Duration as ChronoDuration, Utc};
use corp_crawler::domain::models::crawl_job::{BatchId, BatchStatus, CrawlJob};
use corp_crawler::domain::models::page::{
    DetailFailure, DetailOutcome, DetailRecord, PageFailure, PageReport,
};
use corp_crawler::domain::repositories::status_repository::StatusStore;
use corp_crawler::domain::repositories::storage_repository::ArtifactSink;
use corp_crawler::domain::services::aggregator::Aggregator;
use corp_crawler::domain::services::pipeline::CrawlPipeline;
use corp_crawler::infrastructure::status_store::RedisStatusStore;
use corp_crawler::infrastructure::storage::InMemoryArtifactSink;
use corp_crawler::queue::backend::{ConcurrencyBackend, DurableBackend};
use corp_crawler::queue::barrier::{Arrival, BarrierStore, RedisBarrierStore};
use corp_crawler::queue::task_queue::{RedisTaskQueue, TaskEnvelope, TaskKind, TaskQueue};
use corp_crawler::utils::retry_policy::RetryPolicy;
use corp_crawler::workers::crawl_worker::CrawlWorker;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const TTL_SECS: u64 = 60;

fn fetched(slot: usize, id: &str) -> DetailOutcome {
    DetailOutcome::fetched(
        slot,
        DetailRecord {
            identifier: id.to_string(),
            payload: json!({ "id": id }),
        },
    )
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn redis_barrier_counts_slots_and_releases_once() {
    let Some(redis) = redis_harness().await else {
        return;
    };
    let barrier = RedisBarrierStore::new(redis.client.clone(), TTL_SECS, Duration::from_secs(30));
    let batch = BatchId::new();

    assert!(barrier.listing(batch, 1).await.unwrap().is_none());
    assert_eq!(
        barrier.arrive(batch, 1, fetched(0, "a")).await.unwrap(),
        Arrival::Unknown
    );

    let listing = barrier.open(batch, 1, ids(&["a", "b"])).await.unwrap();
    assert_eq!(listing, ids(&["a", "b"]));

    assert_eq!(
        barrier.arrive(batch, 1, fetched(1, "b")).await.unwrap(),
        Arrival::Waiting {
            arrived: 1,
            expected: 2
        }
    );
    let failed = DetailOutcome::failed(
        1,
        DetailFailure {
            identifier: "b".into(),
            cause: "timeout".into(),
            retryable: true,
        },
    );
    assert_eq!(
        barrier.arrive(batch, 1, failed).await.unwrap(),
        Arrival::Waiting {
            arrived: 1,
            expected: 2
        }
    );

    match barrier.arrive(batch, 1, fetched(0, "a")).await.unwrap() {
        Arrival::Released { expected, outcomes } => {
            assert_eq!(expected, 2);
            let mut slots: Vec<usize> = outcomes.iter().map(|o| o.slot).collect();
            slots.sort_unstable();
            assert_eq!(slots, vec![0, 1]);
        }
        other => panic!("expected release, got {:?}", other),
    }

    assert_eq!(
        barrier.arrive(batch, 1, fetched(0, "a")).await.unwrap(),
        Arrival::AlreadyReleased
    );
    barrier.finish(batch, 1).await.unwrap();
    assert_eq!(
        barrier.arrive(batch, 1, fetched(1, "b")).await.unwrap(),
        Arrival::AlreadyReleased
    );
}

#[tokio::test]
async fn redis_barrier_reopen_keeps_first_listing() {
    let Some(redis) = redis_harness().await else {
        return;
    };
    let barrier = RedisBarrierStore::new(redis.client.clone(), TTL_SECS, Duration::from_secs(30));
    let batch = BatchId::new();

    barrier.open(batch, 3, ids(&["x"])).await.unwrap();
    let reopened = barrier.open(batch, 3, ids(&["y", "x", "z"])).await.unwrap();

    assert_eq!(reopened, ids(&["x"]));
    assert_eq!(barrier.listing(batch, 3).await.unwrap(), Some(ids(&["x"])));
    assert!(matches!(
        barrier.arrive(batch, 3, fetched(0, "x")).await.unwrap(),
        Arrival::Released { expected: 1, .. }
    ));
}

#[tokio::test]
async fn redis_barrier_claim_lease_expires_without_finish() {
    let Some(redis) = redis_harness().await else {
        return;
    };
    let barrier =
        RedisBarrierStore::new(redis.client.clone(), TTL_SECS, Duration::from_millis(100));
    let batch = BatchId::new();
    barrier.open(batch, 2, ids(&["a"])).await.unwrap();

    assert!(matches!(
        barrier.arrive(batch, 2, fetched(0, "a")).await.unwrap(),
        Arrival::Released { .. }
    ));
    assert_eq!(
        barrier.arrive(batch, 2, fetched(0, "a")).await.unwrap(),
        Arrival::AlreadyReleased
    );

    // 聚合方没有调用 finish 就退出了
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(matches!(
        barrier.arrive(batch, 2, fetched(0, "a")).await.unwrap(),
        Arrival::Released { expected: 1, .. }
    ));
}

#[tokio::test]
async fn redis_status_store_keeps_first_report() {
    let Some(redis) = redis_harness().await else {
        return;
    };
    let status = RedisStatusStore::new(redis.client.clone(), TTL_SECS);
    let job = CrawlJob::for_range(1, 2);
    status.register(&job).await.unwrap();

    let progress = status.progress(job.id()).await.unwrap().unwrap();
    assert_eq!(progress.status, BatchStatus::Pending);
    assert_eq!(progress.pages_total, 2);

    let first = PageReport::succeeded(1, 2, "out/page_1.json".into(), false);
    assert!(status.record_page(job.id(), first.clone()).await.unwrap());
    let late = PageReport::failed(
        1,
        PageFailure::Listing {
            cause: "late".into(),
        },
    );
    assert!(!status.record_page(job.id(), late).await.unwrap());
    assert_eq!(status.page_report(job.id(), 1).await.unwrap(), Some(first));
    assert!(status.page_report(job.id(), 2).await.unwrap().is_none());

    let progress = status.progress(job.id()).await.unwrap().unwrap();
    assert_eq!(progress.status, BatchStatus::InProgress);

    assert!(status
        .record_page(job.id(), PageReport::failed(2, PageFailure::Cancelled))
        .await
        .unwrap());
    let progress = status.progress(job.id()).await.unwrap().unwrap();
    assert_eq!(progress.status, BatchStatus::Completed);
    assert_eq!(progress.pages_resolved, 2);

    let reports = status.page_reports(job.id()).await.unwrap().unwrap();
    let pages: Vec<u32> = reports.iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 2]);
}

#[tokio::test]
async fn redis_status_store_cancel_and_discard() {
    let Some(redis) = redis_harness().await else {
        return;
    };
    let status = RedisStatusStore::new(redis.client.clone(), TTL_SECS);

    let unknown = BatchId::new();
    assert!(status.progress(unknown).await.unwrap().is_none());
    assert!(status.page_reports(unknown).await.unwrap().is_none());
    assert!(!status.request_cancel(unknown).await.unwrap());
    assert!(!status
        .record_page(unknown, PageReport::failed(1, PageFailure::Cancelled))
        .await
        .unwrap());

    let job = CrawlJob::for_range(1, 1);
    status.register(&job).await.unwrap();
    assert!(!status.is_cancel_requested(job.id()).await.unwrap());
    assert!(status.request_cancel(job.id()).await.unwrap());
    assert!(status.is_cancel_requested(job.id()).await.unwrap());

    status.discard(job.id()).await.unwrap();
    assert!(status.progress(job.id()).await.unwrap().is_none());
    assert!(!status.is_cancel_requested(job.id()).await.unwrap());
}

#[tokio::test]
async fn redis_queue_moves_tasks_through_processing_and_delayed() {
    let Some(redis) = redis_harness().await else {
        return;
    };
    let queue = RedisTaskQueue::new(redis.client.clone());
    let batch = BatchId::new();
    queue
        .enqueue_many(vec![TaskEnvelope::page(batch, 1), TaskEnvelope::page(batch, 2)])
        .await
        .unwrap();
    assert_eq!(queue.len().await.unwrap(), 2);

    let first = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(first.envelope.page_number(), 1);

    let now = Utc::now();
    queue
        .retry_later(&first, first.envelope.next_attempt(), now + ChronoDuration::seconds(5))
        .await
        .unwrap();
    assert_eq!(queue.promote_due(now).await.unwrap(), 0);

    // 出队后未确认的任务在重启时放回
    let second = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(second.envelope.page_number(), 2);
    assert_eq!(queue.requeue_processing().await.unwrap(), 1);
    assert_eq!(queue.requeue_processing().await.unwrap(), 0);

    assert_eq!(
        queue.promote_due(now + ChronoDuration::seconds(6)).await.unwrap(),
        1
    );
    assert_eq!(queue.len().await.unwrap(), 2);

    let again = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(again.envelope.page_number(), 2);
    assert_eq!(again.envelope.attempt, 0);
    let retried = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(retried.envelope.page_number(), 1);
    assert_eq!(retried.envelope.attempt, 1);
    assert_eq!(retried.envelope.id, first.envelope.id);

    queue.ack(&again).await.unwrap();
    queue.ack(&retried).await.unwrap();
    assert!(queue.dequeue().await.unwrap().is_none());
    assert_eq!(queue.requeue_processing().await.unwrap(), 0);
}

#[tokio::test]
async fn redis_durable_run_retries_and_writes_every_page() {
    let Some(redis) = redis_harness().await else {
        return;
    };
    let directory = Arc::new(
        StubDirectory::new()
            .page(1, &["a", "b"])
            .page(2, &["c"])
            .flaky_detail("b", 1),
    );
    let queue = Arc::new(RedisTaskQueue::new(redis.client.clone()));
    let status = Arc::new(RedisStatusStore::new(redis.client.clone(), TTL_SECS));
    let sink = Arc::new(InMemoryArtifactSink::new());
    let aggregator = Aggregator::new(sink.clone(), status.clone());
    let pipeline = Arc::new(CrawlPipeline::new(
        directory.clone(),
        aggregator,
        status.clone(),
    ));
    let worker = CrawlWorker::new(
        queue.clone(),
        Arc::new(RedisBarrierStore::new(
            redis.client.clone(),
            TTL_SECS,
            Duration::from_secs(30),
        )),
        pipeline,
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::ZERO,
            enable_jitter: false,
            ..RetryPolicy::default()
        },
        Duration::from_millis(10),
    );

    let job = CrawlJob::for_range(1, 2);
    status.register(&job).await.unwrap();
    DurableBackend::new(queue.clone()).submit(&job).await.unwrap();

    loop {
        while worker.process_next_task().await.unwrap() {}
        if queue.promote_due(Utc::now()).await.unwrap() == 0 {
            break;
        }
    }

    let progress = status.progress(job.id()).await.unwrap().unwrap();
    assert_eq!(progress.status, BatchStatus::Completed);
    assert_eq!(directory.detail_calls("b"), 2);

    let artifact = sink.read(1).await.unwrap().unwrap();
    assert_eq!(artifact.record_count, 2);
    assert_eq!(artifact.records[0]["id"], "a");
    assert_eq!(artifact.records[1]["id"], "b");
    assert_eq!(sink.read(2).await.unwrap().unwrap().record_count, 1);
    assert_eq!(queue.requeue_processing().await.unwrap(), 0);

    // 任务种类经 Redis 往返后保持不变
    queue
        .enqueue_many(vec![TaskEnvelope::detail(job.id(), 1, 0, "a")])
        .await
        .unwrap();
    let task = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(
        task.envelope.kind,
        TaskKind::Detail {
            page: 1,
            slot: 0,
            identifier: "a".to_string()
        }
    );
    queue.ack(&task).await.unwrap();
}
