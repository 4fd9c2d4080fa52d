// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{crawl_settings, in_process_use_case, StubDirectory};
use corp_crawler::application::dto::crawl_request::CrawlRequestDto;
use corp_crawler::application::use_cases::crawl_use_case::CrawlUseCaseError;
use corp_crawler::domain::models::crawl_job::{BatchId, BatchStatus};
use corp_crawler::domain::models::page::{PageFailure, PageOutcome};
use corp_crawler::domain::repositories::storage_repository::{ArtifactSink, OnExisting};
use corp_crawler::infrastructure::storage::{InMemoryArtifactSink, LocalArtifactSink};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

fn ids(records: &[Value]) -> Vec<String> {
    records
        .iter()
        .map(|r| r["id"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn two_pages_produce_two_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(LocalArtifactSink::new(dir.path(), OnExisting::Overwrite));
    let directory = Arc::new(StubDirectory::new().page(1, &["a", "b"]).page(2, &["c"]));
    let (use_case, status) = in_process_use_case(directory, sink.clone(), crawl_settings(1, 2));

    let accepted = use_case
        .submit_batch(CrawlRequestDto::new(1, 2))
        .await
        .unwrap();
    assert_eq!(accepted.status, BatchStatus::Pending);
    assert_eq!(accepted.pages, vec![1, 2]);

    let progress = status.wait_for_completion(accepted.batch_id).await.unwrap();
    assert_eq!(progress.status, BatchStatus::Completed);
    assert_eq!(progress.pages_resolved, 2);

    let first = sink.read(1).await.unwrap().unwrap();
    assert_eq!(ids(&first.records), vec!["a", "b"]);
    assert_eq!(first.batch_id, accepted.batch_id);
    let second = sink.read(2).await.unwrap().unwrap();
    assert_eq!(ids(&second.records), vec!["c"]);

    let on_disk: Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("page-1.json")).unwrap()).unwrap();
    assert_eq!(on_disk["record_count"], 2);
    assert_eq!(on_disk["page"], 1);
}

#[tokio::test]
async fn failed_detail_fails_only_its_page() {
    let sink = Arc::new(InMemoryArtifactSink::new());
    let directory = Arc::new(
        StubDirectory::new()
            .page(1, &["a", "b"])
            .page(2, &["c"])
            .broken_detail("b"),
    );
    let (use_case, status) = in_process_use_case(directory, sink.clone(), crawl_settings(1, 2));

    let accepted = use_case
        .submit_batch(CrawlRequestDto::new(1, 2))
        .await
        .unwrap();
    let progress = status.wait_for_completion(accepted.batch_id).await.unwrap();
    assert_eq!(progress.status, BatchStatus::Completed);

    assert!(sink.read(1).await.unwrap().is_none());
    assert_eq!(sink.pages(), vec![2]);

    let reports = use_case.page_reports(accepted.batch_id).await.unwrap();
    let page_one = reports.pages.iter().find(|r| r.page == 1).unwrap();
    match page_one.failure() {
        Some(PageFailure::Details { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].identifier, "b");
            assert!(failures[0].cause.contains("404"));
        }
        other => panic!("unexpected failure: {:?}", other),
    }
}

#[tokio::test]
async fn listing_failure_skips_detail_fetches() {
    let sink = Arc::new(InMemoryArtifactSink::new());
    let directory = Arc::new(StubDirectory::new().page(1, &["a"]).broken_page(2));
    let (use_case, status) =
        in_process_use_case(directory.clone(), sink.clone(), crawl_settings(1, 2));

    let accepted = use_case
        .submit_batch(CrawlRequestDto::new(1, 2))
        .await
        .unwrap();
    status.wait_for_completion(accepted.batch_id).await.unwrap();

    let reports = use_case.page_reports(accepted.batch_id).await.unwrap();
    let page_two = reports.pages.iter().find(|r| r.page == 2).unwrap();
    assert!(matches!(
        page_two.failure(),
        Some(PageFailure::Listing { .. })
    ));
    assert_eq!(directory.total_detail_calls(), 1);
    assert_eq!(sink.pages(), vec![1]);
}

#[tokio::test]
async fn empty_page_is_a_success_with_no_records() {
    let sink = Arc::new(InMemoryArtifactSink::new());
    let directory = Arc::new(StubDirectory::new().page(3, &[]));
    let (use_case, status) = in_process_use_case(directory, sink.clone(), crawl_settings(3, 3));

    let accepted = use_case
        .submit_batch(CrawlRequestDto::new(3, 3))
        .await
        .unwrap();
    status.wait_for_completion(accepted.batch_id).await.unwrap();

    let artifact = sink.read(3).await.unwrap().unwrap();
    assert_eq!(artifact.record_count, 0);
    assert!(artifact.records.is_empty());

    let reports = use_case.page_reports(accepted.batch_id).await.unwrap();
    assert!(matches!(
        reports.pages[0].outcome,
        PageOutcome::Succeeded { record_count: 0, .. }
    ));
}

#[tokio::test]
async fn status_never_moves_backwards() {
    let sink = Arc::new(InMemoryArtifactSink::new());
    let directory = Arc::new(
        StubDirectory::new()
            .page(1, &["a"])
            .page(2, &["b"])
            .page(3, &["c"])
            .detail_delay(Duration::from_millis(20)),
    );
    let (use_case, _status) = in_process_use_case(directory, sink, crawl_settings(1, 3));

    let accepted = use_case
        .submit_batch(CrawlRequestDto::new(1, 3))
        .await
        .unwrap();

    let rank = |s: BatchStatus| match s {
        BatchStatus::Pending => 0,
        BatchStatus::InProgress => 1,
        BatchStatus::Completed => 2,
    };

    let mut last = 0;
    let mut last_resolved = 0;
    for _ in 0..200 {
        let status = use_case.batch_status(accepted.batch_id).await.unwrap();
        assert!(rank(status.status) >= last);
        assert!(status.pages_resolved >= last_resolved);
        last = rank(status.status);
        last_resolved = status.pages_resolved;
        if status.status == BatchStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(last, 2);
    assert_eq!(last_resolved, 3);
}

#[tokio::test]
async fn rerun_overwrites_previous_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(LocalArtifactSink::new(dir.path(), OnExisting::Overwrite));
    let directory = Arc::new(StubDirectory::new().page(1, &["a", "b"]));
    let (use_case, status) = in_process_use_case(directory, sink.clone(), crawl_settings(1, 1));

    let first = use_case
        .submit_batch(CrawlRequestDto::new(1, 1))
        .await
        .unwrap();
    status.wait_for_completion(first.batch_id).await.unwrap();

    let second = use_case
        .submit_batch(CrawlRequestDto::new(1, 1))
        .await
        .unwrap();
    status.wait_for_completion(second.batch_id).await.unwrap();

    let artifact = sink.read(1).await.unwrap().unwrap();
    assert_eq!(artifact.batch_id, second.batch_id);
    assert_eq!(ids(&artifact.records), vec!["a", "b"]);
}

#[tokio::test]
async fn cancelled_batch_still_completes() {
    let sink = Arc::new(InMemoryArtifactSink::new());
    let directory = Arc::new(StubDirectory::new().page(1, &["a"]).page(2, &["b"]));
    let (use_case, status) =
        in_process_use_case(directory.clone(), sink.clone(), crawl_settings(1, 2));

    // 单线程运行时：页面任务在下一次让出前不会开始
    let accepted = use_case
        .submit_batch(CrawlRequestDto::new(1, 2))
        .await
        .unwrap();
    use_case.cancel_batch(accepted.batch_id).await.unwrap();

    let progress = status.wait_for_completion(accepted.batch_id).await.unwrap();
    assert_eq!(progress.status, BatchStatus::Completed);

    let reports = use_case.page_reports(accepted.batch_id).await.unwrap();
    assert!(reports
        .pages
        .iter()
        .all(|r| r.failure() == Some(&PageFailure::Cancelled)));
    assert_eq!(directory.list_calls(), 0);
    assert!(sink.pages().is_empty());
}

#[tokio::test]
async fn invalid_ranges_are_rejected() {
    let sink = Arc::new(InMemoryArtifactSink::new());
    let (use_case, _status) =
        in_process_use_case(Arc::new(StubDirectory::new()), sink, crawl_settings(1, 2));

    let inverted = use_case.submit_batch(CrawlRequestDto::new(3, 1)).await;
    assert!(matches!(inverted, Err(CrawlUseCaseError::ValidationError(_))));

    let zero = use_case.submit_batch(CrawlRequestDto::new(0, 1)).await;
    assert!(matches!(zero, Err(CrawlUseCaseError::ValidationError(_))));

    let too_many = use_case.submit_batch(CrawlRequestDto::new(1, 50)).await;
    assert!(matches!(too_many, Err(CrawlUseCaseError::ValidationError(_))));
}

#[tokio::test]
async fn unknown_batch_is_reported() {
    let sink = Arc::new(InMemoryArtifactSink::new());
    let (use_case, _status) =
        in_process_use_case(Arc::new(StubDirectory::new()), sink, crawl_settings(1, 1));

    let unknown = BatchId::new();
    assert!(matches!(
        use_case.batch_status(unknown).await,
        Err(CrawlUseCaseError::UnknownBatch(id)) if id == unknown
    ));
    assert!(matches!(
        use_case.cancel_batch(unknown).await,
        Err(CrawlUseCaseError::UnknownBatch(_))
    ));
}
