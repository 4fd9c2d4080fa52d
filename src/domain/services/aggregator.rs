// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::fetch_tasks::CANCELLED_CAUSE;
use crate::domain::models::crawl_job::BatchId;
use crate::domain::models::page::{
    DetailFailure, DetailOutcome, DetailRecord, DetailResult, PageArtifact, PageFailure,
    PageReport,
};
use crate::domain::repositories::status_repository::{StatusError, StatusStore};
use crate::domain::repositories::storage_repository::ArtifactSink;

/// 聚合器
///
/// 屏障的后续动作：拿到一页全部 M 个详情终态后，全部成功才写产物，
/// 任何失败都整页失败且不写部分产物。结果交给状态存储记录。
/// 两种并发后端都调用同一个聚合器。
#[derive(Clone)]
pub struct Aggregator {
    sink: Arc<dyn ArtifactSink>,
    status: Arc<dyn StatusStore>,
}

impl Aggregator {
    pub fn new(sink: Arc<dyn ArtifactSink>, status: Arc<dyn StatusStore>) -> Self {
        Self { sink, status }
    }

    /// 处理一页的全部详情终态
    ///
    /// `expected` 是列表返回的标识符个数；`outcomes` 必须恰好覆盖槽位 `0..expected`。
    /// 页面已有记录时直接返回已记录的报告，不再写产物
    pub async fn resolve(
        &self,
        batch_id: BatchId,
        page: u32,
        expected: usize,
        outcomes: Vec<DetailOutcome>,
    ) -> Result<PageReport, StatusError> {
        if let Some(existing) = self.status.page_report(batch_id, page).await? {
            debug!(%batch_id, page, "Page already resolved, skipping artifact write");
            return Ok(existing);
        }

        let report = match Self::collect(expected, outcomes) {
            Ok(records) => {
                let artifact = PageArtifact::new(batch_id, page, records);
                match self.sink.write(&artifact).await {
                    Ok(receipt) => {
                        info!(
                            %batch_id,
                            page,
                            records = artifact.record_count,
                            location = %receipt.location,
                            skipped = receipt.skipped,
                            "Page artifact persisted"
                        );
                        PageReport::succeeded(
                            page,
                            artifact.record_count,
                            receipt.location,
                            receipt.skipped,
                        )
                    }
                    Err(e) => {
                        error!(%batch_id, page, error = %e, "Failed to persist page artifact");
                        PageReport::failed(page, PageFailure::Persistence { cause: e.to_string() })
                    }
                }
            }
            Err(failures) if failures.iter().all(|f| f.cause == CANCELLED_CAUSE) => {
                PageReport::failed(page, PageFailure::Cancelled)
            }
            Err(failures) => {
                warn!(
                    %batch_id,
                    page,
                    failed = failures.len(),
                    expected,
                    "Page failed, discarding partial results"
                );
                PageReport::failed(page, PageFailure::Details { failures })
            }
        };

        self.record(batch_id, report).await
    }

    /// 页面在扇出前就失败（列表失败或已取消）
    pub async fn resolve_failure(
        &self,
        batch_id: BatchId,
        page: u32,
        failure: PageFailure,
    ) -> Result<PageReport, StatusError> {
        warn!(%batch_id, page, %failure, "Page failed before fan-out");
        self.record(batch_id, PageReport::failed(page, failure)).await
    }

    async fn record(
        &self,
        batch_id: BatchId,
        report: PageReport,
    ) -> Result<PageReport, StatusError> {
        let outcome = if report.is_success() { "succeeded" } else { "failed" };
        let first = self.status.record_page(batch_id, report.clone()).await?;
        if first {
            metrics::counter!("corp_crawler_pages_total", "outcome" => outcome).increment(1);
        } else {
            warn!(%batch_id, page = report.page, "Page outcome already recorded, ignoring");
        }
        Ok(report)
    }

    /// 按槽位排序并检查完整性；全部成功时返回按列表顺序排列的记录
    fn collect(
        expected: usize,
        mut outcomes: Vec<DetailOutcome>,
    ) -> Result<Vec<DetailRecord>, Vec<DetailFailure>> {
        outcomes.sort_by_key(|o| o.slot);
        outcomes.dedup_by_key(|o| o.slot);

        let mut records = Vec::with_capacity(expected);
        let mut failures = Vec::new();
        let mut next_slot = 0;

        for outcome in outcomes {
            if outcome.slot >= expected {
                continue;
            }
            for missing in next_slot..outcome.slot {
                failures.push(Self::missing(missing));
            }
            next_slot = outcome.slot + 1;

            match outcome.result {
                DetailResult::Fetched { record } => records.push(record),
                DetailResult::Failed { failure } => failures.push(failure),
            }
        }
        for missing in next_slot..expected {
            failures.push(Self::missing(missing));
        }

        if failures.is_empty() {
            Ok(records)
        } else {
            Err(failures)
        }
    }

    fn missing(slot: usize) -> DetailFailure {
        DetailFailure {
            identifier: format!("#{}", slot),
            cause: "no outcome received".to_string(),
            retryable: false,
        }
    }
}

#[cfg(test)]
#[path = "aggregator_test.rs"]
mod tests;
