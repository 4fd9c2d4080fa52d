// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tracing::warn;

use super::aggregator::Aggregator;
use super::fetch_tasks::{DetailFetchTask, PageFetchTask, TaskFailure};
use crate::directory::DirectoryClient;
use crate::domain::models::crawl_job::BatchId;
use crate::domain::models::page::{DetailOutcome, PageFailure, PageFetchResult, PageReport};
use crate::domain::repositories::status_repository::{StatusError, StatusStore};

/// 爬取流水线
///
/// 把目录客户端、聚合器和状态存储组合在一起，供两种并发后端共用。
/// 后端只决定任务在哪里执行以及如何汇合，任务本身的语义都在这里。
pub struct CrawlPipeline {
    client: Arc<dyn DirectoryClient>,
    aggregator: Aggregator,
    status: Arc<dyn StatusStore>,
}

impl CrawlPipeline {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        aggregator: Aggregator,
        status: Arc<dyn StatusStore>,
    ) -> Self {
        Self {
            client,
            aggregator,
            status,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// 执行页面抓取任务
    pub async fn list(
        &self,
        batch_id: BatchId,
        page: u32,
    ) -> Result<PageFetchResult, TaskFailure> {
        if self.cancelled(batch_id).await {
            return Err(TaskFailure::Cancelled);
        }
        PageFetchTask::new(page)
            .run(self.client.as_ref())
            .await
            .map_err(|e| TaskFailure::from(&e))
    }

    /// 执行详情抓取任务
    pub async fn detail(&self, batch_id: BatchId, task: &DetailFetchTask) -> DetailOutcome {
        if self.cancelled(batch_id).await {
            return task.failure(TaskFailure::Cancelled);
        }
        task.run(self.client.as_ref()).await
    }

    /// 页面已记录的报告
    pub async fn recorded(
        &self,
        batch_id: BatchId,
        page: u32,
    ) -> Result<Option<PageReport>, StatusError> {
        self.status.page_report(batch_id, page).await
    }

    /// 页面抓取任务最终失败：该页不发起任何详情任务
    pub async fn listing_failed(
        &self,
        batch_id: BatchId,
        page: u32,
        failure: TaskFailure,
    ) -> Result<PageReport, StatusError> {
        let failure = match failure {
            TaskFailure::Cancelled => PageFailure::Cancelled,
            TaskFailure::Failed { cause, .. } => PageFailure::Listing { cause },
        };
        self.aggregator.resolve_failure(batch_id, page, failure).await
    }

    async fn cancelled(&self, batch_id: BatchId) -> bool {
        match self.status.is_cancel_requested(batch_id).await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                warn!(%batch_id, error = %e, "Could not read cancel flag, continuing");
                false
            }
        }
    }
}
