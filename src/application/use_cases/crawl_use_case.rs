// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::application::dto::crawl_request::CrawlRequestDto;
use crate::application::dto::crawl_response::{BatchAcceptedDto, BatchStatusDto, PageReportsDto};
use crate::config::settings::CrawlSettings;
use crate::domain::models::crawl_job::{BatchId, BatchStatus, CrawlJob};
use crate::domain::repositories::status_repository::{StatusError, StatusStore};
use crate::queue::backend::{BackendError, ConcurrencyBackend};

#[derive(Error, Debug)]
pub enum CrawlUseCaseError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Unknown batch: {0}")]
    UnknownBatch(BatchId),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Status store error: {0}")]
    Status(#[from] StatusError),
}

/// 批次控制器
///
/// 把页码范围变成一个批次：登记到状态存储后交给并发后端，立即返回
pub struct CrawlUseCase {
    backend: Arc<dyn ConcurrencyBackend>,
    status: Arc<dyn StatusStore>,
    settings: CrawlSettings,
}

impl CrawlUseCase {
    pub fn new(
        backend: Arc<dyn ConcurrencyBackend>,
        status: Arc<dyn StatusStore>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            backend,
            status,
            settings,
        }
    }

    /// 提交批次
    ///
    /// 先登记再分发，页面结果到达时批次一定已存在；分发失败时撤销登记
    #[instrument(skip(self))]
    pub async fn submit_batch(
        &self,
        request: CrawlRequestDto,
    ) -> Result<BatchAcceptedDto, CrawlUseCaseError> {
        request
            .validate()
            .map_err(|e| CrawlUseCaseError::ValidationError(e.to_string()))?;

        let first_page = request.first_page.unwrap_or(self.settings.first_page);
        let last_page = request.last_page.unwrap_or(self.settings.last_page);
        if first_page > last_page {
            return Err(CrawlUseCaseError::ValidationError(format!(
                "first_page ({}) must not exceed last_page ({})",
                first_page, last_page
            )));
        }
        let page_count = (last_page - first_page) as usize + 1;
        if page_count > self.settings.max_pages_per_batch as usize {
            return Err(CrawlUseCaseError::ValidationError(format!(
                "batch of {} pages exceeds the limit of {}",
                page_count, self.settings.max_pages_per_batch
            )));
        }

        let job = CrawlJob::for_range(first_page, last_page);
        self.status.register(&job).await?;
        if let Err(e) = self.backend.submit(&job).await {
            if let Err(discard_err) = self.status.discard(job.id()).await {
                warn!(batch_id = %job.id(), error = %discard_err, "Failed to discard unsubmitted batch");
            }
            return Err(e.into());
        }

        metrics::counter!("corp_crawler_batches_submitted_total", "backend" => self.backend.name())
            .increment(1);
        info!(
            batch_id = %job.id(),
            first_page,
            last_page,
            backend = self.backend.name(),
            "Batch submitted"
        );

        Ok(BatchAcceptedDto {
            batch_id: job.id(),
            status: BatchStatus::Pending,
            pages: job.pages().to_vec(),
            message: "Batch process initiated".to_string(),
        })
    }

    /// 查询批次状态
    pub async fn batch_status(&self, batch_id: BatchId) -> Result<BatchStatusDto, CrawlUseCaseError> {
        self.status
            .progress(batch_id)
            .await?
            .map(BatchStatusDto::from)
            .ok_or(CrawlUseCaseError::UnknownBatch(batch_id))
    }

    /// 查询已解析页面的逐页结果
    pub async fn page_reports(&self, batch_id: BatchId) -> Result<PageReportsDto, CrawlUseCaseError> {
        let progress = self
            .status
            .progress(batch_id)
            .await?
            .ok_or(CrawlUseCaseError::UnknownBatch(batch_id))?;
        let pages = self
            .status
            .page_reports(batch_id)
            .await?
            .ok_or(CrawlUseCaseError::UnknownBatch(batch_id))?;

        Ok(PageReportsDto {
            batch_id,
            status: progress.status,
            pages,
        })
    }

    /// 请求取消批次
    ///
    /// 已在执行的远程调用不会被中断，尚未开始的任务直接以取消失败
    pub async fn cancel_batch(&self, batch_id: BatchId) -> Result<BatchStatusDto, CrawlUseCaseError> {
        if !self.status.request_cancel(batch_id).await? {
            return Err(CrawlUseCaseError::UnknownBatch(batch_id));
        }
        info!(%batch_id, "Batch cancellation requested");
        self.batch_status(batch_id).await
    }
}
