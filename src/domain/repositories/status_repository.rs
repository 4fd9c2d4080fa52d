// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::crawl_job::{BatchId, BatchProgress, CrawlJob};
use crate::domain::models::page::PageReport;

/// 状态存储错误类型
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupted batch state: {0}")]
    Corrupted(String),
}

/// 批次状态存储
///
/// 每个页面的解析结果只记录一次（先到者为准），记录操作在任意交错下都是原子的。
/// 批次状态由已记录页数推导，因此只会单调推进。
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// 登记新提交的作业
    async fn register(&self, job: &CrawlJob) -> Result<(), StatusError>;

    /// 记录一页的终态
    ///
    /// 返回 `true` 表示本次是首次记录；重复记录被忽略并返回 `false`。
    /// 未知批次同样返回 `false`。
    async fn record_page(&self, batch_id: BatchId, report: PageReport)
        -> Result<bool, StatusError>;

    /// 某一页已记录的报告，尚未记录或批次未知时返回 `None`
    async fn page_report(&self, batch_id: BatchId, page: u32)
        -> Result<Option<PageReport>, StatusError>;

    /// 查询批次进度，未知或已过期的批次返回 `None`
    async fn progress(&self, batch_id: BatchId) -> Result<Option<BatchProgress>, StatusError>;

    /// 已记录的页面报告（按页码排序），未知批次返回 `None`
    async fn page_reports(&self, batch_id: BatchId)
        -> Result<Option<Vec<PageReport>>, StatusError>;

    /// 请求取消批次，未知批次返回 `false`
    async fn request_cancel(&self, batch_id: BatchId) -> Result<bool, StatusError>;

    /// 批次是否已被请求取消
    async fn is_cancel_requested(&self, batch_id: BatchId) -> Result<bool, StatusError>;

    /// 撤销登记，之后该批次视为未知批次
    async fn discard(&self, batch_id: BatchId) -> Result<(), StatusError>;
}
