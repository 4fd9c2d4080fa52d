// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;
use tracing::{debug, warn};

use crate::directory::{ClientError, DirectoryClient};
use crate::domain::models::page::{DetailFailure, DetailOutcome, PageFetchResult};

/// 取消后任务失败的原因文本
pub const CANCELLED_CAUSE: &str = "batch cancelled";

/// 任务级失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// 批次已取消，任务没有调用远程服务
    Cancelled,
    /// 远程调用失败
    Failed { cause: String, retryable: bool },
}

impl TaskFailure {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskFailure::Failed { retryable: true, .. })
    }

    pub fn cause(&self) -> &str {
        match self {
            TaskFailure::Cancelled => CANCELLED_CAUSE,
            TaskFailure::Failed { cause, .. } => cause,
        }
    }
}

impl From<&ClientError> for TaskFailure {
    fn from(err: &ClientError) -> Self {
        TaskFailure::Failed {
            cause: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.cause())
    }
}

/// 页面抓取任务：一次列表调用
#[derive(Debug, Clone, Copy)]
pub struct PageFetchTask {
    page: u32,
}

impl PageFetchTask {
    pub fn new(page: u32) -> Self {
        Self { page }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// 失败时直接返回错误；空页是合法结果，与失败不同
    pub async fn run(&self, client: &dyn DirectoryClient) -> Result<PageFetchResult, ClientError> {
        let identifiers = client.list_page(self.page).await?;
        debug!(page = self.page, count = identifiers.len(), "Page listed");
        Ok(PageFetchResult::new(self.page, identifiers))
    }
}

/// 详情抓取任务：一次详情调用，是扇出的单位
#[derive(Debug, Clone)]
pub struct DetailFetchTask {
    slot: usize,
    identifier: String,
}

impl DetailFetchTask {
    pub fn new(slot: usize, identifier: impl Into<String>) -> Self {
        Self {
            slot,
            identifier: identifier.into(),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// 执行并返回终态，失败时携带标识符与原因
    pub async fn run(&self, client: &dyn DirectoryClient) -> DetailOutcome {
        match client.fetch_detail(&self.identifier).await {
            Ok(record) => {
                metrics::counter!("corp_crawler_details_total", "outcome" => "fetched")
                    .increment(1);
                DetailOutcome::fetched(self.slot, record)
            }
            Err(e) => {
                warn!(identifier = %self.identifier, error = %e, "Detail fetch failed");
                metrics::counter!("corp_crawler_details_total", "outcome" => "failed")
                    .increment(1);
                self.failure(TaskFailure::from(&e))
            }
        }
    }

    /// 以给定失败构造终态
    pub fn failure(&self, failure: TaskFailure) -> DetailOutcome {
        DetailOutcome::failed(
            self.slot,
            DetailFailure {
                identifier: self.identifier.clone(),
                retryable: failure.is_retryable(),
                cause: failure.cause().to_string(),
            },
        )
    }
}
