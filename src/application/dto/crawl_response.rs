// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

use crate::domain::models::crawl_job::{BatchId, BatchProgress, BatchStatus};
use crate::domain::models::page::PageReport;

/// 批次受理响应
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchAcceptedDto {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub pages: Vec<u32>,
    pub message: String,
}

/// 批次状态响应
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchStatusDto {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub pages_total: usize,
    pub pages_resolved: usize,
    pub message: String,
}

impl From<BatchProgress> for BatchStatusDto {
    fn from(progress: BatchProgress) -> Self {
        let message = match progress.status {
            BatchStatus::Pending => "Batch is waiting to start".to_string(),
            BatchStatus::InProgress => format!(
                "{} of {} pages resolved",
                progress.pages_resolved, progress.pages_total
            ),
            BatchStatus::Completed => "Batch process completed".to_string(),
        };
        Self {
            batch_id: progress.batch_id,
            status: progress.status,
            pages_total: progress.pages_total,
            pages_resolved: progress.pages_resolved,
            message,
        }
    }
}

/// 逐页结果响应
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageReportsDto {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub pages: Vec<PageReport>,
}
