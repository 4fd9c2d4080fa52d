// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::crawl_job::BatchId;

/// 单页列表结果
///
/// 标识符顺序与远程服务返回顺序一致，不保证多次调用之间稳定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFetchResult {
    pub page: u32,
    pub identifiers: Vec<String>,
}

impl PageFetchResult {
    pub fn new(page: u32, identifiers: Vec<String>) -> Self {
        Self { page, identifiers }
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

/// 单个实体的详情记录
///
/// `payload` 的结构由远程服务决定，这里原样透传
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub identifier: String,
    pub payload: Value,
}

/// 详情抓取失败，携带标识符以便归因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailFailure {
    pub identifier: String,
    pub cause: String,
    /// 失败是否可由后端重试（超时、连接错误、5xx 等）
    #[serde(default)]
    pub retryable: bool,
}

impl fmt::Display for DetailFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.identifier, self.cause)
    }
}

/// 详情任务的终态
///
/// `slot` 是标识符在页面列表中的位置，屏障以它计数，
/// 因此同一个任务被重试或重投只会计一次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailOutcome {
    pub slot: usize,
    #[serde(flatten)]
    pub result: DetailResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DetailResult {
    Fetched { record: DetailRecord },
    Failed { failure: DetailFailure },
}

impl DetailOutcome {
    pub fn fetched(slot: usize, record: DetailRecord) -> Self {
        Self {
            slot,
            result: DetailResult::Fetched { record },
        }
    }

    pub fn failed(slot: usize, failure: DetailFailure) -> Self {
        Self {
            slot,
            result: DetailResult::Failed { failure },
        }
    }
}

/// 页面产物
///
/// 一个聚合器收集到的全部详情记录，记录按列表顺序排列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageArtifact {
    pub batch_id: BatchId,
    pub page: u32,
    pub written_at: DateTime<Utc>,
    pub record_count: usize,
    pub records: Vec<Value>,
}

impl PageArtifact {
    pub fn new(batch_id: BatchId, page: u32, records: Vec<DetailRecord>) -> Self {
        let records: Vec<Value> = records.into_iter().map(|r| r.payload).collect();
        Self {
            batch_id,
            page,
            written_at: Utc::now(),
            record_count: records.len(),
            records,
        }
    }
}

/// 页面失败原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageFailure {
    /// 列表请求本身失败，该页没有发起任何详情任务
    Listing { cause: String },
    /// 至少一个详情任务失败，不写入部分产物
    Details { failures: Vec<DetailFailure> },
    /// 全部详情成功但产物写入失败
    Persistence { cause: String },
    /// 批次已被取消
    Cancelled,
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PageFailure::Listing { cause } => write!(f, "listing failed: {}", cause),
            PageFailure::Details { failures } => {
                write!(f, "{} detail fetch(es) failed", failures.len())?;
                if let Some(first) = failures.first() {
                    write!(f, " (first: {})", first)?;
                }
                Ok(())
            }
            PageFailure::Persistence { cause } => write!(f, "persistence failed: {}", cause),
            PageFailure::Cancelled => write!(f, "batch cancelled"),
        }
    }
}

/// 页面终态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageOutcome {
    Succeeded {
        record_count: usize,
        /// 产物位置；按 `skip` 策略跳过写入时为已有产物的位置
        location: String,
        #[serde(default)]
        skipped: bool,
    },
    Failed {
        failure: PageFailure,
    },
}

/// 页面报告，由聚合器交给状态存储
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    pub page: u32,
    #[serde(flatten)]
    pub outcome: PageOutcome,
    pub resolved_at: DateTime<Utc>,
}

impl PageReport {
    pub fn succeeded(page: u32, record_count: usize, location: String, skipped: bool) -> Self {
        Self {
            page,
            outcome: PageOutcome::Succeeded {
                record_count,
                location,
                skipped,
            },
            resolved_at: Utc::now(),
        }
    }

    pub fn failed(page: u32, failure: PageFailure) -> Self {
        Self {
            page,
            outcome: PageOutcome::Failed { failure },
            resolved_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PageOutcome::Succeeded { .. })
    }

    pub fn failure(&self) -> Option<&PageFailure> {
        match &self.outcome {
            PageOutcome::Failed { failure } => Some(failure),
            PageOutcome::Succeeded { .. } => None,
        }
    }
}
