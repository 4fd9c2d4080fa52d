// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 批次句柄
///
/// 提交时返回给调用方的不透明标识，用于之后查询批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BatchId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// 爬取作业
///
/// 一次页码范围的提交。由批次控制器在触发时创建，提交后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlJob {
    /// 作业ID，同时作为批次句柄
    id: BatchId,
    /// 有序、去重的页码集合
    pages: Vec<u32>,
    /// 提交时间
    submitted_at: DateTime<Utc>,
}

impl CrawlJob {
    /// 为闭区间 `[first_page, last_page]` 创建作业
    ///
    /// 调用方负责保证区间有效（页码从1开始且 first <= last）
    pub fn for_range(first_page: u32, last_page: u32) -> Self {
        Self::with_pages((first_page..=last_page).collect())
    }

    pub fn with_pages(mut pages: Vec<u32>) -> Self {
        pages.sort_unstable();
        pages.dedup();
        Self {
            id: BatchId::new(),
            pages,
            submitted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// 批次状态
///
/// 状态只会单向推进：Pending → InProgress → Completed。
/// 注意 Completed 只表示所有页面都已到达终态，并不代表所有页面都成功，
/// 需要逐页查看结果才能知道哪些页面失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// 已提交，尚无页面完成
    Pending,
    /// 部分页面已完成
    InProgress,
    /// 所有页面均已到达终态（成功或失败）
    Completed,
}

impl BatchStatus {
    /// 根据已解析页数与总页数推导批次状态
    pub fn from_counts(pages_resolved: usize, pages_total: usize) -> Self {
        if pages_resolved >= pages_total {
            BatchStatus::Completed
        } else if pages_resolved == 0 {
            BatchStatus::Pending
        } else {
            BatchStatus::InProgress
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "pending"),
            BatchStatus::InProgress => write!(f, "in_progress"),
            BatchStatus::Completed => write!(f, "completed"),
        }
    }
}

/// 批次进度快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_id: BatchId,
    pub status: BatchStatus,
    pub pages_total: usize,
    pub pages_resolved: usize,
    pub submitted_at: DateTime<Utc>,
}

impl BatchProgress {
    pub fn new(
        batch_id: BatchId,
        pages_total: usize,
        pages_resolved: usize,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_id,
            status: BatchStatus::from_counts(pages_resolved, pages_total),
            pages_total,
            pages_resolved,
            submitted_at,
        }
    }
}
