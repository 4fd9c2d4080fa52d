// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::Script;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

use super::redis_client::RedisClient;
use crate::domain::models::crawl_job::{BatchId, BatchProgress, CrawlJob};
use crate::domain::models::page::PageReport;
use crate::domain::repositories::status_repository::{StatusError, StatusStore};

struct BatchEntry {
    pages: Vec<u32>,
    submitted_at: DateTime<Utc>,
    reports: BTreeMap<u32, PageReport>,
    cancel_requested: bool,
    resolved_tx: watch::Sender<usize>,
}

impl BatchEntry {
    fn progress(&self, batch_id: BatchId) -> BatchProgress {
        BatchProgress::new(
            batch_id,
            self.pages.len(),
            self.reports.len(),
            self.submitted_at,
        )
    }
}

const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// 进程内状态存储
///
/// 每条记录在 DashMap 分片锁内完成，解析计数通过 watch 通道通知等待者。
/// 与 Redis 存储一致，批次在提交 `ttl` 之后视为未知批次，登记新批次时清理过期条目
pub struct InMemoryStatusStore {
    batches: DashMap<BatchId, BatchEntry>,
    ttl: chrono::Duration,
}

impl Default for InMemoryStatusStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            batches: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
        }
    }

    fn is_live(&self, entry: &BatchEntry, now: DateTime<Utc>) -> bool {
        now - entry.submitted_at < self.ttl
    }

    fn live(&self, batch_id: BatchId) -> Option<dashmap::mapref::one::Ref<'_, BatchId, BatchEntry>> {
        let now = Utc::now();
        self.batches
            .get(&batch_id)
            .filter(|entry| self.is_live(entry, now))
    }

    fn live_mut(
        &self,
        batch_id: BatchId,
    ) -> Option<dashmap::mapref::one::RefMut<'_, BatchId, BatchEntry>> {
        let now = Utc::now();
        self.batches
            .get_mut(&batch_id)
            .filter(|entry| self.is_live(entry, now))
    }

    fn sweep_expired(&self) {
        let now = Utc::now();
        let ttl = self.ttl;
        self.batches
            .retain(|_, entry| now - entry.submitted_at < ttl);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.batches.len()
    }

    /// 等待批次完成，未知批次返回 `None`
    ///
    /// 由页面记录事件唤醒，不轮询
    pub async fn wait_for_completion(&self, batch_id: BatchId) -> Option<BatchProgress> {
        let (mut rx, total) = {
            let entry = self.live(batch_id)?;
            (entry.resolved_tx.subscribe(), entry.pages.len())
        };

        // 发送端与存储同生命周期，这里不会因关闭而返回错误
        let _ = rx.wait_for(|resolved| *resolved >= total).await;

        self.live(batch_id).map(|e| e.progress(batch_id))
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn register(&self, job: &CrawlJob) -> Result<(), StatusError> {
        self.sweep_expired();

        let (resolved_tx, _) = watch::channel(0);
        self.batches.insert(
            job.id(),
            BatchEntry {
                pages: job.pages().to_vec(),
                submitted_at: job.submitted_at(),
                reports: BTreeMap::new(),
                cancel_requested: false,
                resolved_tx,
            },
        );
        Ok(())
    }

    async fn record_page(
        &self,
        batch_id: BatchId,
        report: PageReport,
    ) -> Result<bool, StatusError> {
        let Some(mut entry) = self.live_mut(batch_id) else {
            warn!(%batch_id, page = report.page, "Page reported for unknown batch");
            return Ok(false);
        };

        if !entry.pages.contains(&report.page) || entry.reports.contains_key(&report.page) {
            return Ok(false);
        }

        entry.reports.insert(report.page, report);
        let resolved = entry.reports.len();
        entry.resolved_tx.send_replace(resolved);
        Ok(true)
    }

    async fn page_report(
        &self,
        batch_id: BatchId,
        page: u32,
    ) -> Result<Option<PageReport>, StatusError> {
        Ok(self
            .live(batch_id)
            .and_then(|e| e.reports.get(&page).cloned()))
    }

    async fn progress(&self, batch_id: BatchId) -> Result<Option<BatchProgress>, StatusError> {
        Ok(self.live(batch_id).map(|e| e.progress(batch_id)))
    }

    async fn page_reports(
        &self,
        batch_id: BatchId,
    ) -> Result<Option<Vec<PageReport>>, StatusError> {
        Ok(self
            .live(batch_id)
            .map(|e| e.reports.values().cloned().collect()))
    }

    async fn request_cancel(&self, batch_id: BatchId) -> Result<bool, StatusError> {
        match self.live_mut(batch_id) {
            Some(mut entry) => {
                entry.cancel_requested = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn is_cancel_requested(&self, batch_id: BatchId) -> Result<bool, StatusError> {
        Ok(self
            .live(batch_id)
            .map(|e| e.cancel_requested)
            .unwrap_or(false))
    }

    async fn discard(&self, batch_id: BatchId) -> Result<(), StatusError> {
        self.batches.remove(&batch_id);
        Ok(())
    }
}

/// KEYS: 批次元数据, 页面报告哈希; ARGV: 页码, 报告JSON, TTL秒
const RECORD_PAGE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
local added = redis.call('HSETNX', KEYS[2], ARGV[1], ARGV[2])
redis.call('EXPIRE', KEYS[2], ARGV[3])
return added
"#;

/// 基于 Redis 的状态存储
///
/// 键布局（前缀之后）：
/// - `batch:{id}` 哈希：`pages`、`pages_total`、`submitted_at`
/// - `batch:{id}:reports` 哈希：页码 → 页面报告JSON（HSETNX，先到者为准）
/// - `batch:{id}:cancel` 取消标记
///
/// 所有键在 `ttl_secs` 后过期，过期批次视为未知批次
pub struct RedisStatusStore {
    redis: RedisClient,
    ttl_secs: u64,
    record_script: Script,
}

impl RedisStatusStore {
    pub fn new(redis: RedisClient, ttl_secs: u64) -> Self {
        Self {
            redis,
            ttl_secs,
            record_script: Script::new(RECORD_PAGE_SCRIPT),
        }
    }

    fn meta_key(&self, batch_id: BatchId) -> String {
        self.redis.key(&["batch", &batch_id.to_string()])
    }

    fn reports_key(&self, batch_id: BatchId) -> String {
        self.redis.key(&["batch", &batch_id.to_string(), "reports"])
    }

    fn cancel_key(&self, batch_id: BatchId) -> String {
        self.redis.key(&["batch", &batch_id.to_string(), "cancel"])
    }

    async fn exists(&self, batch_id: BatchId) -> Result<bool, StatusError> {
        let mut con = self.redis.connection();
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.meta_key(batch_id))
            .query_async(&mut con)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn register(&self, job: &CrawlJob) -> Result<(), StatusError> {
        let mut con = self.redis.connection();
        let key = self.meta_key(job.id());
        let pages = serde_json::to_string(job.pages())?;

        let _: () = redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(&key)
            .arg("pages")
            .arg(pages)
            .arg("pages_total")
            .arg(job.pages().len())
            .arg("submitted_at")
            .arg(job.submitted_at().to_rfc3339())
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_secs)
            .ignore()
            .query_async(&mut con)
            .await?;
        Ok(())
    }

    async fn record_page(
        &self,
        batch_id: BatchId,
        report: PageReport,
    ) -> Result<bool, StatusError> {
        let mut con = self.redis.connection();
        let payload = serde_json::to_string(&report)?;

        let added: i64 = self
            .record_script
            .key(self.meta_key(batch_id))
            .key(self.reports_key(batch_id))
            .arg(report.page)
            .arg(payload)
            .arg(self.ttl_secs)
            .invoke_async(&mut con)
            .await?;

        if added < 0 {
            warn!(%batch_id, page = report.page, "Page reported for unknown or expired batch");
        }
        Ok(added == 1)
    }

    async fn page_report(
        &self,
        batch_id: BatchId,
        page: u32,
    ) -> Result<Option<PageReport>, StatusError> {
        let mut con = self.redis.connection();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(self.reports_key(batch_id))
            .arg(page)
            .query_async(&mut con)
            .await?;
        Ok(raw.map(|r| serde_json::from_str(&r)).transpose()?)
    }

    async fn progress(&self, batch_id: BatchId) -> Result<Option<BatchProgress>, StatusError> {
        let mut con = self.redis.connection();
        let (meta, resolved): (HashMap<String, String>, usize) = redis::pipe()
            .atomic()
            .cmd("HGETALL")
            .arg(self.meta_key(batch_id))
            .cmd("HLEN")
            .arg(self.reports_key(batch_id))
            .query_async(&mut con)
            .await?;

        if meta.is_empty() {
            return Ok(None);
        }

        let total: usize = meta
            .get("pages_total")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| StatusError::Corrupted(format!("{}: pages_total", batch_id)))?;
        let submitted_at = meta
            .get("submitted_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| StatusError::Corrupted(format!("{}: submitted_at", batch_id)))?;

        Ok(Some(BatchProgress::new(
            batch_id,
            total,
            resolved.min(total),
            submitted_at,
        )))
    }

    async fn page_reports(
        &self,
        batch_id: BatchId,
    ) -> Result<Option<Vec<PageReport>>, StatusError> {
        if !self.exists(batch_id).await? {
            return Ok(None);
        }

        let mut con = self.redis.connection();
        let raw: Vec<String> = redis::cmd("HVALS")
            .arg(self.reports_key(batch_id))
            .query_async(&mut con)
            .await?;

        let mut reports = raw
            .iter()
            .map(|r| serde_json::from_str::<PageReport>(r))
            .collect::<Result<Vec<_>, _>>()?;
        reports.sort_by_key(|r| r.page);
        Ok(Some(reports))
    }

    async fn request_cancel(&self, batch_id: BatchId) -> Result<bool, StatusError> {
        if !self.exists(batch_id).await? {
            return Ok(false);
        }

        let mut con = self.redis.connection();
        let _: () = redis::cmd("SET")
            .arg(self.cancel_key(batch_id))
            .arg(1)
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut con)
            .await?;
        Ok(true)
    }

    async fn is_cancel_requested(&self, batch_id: BatchId) -> Result<bool, StatusError> {
        let mut con = self.redis.connection();
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.cancel_key(batch_id))
            .query_async(&mut con)
            .await?;
        Ok(exists)
    }

    async fn discard(&self, batch_id: BatchId) -> Result<(), StatusError> {
        let mut con = self.redis.connection();
        let _: i64 = redis::cmd("DEL")
            .arg(self.meta_key(batch_id))
            .arg(self.reports_key(batch_id))
            .arg(self.cancel_key(batch_id))
            .query_async(&mut con)
            .await?;
        Ok(())
    }
}
