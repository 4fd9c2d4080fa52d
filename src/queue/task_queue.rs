// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::Script;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

use crate::domain::models::crawl_job::BatchId;
use crate::infrastructure::redis_client::RedisClient;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 任务种类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// 页面抓取任务
    Page { page: u32 },
    /// 详情抓取任务，`slot` 为标识符在列表中的位置
    Detail {
        page: u32,
        slot: usize,
        identifier: String,
    },
}

/// 队列中的任务信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: Uuid,
    pub batch_id: BatchId,
    /// 已失败的次数，首次投递为 0
    #[serde(default)]
    pub attempt: u32,
    #[serde(flatten)]
    pub kind: TaskKind,
}

impl TaskEnvelope {
    pub fn page(batch_id: BatchId, page: u32) -> Self {
        Self::new(batch_id, TaskKind::Page { page })
    }

    pub fn detail(batch_id: BatchId, page: u32, slot: usize, identifier: impl Into<String>) -> Self {
        Self::new(
            batch_id,
            TaskKind::Detail {
                page,
                slot,
                identifier: identifier.into(),
            },
        )
    }

    fn new(batch_id: BatchId, kind: TaskKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            attempt: 0,
            kind,
        }
    }

    /// 下一次尝试的信封，任务ID不变
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    pub fn page_number(&self) -> u32 {
        match self.kind {
            TaskKind::Page { page } | TaskKind::Detail { page, .. } => page,
        }
    }
}

/// 已出队的任务
///
/// 保留原始负载，确认时按原文从处理中列表移除
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub envelope: TaskEnvelope,
    raw: String,
}

/// 任务队列特质
///
/// 至少一次投递：任务出队后进入处理中状态，直到被确认或改期
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 批量入队
    async fn enqueue_many(&self, tasks: Vec<TaskEnvelope>) -> Result<(), QueueError>;

    /// 出队一个任务，队列为空时返回 `None`
    async fn dequeue(&self) -> Result<Option<QueuedTask>, QueueError>;

    /// 确认任务已处理完毕
    async fn ack(&self, task: &QueuedTask) -> Result<(), QueueError>;

    /// 确认当前投递并在 `at` 时刻重新投递 `next`
    async fn retry_later(
        &self,
        task: &QueuedTask,
        next: TaskEnvelope,
        at: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// 把到期的延迟任务移回队列，返回移动的个数
    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, QueueError>;

    /// 把处理中的任务放回队列（进程重启后恢复）
    async fn requeue_processing(&self) -> Result<usize, QueueError>;

    /// 等待中的任务数
    async fn len(&self) -> Result<usize, QueueError>;
}

/// 单次最多提升的延迟任务数
const PROMOTE_BATCH: usize = 100;

/// KEYS: 延迟集合, 队列; ARGV: 当前时间毫秒, 上限
const PROMOTE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, task in ipairs(due) do
  redis.call('ZREM', KEYS[1], task)
  redis.call('LPUSH', KEYS[2], task)
end
return #due
"#;

/// Redis可靠队列
///
/// - `queue` 列表：左进右出
/// - `processing` 列表：出队时由 LMOVE 原子转移，确认时 LREM
/// - `delayed` 有序集合：按到期毫秒时间排序的重试任务
pub struct RedisTaskQueue {
    redis: RedisClient,
    queue_key: String,
    processing_key: String,
    delayed_key: String,
    promote_script: Script,
}

impl RedisTaskQueue {
    pub fn new(redis: RedisClient) -> Self {
        Self {
            queue_key: redis.key(&["queue"]),
            processing_key: redis.key(&["processing"]),
            delayed_key: redis.key(&["delayed"]),
            promote_script: Script::new(PROMOTE_SCRIPT),
            redis,
        }
    }

    async fn discard(&self, raw: &str) -> Result<(), QueueError> {
        let mut con = self.redis.connection();
        let _: i64 = redis::cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(raw)
            .query_async(&mut con)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue_many(&self, tasks: Vec<TaskEnvelope>) -> Result<(), QueueError> {
        if tasks.is_empty() {
            return Ok(());
        }

        let payloads = tasks
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let mut con = self.redis.connection();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.queue_key)
            .arg(payloads)
            .query_async(&mut con)
            .await?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueuedTask>, QueueError> {
        let mut con = self.redis.connection();
        loop {
            let raw: Option<String> = redis::cmd("LMOVE")
                .arg(&self.queue_key)
                .arg(&self.processing_key)
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut con)
                .await?;

            let Some(raw) = raw else {
                return Ok(None);
            };

            match serde_json::from_str::<TaskEnvelope>(&raw) {
                Ok(envelope) => return Ok(Some(QueuedTask { envelope, raw })),
                Err(e) => {
                    error!(error = %e, payload = %raw, "Dropping malformed task");
                    self.discard(&raw).await?;
                }
            }
        }
    }

    async fn ack(&self, task: &QueuedTask) -> Result<(), QueueError> {
        self.discard(&task.raw).await
    }

    async fn retry_later(
        &self,
        task: &QueuedTask,
        next: TaskEnvelope,
        at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&next)?;
        let mut con = self.redis.connection();

        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&self.delayed_key)
            .arg(at.timestamp_millis())
            .arg(payload)
            .ignore()
            .cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(&task.raw)
            .ignore()
            .query_async(&mut con)
            .await?;
        Ok(())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut con = self.redis.connection();
        let moved: usize = self
            .promote_script
            .key(&self.delayed_key)
            .key(&self.queue_key)
            .arg(now.timestamp_millis())
            .arg(PROMOTE_BATCH)
            .invoke_async(&mut con)
            .await?;
        Ok(moved)
    }

    async fn requeue_processing(&self) -> Result<usize, QueueError> {
        let mut con = self.redis.connection();
        let mut moved = 0;
        loop {
            // 放回队列的出队端，优先处理
            let raw: Option<String> = redis::cmd("LMOVE")
                .arg(&self.processing_key)
                .arg(&self.queue_key)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut con)
                .await?;
            if raw.is_none() {
                return Ok(moved);
            }
            moved += 1;
        }
    }

    async fn len(&self) -> Result<usize, QueueError> {
        let mut con = self.redis.connection();
        let len: usize = redis::cmd("LLEN")
            .arg(&self.queue_key)
            .query_async(&mut con)
            .await?;
        Ok(len)
    }
}

#[derive(Default)]
struct MemoryQueueState {
    ready: VecDeque<String>,
    processing: Vec<String>,
    delayed: Vec<(DateTime<Utc>, String)>,
}

/// 进程内队列，语义与 Redis 队列一致，用于测试和单机调试
#[derive(Default)]
pub struct InMemoryTaskQueue {
    state: Mutex<MemoryQueueState>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理中的任务数
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.processing.len()
    }

    /// 延迟中的任务数
    pub async fn delayed(&self) -> usize {
        self.state.lock().await.delayed.len()
    }
}

fn remove_first(list: &mut Vec<String>, raw: &str) {
    if let Some(pos) = list.iter().position(|r| r == raw) {
        list.remove(pos);
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue_many(&self, tasks: Vec<TaskEnvelope>) -> Result<(), QueueError> {
        let payloads = tasks
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.state.lock().await.ready.extend(payloads);
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<QueuedTask>, QueueError> {
        let mut state = self.state.lock().await;
        let Some(raw) = state.ready.pop_front() else {
            return Ok(None);
        };
        let envelope = serde_json::from_str(&raw)?;
        state.processing.push(raw.clone());
        Ok(Some(QueuedTask { envelope, raw }))
    }

    async fn ack(&self, task: &QueuedTask) -> Result<(), QueueError> {
        remove_first(&mut self.state.lock().await.processing, &task.raw);
        Ok(())
    }

    async fn retry_later(
        &self,
        task: &QueuedTask,
        next: TaskEnvelope,
        at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&next)?;
        let mut state = self.state.lock().await;
        remove_first(&mut state.processing, &task.raw);
        state.delayed.push((at, payload));
        Ok(())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut state = self.state.lock().await;
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.delayed)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        state.delayed = waiting;
        let moved = due.len();
        state.ready.extend(due.into_iter().map(|(_, raw)| raw));
        Ok(moved)
    }

    async fn requeue_processing(&self) -> Result<usize, QueueError> {
        let mut state = self.state.lock().await;
        let stuck = std::mem::take(&mut state.processing);
        let moved = stuck.len();
        for raw in stuck.into_iter().rev() {
            state.ready.push_front(raw);
        }
        Ok(moved)
    }

    async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().await.ready.len())
    }
}

#[async_trait]
impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    async fn enqueue_many(&self, tasks: Vec<TaskEnvelope>) -> Result<(), QueueError> {
        (**self).enqueue_many(tasks).await
    }

    async fn dequeue(&self) -> Result<Option<QueuedTask>, QueueError> {
        (**self).dequeue().await
    }

    async fn ack(&self, task: &QueuedTask) -> Result<(), QueueError> {
        (**self).ack(task).await
    }

    async fn retry_later(
        &self,
        task: &QueuedTask,
        next: TaskEnvelope,
        at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        (**self).retry_later(task, next, at).await
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        (**self).promote_due(now).await
    }

    async fn requeue_processing(&self) -> Result<usize, QueueError> {
        (**self).requeue_processing().await
    }

    async fn len(&self) -> Result<usize, QueueError> {
        (**self).len().await
    }
}
