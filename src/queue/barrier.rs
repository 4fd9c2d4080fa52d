// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::Script;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::crawl_job::BatchId;
use crate::domain::models::page::DetailOutcome;
use crate::infrastructure::redis_client::RedisClient;

/// 屏障错误类型
#[derive(Error, Debug)]
pub enum BarrierError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected barrier reply: {0}")]
    UnexpectedReply(String),
}

/// 一次到达的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Arrival {
    /// 还有槽位未到达
    Waiting { arrived: usize, expected: usize },
    /// 最后一个槽位到达，调用方获得了聚合权
    Released {
        expected: usize,
        outcomes: Vec<DetailOutcome>,
    },
    /// 聚合权已被其他调用方持有或已完成
    AlreadyReleased,
    /// 屏障不存在（从未打开或已过期）
    Unknown,
}

/// 页面屏障存储
///
/// 按槽位计数：同一槽位多次到达只计一次，重试和重投不会提前放行。
/// 打开屏障时同时登记页面列表，重投的页面任务从登记的列表扇出，
/// 保证每个槽位始终对应同一个标识符
#[async_trait]
pub trait BarrierStore: Send + Sync {
    /// 已登记的页面列表；屏障未打开或已过期时返回 `None`
    async fn listing(&self, batch_id: BatchId, page: u32)
        -> Result<Option<Vec<String>>, BarrierError>;

    /// 打开屏障并登记列表，期望数为列表长度
    ///
    /// 已存在时保持原列表不变并返回它，调用方必须按返回的列表扇出
    async fn open(
        &self,
        batch_id: BatchId,
        page: u32,
        identifiers: Vec<String>,
    ) -> Result<Vec<String>, BarrierError>;

    /// 记录一个槽位的终态
    async fn arrive(
        &self,
        batch_id: BatchId,
        page: u32,
        outcome: DetailOutcome,
    ) -> Result<Arrival, BarrierError>;

    /// 聚合完成，之后的到达都返回 `AlreadyReleased`
    async fn finish(&self, batch_id: BatchId, page: u32) -> Result<(), BarrierError>;
}

/// KEYS: 期望数, 列表; ARGV: 期望数, 列表JSON, TTL秒
const OPEN_SCRIPT: &str = r#"
local existing = redis.call('GET', KEYS[2])
if existing then
  return existing
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
redis.call('SET', KEYS[2], ARGV[2], 'EX', ARGV[3])
return ARGV[2]
"#;

/// KEYS: 期望数, 终态哈希, 聚合权; ARGV: 槽位, 终态JSON, TTL秒, 租约毫秒
const ARRIVE_SCRIPT: &str = r#"
local expected = redis.call('GET', KEYS[1])
if not expected then
  return {'unknown'}
end
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
redis.call('EXPIRE', KEYS[2], ARGV[3])
local arrived = redis.call('HLEN', KEYS[2])
if arrived < tonumber(expected) then
  return {'waiting', tostring(arrived), expected}
end
if not redis.call('SET', KEYS[3], 'claimed', 'NX', 'PX', ARGV[4]) then
  return {'taken'}
end
local reply = {'released', expected}
for _, outcome in ipairs(redis.call('HVALS', KEYS[2])) do
  table.insert(reply, outcome)
end
return reply
"#;

/// Redis页面屏障
///
/// 聚合权带租约：持有者在 `finish` 之前崩溃时，租约到期后
/// 重投的详情任务会重新获得聚合权
pub struct RedisBarrierStore {
    redis: RedisClient,
    ttl_secs: u64,
    lease: Duration,
    open_script: Script,
    arrive_script: Script,
}

impl RedisBarrierStore {
    pub fn new(redis: RedisClient, ttl_secs: u64, lease: Duration) -> Self {
        Self {
            redis,
            ttl_secs,
            lease,
            open_script: Script::new(OPEN_SCRIPT),
            arrive_script: Script::new(ARRIVE_SCRIPT),
        }
    }

    fn key(&self, batch_id: BatchId, page: u32, part: &str) -> String {
        self.redis
            .key(&["barrier", &batch_id.to_string(), &page.to_string(), part])
    }
}

#[async_trait]
impl BarrierStore for RedisBarrierStore {
    async fn listing(
        &self,
        batch_id: BatchId,
        page: u32,
    ) -> Result<Option<Vec<String>>, BarrierError> {
        let mut con = self.redis.connection();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(batch_id, page, "listing"))
            .query_async(&mut con)
            .await?;
        Ok(raw.map(|r| serde_json::from_str(&r)).transpose()?)
    }

    async fn open(
        &self,
        batch_id: BatchId,
        page: u32,
        identifiers: Vec<String>,
    ) -> Result<Vec<String>, BarrierError> {
        let mut con = self.redis.connection();
        let listing = serde_json::to_string(&identifiers)?;

        let stored: String = self
            .open_script
            .key(self.key(batch_id, page, "expected"))
            .key(self.key(batch_id, page, "listing"))
            .arg(identifiers.len())
            .arg(listing)
            .arg(self.ttl_secs)
            .invoke_async(&mut con)
            .await?;
        Ok(serde_json::from_str(&stored)?)
    }

    async fn arrive(
        &self,
        batch_id: BatchId,
        page: u32,
        outcome: DetailOutcome,
    ) -> Result<Arrival, BarrierError> {
        let mut con = self.redis.connection();
        let payload = serde_json::to_string(&outcome)?;

        let reply: Vec<String> = self
            .arrive_script
            .key(self.key(batch_id, page, "expected"))
            .key(self.key(batch_id, page, "outcomes"))
            .key(self.key(batch_id, page, "claim"))
            .arg(outcome.slot)
            .arg(payload)
            .arg(self.ttl_secs)
            .arg(self.lease.as_millis() as u64)
            .invoke_async(&mut con)
            .await?;

        match reply.split_first() {
            Some((tag, _)) if tag == "unknown" => Ok(Arrival::Unknown),
            Some((tag, _)) if tag == "taken" => Ok(Arrival::AlreadyReleased),
            Some((tag, [arrived, expected])) if tag == "waiting" => Ok(Arrival::Waiting {
                arrived: arrived
                    .parse()
                    .map_err(|_| BarrierError::UnexpectedReply(arrived.clone()))?,
                expected: expected
                    .parse()
                    .map_err(|_| BarrierError::UnexpectedReply(expected.clone()))?,
            }),
            Some((tag, [expected, outcomes @ ..])) if tag == "released" => {
                let expected = expected
                    .parse()
                    .map_err(|_| BarrierError::UnexpectedReply(expected.clone()))?;
                let outcomes = outcomes
                    .iter()
                    .map(|o| serde_json::from_str(o))
                    .collect::<Result<Vec<DetailOutcome>, _>>()?;
                Ok(Arrival::Released { expected, outcomes })
            }
            _ => Err(BarrierError::UnexpectedReply(reply.join(","))),
        }
    }

    async fn finish(&self, batch_id: BatchId, page: u32) -> Result<(), BarrierError> {
        let mut con = self.redis.connection();
        let _: () = redis::cmd("SET")
            .arg(self.key(batch_id, page, "claim"))
            .arg("done")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut con)
            .await?;
        Ok(())
    }
}

struct BarrierState {
    identifiers: Vec<String>,
    outcomes: BTreeMap<usize, DetailOutcome>,
    released: bool,
}

/// 进程内页面屏障
#[derive(Default)]
pub struct InMemoryBarrierStore {
    barriers: DashMap<(BatchId, u32), BarrierState>,
}

impl InMemoryBarrierStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BarrierStore for InMemoryBarrierStore {
    async fn listing(
        &self,
        batch_id: BatchId,
        page: u32,
    ) -> Result<Option<Vec<String>>, BarrierError> {
        Ok(self
            .barriers
            .get(&(batch_id, page))
            .map(|state| state.identifiers.clone()))
    }

    async fn open(
        &self,
        batch_id: BatchId,
        page: u32,
        identifiers: Vec<String>,
    ) -> Result<Vec<String>, BarrierError> {
        let state = self
            .barriers
            .entry((batch_id, page))
            .or_insert_with(|| BarrierState {
                identifiers,
                outcomes: BTreeMap::new(),
                released: false,
            });
        Ok(state.identifiers.clone())
    }

    async fn arrive(
        &self,
        batch_id: BatchId,
        page: u32,
        outcome: DetailOutcome,
    ) -> Result<Arrival, BarrierError> {
        let Some(mut state) = self.barriers.get_mut(&(batch_id, page)) else {
            return Ok(Arrival::Unknown);
        };

        let expected = state.identifiers.len();
        state.outcomes.insert(outcome.slot, outcome);
        let arrived = state.outcomes.len();
        if arrived < expected {
            return Ok(Arrival::Waiting { arrived, expected });
        }
        if state.released {
            return Ok(Arrival::AlreadyReleased);
        }

        state.released = true;
        Ok(Arrival::Released {
            expected,
            outcomes: state.outcomes.values().cloned().collect(),
        })
    }

    async fn finish(&self, batch_id: BatchId, page: u32) -> Result<(), BarrierError> {
        if let Some(mut state) = self.barriers.get_mut(&(batch_id, page)) {
            state.released = true;
        }
        Ok(())
    }
}
