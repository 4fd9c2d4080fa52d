// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use redis::aio::MultiplexedConnection;
use redis::RedisResult;

/// Redis客户端
///
/// 持有一个可克隆的多路复用连接；队列、屏障和状态存储共用它，
/// 各自负责自己的键空间
#[derive(Clone)]
pub struct RedisClient {
    connection: MultiplexedConnection,
    key_prefix: String,
}

impl RedisClient {
    /// 连接Redis
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    /// * `key_prefix` - 所有键的前缀
    pub async fn connect(redis_url: &str, key_prefix: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            connection,
            key_prefix: key_prefix.trim_end_matches(':').to_string(),
        })
    }

    /// 获取一个连接句柄（廉价克隆）
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    /// 拼接带前缀的键
    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = self.key_prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    /// 连通性检查
    pub async fn ping(&self) -> RedisResult<()> {
        let mut con = self.connection();
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }
}
