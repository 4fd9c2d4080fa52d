// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::domain::repositories::storage_repository::OnExisting;
use crate::utils::retry_policy::RetryPolicy;

/// 应用程序配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 运行模式
    pub mode: RunMode,
    /// 服务器配置
    pub server: ServerSettings,
    /// 远程目录服务配置
    pub directory: DirectorySettings,
    /// 默认页码范围
    pub crawl: CrawlSettings,
    /// 并发后端配置
    pub backend: BackendSettings,
    /// Redis配置（仅 redis 后端使用）
    pub redis: RedisSettings,
    /// 产物存储配置
    pub storage: StorageSettings,
    /// 指标配置
    pub metrics: MetricsSettings,
    /// 日志配置
    pub logging: LoggingSettings,
}

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// 提供HTTP接口
    Serve,
    /// 只运行持久化后端的工作器
    Worker,
    /// 在进程内爬取一次配置的范围后退出
    Once,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// 远程目录服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct DirectorySettings {
    /// GraphQL 端点
    pub endpoint: String,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 连接超时（秒）
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// 列表查询的过滤条件
    pub filters: FilterSettings,
    /// 列表排序字段
    pub sort_by: Option<String>,
}

impl DirectorySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterSettings {
    #[serde(default)]
    pub hq_city: Vec<String>,
    #[serde(default)]
    pub industry: Vec<String>,
}

/// 页码范围配置
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlSettings {
    /// 默认起始页（含）
    pub first_page: u32,
    /// 默认结束页（含）
    pub last_page: u32,
    /// 单批次允许的最大页数
    pub max_pages_per_batch: u32,
}

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// 进程内协作式并发，无持久化
    InProcess,
    /// 基于 Redis 的持久化任务队列
    Redis,
}

/// 并发后端配置
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// redis 后端在本进程启动的工作器数量
    pub worker_count: usize,
    /// 同时进行的详情请求上限
    pub max_concurrent_details: usize,
    /// redis 后端对可重试失败的最大重试次数
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// 队列为空时工作器的等待间隔（毫秒）
    pub idle_poll_ms: u64,
    /// 屏障释放后聚合器持有的租约（秒）
    pub barrier_lease_secs: u64,
    /// 启动时把处理中列表里的任务放回队列
    pub recover_on_start: bool,
}

impl BackendSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}

/// Redis配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
    /// 所有键的前缀
    pub key_prefix: String,
    /// 批次状态与屏障键的过期时间（秒），进程内状态存储同样按此过期
    pub result_ttl_secs: u64,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 产物输出目录
    pub output_dir: String,
    /// 产物已存在时的策略
    pub on_existing: OnExisting,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// 输出JSON格式日志
    pub json: bool,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加内置默认值、`config/default`、`config/{APP_ENVIRONMENT}`
    /// 以及 `CORPCRAWL__` 前缀的环境变量
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("CORPCRAWL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("directory.filters.hq_city")
                    .with_list_parse_key("directory.filters.industry")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 只包含内置默认值的构建器
    pub fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("mode", "serve")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("directory.endpoint", "https://ranking.glassdollar.com/graphql")?
            .set_default("directory.timeout_secs", 30)?
            .set_default("directory.connect_timeout_secs", 10)?
            .set_default(
                "directory.user_agent",
                concat!("corp-crawler/", env!("CARGO_PKG_VERSION")),
            )?
            .set_default("directory.filters.hq_city", Vec::<String>::new())?
            .set_default("directory.filters.industry", Vec::<String>::new())?
            .set_default("crawl.first_page", 1)?
            .set_default("crawl.last_page", 27)?
            .set_default("crawl.max_pages_per_batch", 100)?
            .set_default("backend.kind", "in_process")?
            .set_default("backend.worker_count", 4)?
            .set_default("backend.max_concurrent_details", 16)?
            .set_default("backend.max_retries", 3)?
            .set_default("backend.initial_backoff_ms", 1000)?
            .set_default("backend.max_backoff_ms", 60_000)?
            .set_default("backend.idle_poll_ms", 500)?
            .set_default("backend.barrier_lease_secs", 60)?
            .set_default("backend.recover_on_start", true)?
            .set_default("redis.url", "redis://127.0.0.1:6379/0")?
            .set_default("redis.key_prefix", "corpcrawl")?
            .set_default("redis.result_ttl_secs", 86_400)?
            .set_default("storage.output_dir", "./data")?
            .set_default("storage.on_existing", "overwrite")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")?
            .set_default("logging.json", false)
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Message(msg));

        match Url::parse(&self.directory.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => return invalid(format!("unsupported endpoint scheme: {}", url.scheme())),
            Err(e) => return invalid(format!("invalid directory endpoint: {}", e)),
        }
        if self.directory.timeout_secs == 0 {
            return invalid("directory.timeout_secs must be positive".into());
        }
        if self.crawl.first_page == 0 {
            return invalid("crawl.first_page must be >= 1".into());
        }
        if self.crawl.first_page > self.crawl.last_page {
            return invalid(format!(
                "crawl.first_page ({}) is greater than crawl.last_page ({})",
                self.crawl.first_page, self.crawl.last_page
            ));
        }
        if self.crawl.max_pages_per_batch == 0 {
            return invalid("crawl.max_pages_per_batch must be positive".into());
        }
        if self.backend.max_concurrent_details == 0 {
            return invalid("backend.max_concurrent_details must be positive".into());
        }
        if self.backend.idle_poll_ms == 0 {
            return invalid("backend.idle_poll_ms must be positive".into());
        }
        if self.backend.barrier_lease_secs == 0 {
            return invalid("backend.barrier_lease_secs must be positive".into());
        }
        if self.redis.result_ttl_secs == 0 {
            return invalid("redis.result_ttl_secs must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
