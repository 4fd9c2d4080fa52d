// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::page::DetailRecord;

/// 目录客户端错误类型
///
/// 远程服务的任何非成功响应都作为硬失败返回，不会变成空结果
#[derive(Error, Debug)]
pub enum ClientError {
    /// 请求失败（连接、TLS、读取响应体等）
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 超时
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// 非2xx响应
    #[error("Unexpected HTTP status {0}")]
    Status(u16),
    /// GraphQL 响应里带有 errors
    #[error("GraphQL errors: {0}")]
    GraphQl(String),
    /// 响应体格式不正确或缺少字段
    #[error("Malformed response: {0}")]
    Malformed(String),
    /// 调用参数无效
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClientError {
    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::RequestFailed(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ClientError::Timeout(_) => true,
            ClientError::Status(status) => *status == 429 || (500..600).contains(status),
            ClientError::GraphQl(_) | ClientError::Malformed(_) | ClientError::InvalidArgument(_) => {
                false
            }
        }
    }
}

/// 远程目录客户端
///
/// 无状态；每次调用都独立构造完整的请求体，自身不做重试
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// 列出一页的实体标识符，顺序与远程服务返回一致
    ///
    /// 客户端只拒绝页码 0；页码范围与单批次页数上限由批次控制器
    /// （`CrawlUseCase::submit_batch`）在提交时校验，任务只会携带校验过的页码
    async fn list_page(&self, page: u32) -> Result<Vec<String>, ClientError>;

    /// 获取一个实体的完整记录
    async fn fetch_detail(&self, identifier: &str) -> Result<DetailRecord, ClientError>;
}
