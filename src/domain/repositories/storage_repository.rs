// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::models::page::PageArtifact;

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 存储错误
    #[error("Storage error: {0}")]
    Other(String),
}

/// 目标产物已存在时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnExisting {
    /// 覆盖（同一页重跑是幂等的）
    #[default]
    Overwrite,
    /// 保留已有产物，不再写入
    Skip,
}

/// 一次写入的回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// 产物位置（文件路径或键）
    pub location: String,
    /// 因 `OnExisting::Skip` 而未写入
    pub skipped: bool,
}

/// 产物持久化接口
///
/// 实现必须保证读者永远看不到写了一半的产物，
/// 并且不同页码的产物不会落到同一位置
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// 写入一页的产物
    async fn write(&self, artifact: &PageArtifact) -> Result<WriteReceipt, StorageError>;

    /// 读取一页的产物
    async fn read(&self, page: u32) -> Result<Option<PageArtifact>, StorageError>;

    /// 产物的确定性位置
    fn location(&self, page: u32) -> String;
}

/// 按页码得到产物文件名
pub fn artifact_file_name(page: u32) -> String {
    format!("page-{}.json", page)
}
