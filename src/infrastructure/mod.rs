// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 领域抽象接口的具体实现：
/// - 指标（metrics）：Prometheus 导出
/// - Redis客户端（redis_client）：队列、屏障与状态存储共用的连接
/// - 状态存储（status_store）：进程内与 Redis 两种实现
/// - 产物存储（storage）：本地文件系统与内存两种实现
pub mod metrics;
pub mod redis_client;
pub mod status_store;
pub mod storage;
