// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 领域层只依赖这里的抽象，具体实现由基础设施层提供：
/// - 存储仓库（storage_repository）：页面产物的持久化
/// - 状态仓库（status_repository）：批次与页面终态的记录和查询
pub mod status_repository;
pub mod storage_repository;
