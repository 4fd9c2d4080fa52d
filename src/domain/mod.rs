// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：批次、页面与详情的数据结构
/// - 仓库接口（repositories）：状态存储与产物存储的抽象
/// - 服务（services）：抓取任务、聚合器与流水线
///
/// 领域层不依赖于任何具体的存储或队列实现。
pub mod models;
pub mod repositories;
pub mod services;
