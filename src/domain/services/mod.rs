// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 抓取任务（fetch_tasks）：页面抓取与详情抓取的单次执行
/// - 聚合器（aggregator）：一页详情全部到达后的全有或全无写入
/// - 流水线（pipeline）：两种并发后端共用的任务语义
pub mod aggregator;
pub mod fetch_tasks;
pub mod pipeline;
