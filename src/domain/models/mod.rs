// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// - 爬取作业（crawl_job）：批次句柄、作业与批次状态
/// - 页面（page）：列表结果、详情记录、页面产物与页面报告
pub mod crawl_job;
pub mod page;
