// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 持久后端的任务消费者与工作进程池管理
pub mod crawl_worker;
pub mod manager;
pub mod worker;

pub use worker::Worker;
