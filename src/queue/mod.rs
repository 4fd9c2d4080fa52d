// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 并发后端、可靠任务队列、页面屏障与延迟任务调度
pub mod backend;
pub mod barrier;
pub mod scheduler;
pub mod task_queue;
