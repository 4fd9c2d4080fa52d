// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::domain::repositories::status_repository::StatusError;
use crate::queue::barrier::BarrierError;
use crate::queue::task_queue::QueueError;

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("队列错误: {0}")]
    Queue(#[from] QueueError),

    #[error("屏障错误: {0}")]
    Barrier(#[from] BarrierError),

    #[error("状态存储错误: {0}")]
    Status(#[from] StatusError),
}
