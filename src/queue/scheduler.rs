// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::queue::task_queue::{QueueError, TaskQueue};

/// 任务调度器
///
/// 周期性地把到期的重试任务移回队列，并上报队列深度
pub struct TaskScheduler<Q: TaskQueue + 'static> {
    queue: Arc<Q>,
    period: Duration,
}

impl<Q: TaskQueue + 'static> TaskScheduler<Q> {
    /// 创建新的任务调度器实例
    ///
    /// # 参数
    ///
    /// * `queue` - 任务队列
    /// * `period` - 检查间隔
    pub fn new(queue: Arc<Q>, period: Duration) -> Self {
        Self { queue, period }
    }

    /// 执行一次维护
    pub async fn tick(&self) -> Result<usize, QueueError> {
        let promoted = self.queue.promote_due(Utc::now()).await?;
        if promoted > 0 {
            debug!("Promoted {} delayed tasks", promoted);
        }

        let depth = self.queue.len().await?;
        metrics::gauge!("corp_crawler_queue_depth").set(depth as f64);
        Ok(promoted)
    }

    /// 启动调度器后台任务
    ///
    /// # 返回值
    ///
    /// 返回后台任务的句柄
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.tick().await {
                    error!("Scheduler tick failed: {}", e);
                }
            }
        })
    }
}
