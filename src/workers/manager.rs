// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::services::pipeline::CrawlPipeline;
use crate::queue::barrier::BarrierStore;
use crate::queue::scheduler::TaskScheduler;
use crate::queue::task_queue::{QueueError, TaskQueue};
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::crawl_worker::CrawlWorker;
use crate::workers::worker::Worker;

/// 工作管理器
///
/// 负责持久后端的工作进程池和延迟任务调度器
pub struct WorkerManager<Q, B>
where
    Q: TaskQueue + 'static,
    B: BarrierStore + 'static,
{
    queue: Arc<Q>,
    barrier: Arc<B>,
    pipeline: Arc<CrawlPipeline>,
    retry_policy: RetryPolicy,
    idle_poll: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl<Q, B> WorkerManager<Q, B>
where
    Q: TaskQueue + 'static,
    B: BarrierStore + 'static,
{
    pub fn new(
        queue: Arc<Q>,
        barrier: Arc<B>,
        pipeline: Arc<CrawlPipeline>,
        retry_policy: RetryPolicy,
        idle_poll: Duration,
    ) -> Self {
        Self {
            queue,
            barrier,
            pipeline,
            retry_policy,
            idle_poll,
            handles: Vec::new(),
        }
    }

    /// 把上次运行遗留在处理中列表的任务放回队列
    ///
    /// 只应在没有其他存活工作进程时调用
    pub async fn recover(&self) -> Result<usize, QueueError> {
        let moved = self.queue.requeue_processing().await?;
        if moved > 0 {
            info!("Requeued {} in-flight tasks from a previous run", moved);
        }
        Ok(moved)
    }

    /// 启动工作进程
    ///
    /// 创建并启动指定数量的工作进程，并启动一个调度器
    ///
    /// # 参数
    ///
    /// * `count` - 要启动的工作进程数量
    pub fn start_workers(&mut self, count: usize) {
        let scheduler = TaskScheduler::new(self.queue.clone(), self.idle_poll);
        self.handles.push(scheduler.start());

        for _ in 0..count {
            let worker = CrawlWorker::new(
                self.queue.clone(),
                self.barrier.clone(),
                self.pipeline.clone(),
                self.retry_policy.clone(),
                self.idle_poll,
            );

            let handle = tokio::spawn(async move {
                if let Err(e) = worker.run().await {
                    error!("Worker {} stopped: {}", worker.name(), e);
                }
            });
            self.handles.push(handle);
        }

        info!("Started {} crawl workers", count);
    }

    /// 等待关闭信号并关闭工作进程
    ///
    /// 监听关闭信号并优雅地关闭所有工作进程
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        self.shutdown();
    }

    /// 中止全部后台任务
    ///
    /// 未确认的任务留在处理中列表，下次启动时恢复
    pub fn shutdown(&mut self) {
        info!("Shutting down workers...");
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("Workers shut down successfully");
    }
}
