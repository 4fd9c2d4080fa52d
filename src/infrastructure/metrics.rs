// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::config::settings::MetricsSettings;

/// 初始化指标系统
///
/// 未启用时不安装记录器，`metrics` 宏退化为空操作
pub fn init_metrics(settings: &MetricsSettings) -> anyhow::Result<()> {
    if !settings.enabled {
        return Ok(());
    }

    let addr: SocketAddr = settings.listen_addr.parse()?;

    // 端口被占用时只告警，不影响爬取本身
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return Ok(());
    }

    describe_counter!(
        "corp_crawler_batches_submitted_total",
        "Total number of batches accepted"
    );
    describe_counter!(
        "corp_crawler_pages_total",
        "Pages resolved, labelled by outcome"
    );
    describe_counter!(
        "corp_crawler_details_total",
        "Detail fetches finished, labelled by outcome"
    );
    describe_counter!(
        "corp_crawler_task_retries_total",
        "Durable tasks rescheduled after a retryable failure"
    );
    describe_histogram!(
        "corp_crawler_directory_request_seconds",
        "Latency of directory requests in seconds"
    );
    describe_gauge!(
        "corp_crawler_queue_depth",
        "Tasks waiting in the durable queue"
    );

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}
