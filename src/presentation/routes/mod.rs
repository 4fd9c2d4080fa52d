// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::application::use_cases::crawl_use_case::CrawlUseCase;
use crate::presentation::handlers::crawl_handler;
use axum::{routing::get, Extension, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 创建应用路由
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes(use_case: Arc<CrawlUseCase>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version));

    let crawl_routes = Router::new()
        .route(
            "/crawl",
            get(crawl_handler::create_crawl).post(crawl_handler::create_crawl),
        )
        .route("/crawl/{batch_id}", axum::routing::delete(crawl_handler::cancel_crawl))
        .route("/status/{batch_id}", get(crawl_handler::get_status))
        .route("/status/{batch_id}/pages", get(crawl_handler::get_page_reports))
        .layer(Extension(use_case));

    Router::new()
        .merge(public_routes)
        .merge(crawl_routes)
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
///
/// # 返回值
///
/// 返回应用版本号
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
