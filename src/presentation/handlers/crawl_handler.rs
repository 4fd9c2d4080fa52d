// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::{
    application::{dto::crawl_request::CrawlRequestDto, use_cases::crawl_use_case::CrawlUseCase},
    domain::models::crawl_job::BatchId,
    presentation::errors::{unknown_batch, AppError},
};

/// 提交新的批次
pub async fn create_crawl(
    Extension(use_case): Extension<Arc<CrawlUseCase>>,
    Query(request): Query<CrawlRequestDto>,
) -> Result<Response, AppError> {
    let accepted = use_case.submit_batch(request).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

/// 获取批次状态
pub async fn get_status(
    Extension(use_case): Extension<Arc<CrawlUseCase>>,
    Path(batch_id): Path<String>,
) -> Result<Response, AppError> {
    let Ok(id) = batch_id.parse::<BatchId>() else {
        return Ok(unknown_batch(&batch_id));
    };
    let status = use_case.batch_status(id).await?;
    Ok(Json(status).into_response())
}

/// 获取逐页结果
pub async fn get_page_reports(
    Extension(use_case): Extension<Arc<CrawlUseCase>>,
    Path(batch_id): Path<String>,
) -> Result<Response, AppError> {
    let Ok(id) = batch_id.parse::<BatchId>() else {
        return Ok(unknown_batch(&batch_id));
    };
    let reports = use_case.page_reports(id).await?;
    Ok(Json(reports).into_response())
}

/// 取消批次
pub async fn cancel_crawl(
    Extension(use_case): Extension<Arc<CrawlUseCase>>,
    Path(batch_id): Path<String>,
) -> Result<Response, AppError> {
    let Ok(id) = batch_id.parse::<BatchId>() else {
        return Ok(unknown_batch(&batch_id));
    };
    let status = use_case.cancel_batch(id).await?;
    Ok((StatusCode::ACCEPTED, Json(status)).into_response())
}
