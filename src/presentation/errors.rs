// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::application::use_cases::crawl_use_case::CrawlUseCaseError;

/// 应用错误类型
///
/// 把用例错误映射为HTTP响应
#[derive(Debug)]
pub struct AppError(CrawlUseCaseError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.0 {
            CrawlUseCaseError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            CrawlUseCaseError::UnknownBatch(batch_id) => unknown_batch(&batch_id.to_string()),
            other => {
                error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": other.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

impl From<CrawlUseCaseError> for AppError {
    fn from(err: CrawlUseCaseError) -> Self {
        Self(err)
    }
}

/// 未知批次统一返回 404 与 `unknown` 状态
pub fn unknown_batch(batch_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "batch_id": batch_id,
            "status": "unknown",
            "message": "Batch not found",
        })),
    )
        .into_response()
}
