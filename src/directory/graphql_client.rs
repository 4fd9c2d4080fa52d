// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use url::Url;

use super::queries::{self, ListTemplate};
use super::traits::{ClientError, DirectoryClient};
use crate::config::settings::DirectorySettings;
use crate::domain::models::page::DetailRecord;

/// 基于 reqwest 的 GraphQL 目录客户端
///
/// 列表和详情共用一个端点，由请求体区分操作
pub struct GraphQlDirectoryClient {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
    list_template: ListTemplate,
}

impl GraphQlDirectoryClient {
    pub fn new(settings: &DirectorySettings) -> Result<Self, ClientError> {
        let endpoint = Url::parse(&settings.endpoint)
            .map_err(|e| ClientError::InvalidArgument(format!("endpoint: {}", e)))?;

        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout())
            .connect_timeout(settings.connect_timeout())
            .build()?;

        Ok(Self {
            http,
            endpoint,
            timeout: settings.timeout(),
            list_template: ListTemplate::from_settings(settings),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, operation: &'static str, body: &Value) -> Result<Value, ClientError> {
        let start = Instant::now();
        let result = self.send(body).await;

        metrics::histogram!(
            "corp_crawler_directory_request_seconds",
            "operation" => operation,
            "outcome" => if result.is_ok() { "ok" } else { "error" }
        )
        .record(start.elapsed().as_secs_f64());

        result
    }

    async fn send(&self, body: &Value) -> Result<Value, ClientError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                ClientError::Malformed(e.to_string())
            } else {
                self.classify(e)
            }
        })
    }

    fn classify(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            ClientError::RequestFailed(error)
        }
    }
}

#[async_trait]
impl DirectoryClient for GraphQlDirectoryClient {
    #[instrument(skip(self))]
    async fn list_page(&self, page: u32) -> Result<Vec<String>, ClientError> {
        if page == 0 {
            return Err(ClientError::InvalidArgument(
                "page numbers start at 1".into(),
            ));
        }

        let body = self.post("list", &self.list_template.request(page)).await?;
        let identifiers = queries::parse_list_response(&body)?;
        debug!(count = identifiers.len(), "Listed page");
        Ok(identifiers)
    }

    #[instrument(skip(self))]
    async fn fetch_detail(&self, identifier: &str) -> Result<DetailRecord, ClientError> {
        if identifier.trim().is_empty() {
            return Err(ClientError::InvalidArgument(
                "identifier must not be empty".into(),
            ));
        }

        let body = self
            .post("detail", &queries::detail_request(identifier))
            .await?;
        queries::parse_detail_response(identifier, body)
    }
}
