// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::{json, Map, Value};

use super::traits::ClientError;
use crate::config::settings::DirectorySettings;
use crate::domain::models::page::DetailRecord;

pub const LIST_CORPORATES_QUERY: &str = r#"
query ExampleQuery($filters: CorporateFilters, $page: Int, $sortBy: String) {
  corporates(filters: $filters, page: $page, sortBy: $sortBy) {
    rows {
      id
    }
  }
}
"#;

pub const CORPORATE_BY_ID_QUERY: &str = r#"
query ($id: String!) {
  corporate(id: $id) {
    id
    name
    description
    logo_url
    hq_city
    hq_country
    website_url
    linkedin_url
    twitter_url
    startup_partners_count
    startup_partners {
      master_startup_id
      company_name
      logo_url: logo
      city
      website
      country
      theme_gd
      __typename
    }
    startup_themes
    startup_friendly_badge
    __typename
  }
}
"#;

/// 不可变的列表请求模板
///
/// 每次调用由模板生成一个新的请求体，模板本身从不被修改
#[derive(Debug, Clone, Default)]
pub struct ListTemplate {
    hq_city: Vec<String>,
    industry: Vec<String>,
    sort_by: Option<String>,
}

impl ListTemplate {
    pub fn new(hq_city: Vec<String>, industry: Vec<String>, sort_by: Option<String>) -> Self {
        Self {
            hq_city,
            industry,
            sort_by,
        }
    }

    pub fn from_settings(settings: &DirectorySettings) -> Self {
        Self::new(
            settings.filters.hq_city.clone(),
            settings.filters.industry.clone(),
            settings.sort_by.clone(),
        )
    }

    /// 生成指定页的请求体
    pub fn request(&self, page: u32) -> Value {
        let mut variables = Map::new();
        variables.insert(
            "filters".into(),
            json!({ "hq_city": self.hq_city, "industry": self.industry }),
        );
        variables.insert("page".into(), json!(page));
        if let Some(sort_by) = &self.sort_by {
            variables.insert("sortBy".into(), json!(sort_by));
        }

        json!({
            "query": LIST_CORPORATES_QUERY,
            "variables": Value::Object(variables),
        })
    }
}

/// 生成详情请求体
pub fn detail_request(identifier: &str) -> Value {
    json!({
        "query": CORPORATE_BY_ID_QUERY,
        "variables": { "id": identifier },
    })
}

/// 检查 GraphQL 顶层 errors 字段
pub fn check_graphql_errors(body: &Value) -> Result<(), ClientError> {
    match body.get("errors") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(errors)) if errors.is_empty() => Ok(()),
        Some(Value::Array(errors)) => {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string())
                })
                .collect();
            Err(ClientError::GraphQl(messages.join("; ")))
        }
        Some(other) => Err(ClientError::GraphQl(other.to_string())),
    }
}

/// 从列表响应中取出 `data.corporates.rows[*].id`
pub fn parse_list_response(body: &Value) -> Result<Vec<String>, ClientError> {
    check_graphql_errors(body)?;

    let rows = body
        .pointer("/data/corporates/rows")
        .and_then(Value::as_array)
        .ok_or_else(|| ClientError::Malformed("missing data.corporates.rows".into()))?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| match row.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(ClientError::Malformed(format!(
                "row {} has no non-empty string id",
                i
            ))),
        })
        .collect()
}

/// 从详情响应中取出 `data.corporate`，必须是非空对象
pub fn parse_detail_response(identifier: &str, body: Value) -> Result<DetailRecord, ClientError> {
    check_graphql_errors(&body)?;

    let payload = match body {
        Value::Object(mut root) => match root.remove("data") {
            Some(Value::Object(mut data)) => data.remove("corporate"),
            _ => None,
        },
        _ => None,
    };

    match payload {
        Some(payload @ Value::Object(_)) => Ok(DetailRecord {
            identifier: identifier.to_string(),
            payload,
        }),
        Some(Value::Null) | None => Err(ClientError::Malformed(format!(
            "missing data.corporate for {}",
            identifier
        ))),
        Some(other) => Err(ClientError::Malformed(format!(
            "data.corporate for {} is not an object: {}",
            identifier, other
        ))),
    }
}
