// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// 批次提交请求
///
/// 两端都可省略，省略时使用配置中的默认页码范围
#[derive(Debug, Default, Clone, Deserialize, Serialize, Validate)]
pub struct CrawlRequestDto {
    #[validate(range(min = 1))]
    pub first_page: Option<u32>,
    #[validate(range(min = 1))]
    pub last_page: Option<u32>,
}

impl CrawlRequestDto {
    pub fn new(first_page: u32, last_page: u32) -> Self {
        Self {
            first_page: Some(first_page),
            last_page: Some(last_page),
        }
    }
}
