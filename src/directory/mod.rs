// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 远程目录模块
///
/// 对远程 GraphQL 目录服务的列表和详情调用
pub mod graphql_client;
pub mod queries;
pub mod traits;

pub use graphql_client::GraphQlDirectoryClient;
pub use traits::{ClientError, DirectoryClient};
