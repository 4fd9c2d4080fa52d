// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工具模块
///
/// 提供重试策略、遥测初始化与通用错误类型
pub mod errors;
pub mod retry_policy;
pub mod telemetry;
