// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置，包括远程目录服务、页码范围、并发后端、Redis和产物存储
pub mod settings;
