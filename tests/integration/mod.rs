// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod durable_backend_test;
pub mod in_process_backend_test;
pub mod redis_backend_test;
