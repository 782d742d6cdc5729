// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod encryption;
pub mod handshake;
pub mod sizes;
pub mod validate;
