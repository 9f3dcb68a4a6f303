// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared across the workspace

use thiserror::Error;

/// Errors raised by core parsing and validation
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    #[error("invalid dimension path: {0}")]
    InvalidDimension(String),
    #[error("invalid config value for {key}: {value}")]
    InvalidConfig { key: String, value: String },
    #[error("activity not found: {0}")]
    ActivityNotFound(String),
    #[error("no trigger subscribed to topic: {0}")]
    TopicNotFound(String),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
