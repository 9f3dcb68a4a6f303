// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for expression evaluation

use thiserror::Error;

/// Errors raised while resolving mapping expressions
#[derive(Debug, Error)]
pub enum PipeError {
    #[error("unknown function: @{0}")]
    UnknownFunction(String),
    #[error("function @{function} expects {expected} arguments, got {got}")]
    BadArity {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("function @{function} argument {index} has wrong type: {message}")]
    BadArgument {
        function: String,
        index: usize,
        message: String,
    },
    #[error("malformed @pipe: {0}")]
    MalformedPipe(String),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
