// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `@pipe` row-pipeline evaluation.
//!
//! A pipe is an array of rows. A value row resolves each cell against the
//! context; a function row (single `{@domain.fn}` cell) consumes the
//! previous row's cells as arguments and yields a one-cell row. The final
//! row's first cell is the pipe's result.

use crate::error::PipeError;
use crate::functions;
use crate::path;
use serde_json::Value;

/// Expression resolver for mapping rules.
pub struct Pipe;

impl Pipe {
    /// Resolve one expression against the context.
    ///
    /// - `{"@pipe": [...]}` objects run the row pipeline
    /// - strings resolve `{path}` references (a lone reference keeps its
    ///   JSON type; mixed text interpolates)
    /// - other values pass through unchanged
    pub fn resolve(expr: &Value, context: &Value) -> Result<Value, PipeError> {
        match expr {
            Value::Object(map) if map.contains_key("@pipe") => {
                let rows = map
                    .get("@pipe")
                    .and_then(Value::as_array)
                    .ok_or_else(|| PipeError::MalformedPipe("@pipe must be an array".into()))?;
                Self::run_rows(rows, context)
            }
            Value::String(text) => Ok(Self::resolve_text(text, context)),
            other => Ok(other.clone()),
        }
    }

    /// Resolve a string expression: lone references keep their type.
    fn resolve_text(text: &str, context: &Value) -> Value {
        if let Some(function) = function_name(text) {
            // A bare function reference outside a pipe resolves literally
            return Value::String(format!("{{@{function}}}"));
        }
        if path::is_lone_reference(text) {
            path::resolve_path(&text[1..text.len() - 1], context)
        } else if text.contains('{') {
            Value::String(path::interpolate(text, context))
        } else {
            Value::String(text.to_string())
        }
    }

    fn run_rows(rows: &[Value], context: &Value) -> Result<Value, PipeError> {
        let mut previous: Vec<Value> = Vec::new();

        for row in rows {
            let cells = row
                .as_array()
                .ok_or_else(|| PipeError::MalformedPipe("row must be an array".into()))?;

            let is_function_row = cells
                .first()
                .and_then(Value::as_str)
                .and_then(function_name)
                .is_some();

            if is_function_row {
                let name = cells
                    .first()
                    .and_then(Value::as_str)
                    .and_then(function_name)
                    .unwrap_or_default();
                previous = vec![functions::apply(&name, &previous)?];
            } else {
                previous = cells
                    .iter()
                    .map(|cell| Self::resolve(cell, context))
                    .collect::<Result<_, _>>()?;
            }
        }

        Ok(previous.into_iter().next().unwrap_or(Value::Null))
    }
}

/// Extract `domain.fn` from a `{@domain.fn}` cell.
fn function_name(text: &str) -> Option<String> {
    let inner = text.strip_prefix("{@")?.strip_suffix('}')?;
    if inner.is_empty() || inner.contains(['{', '}']) {
        None
    } else {
        Some(inner.to_string())
    }
}

#[cfg(test)]
#[path = "pipe_tests.rs"]
mod tests;
