// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mapping-rule application.

use crate::error::PipeError;
use crate::pipe::Pipe;
use serde_json::{Map, Value};

/// Applies a mapping-rules tree to job context, producing output JSON.
///
/// Objects map key-by-key (an `@pipe` object is an expression, not a
/// container), arrays map element-wise, strings and scalars resolve
/// through [`Pipe::resolve`].
pub struct Mapper;

impl Mapper {
    pub fn apply(rules: &Value, context: &Value) -> Result<Value, PipeError> {
        match rules {
            Value::Object(map) if map.contains_key("@pipe") => Pipe::resolve(rules, context),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, rule) in map {
                    out.insert(key.clone(), Self::apply(rule, context)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mapped = items
                    .iter()
                    .map(|item| Self::apply(item, context))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(mapped))
            }
            leaf => Pipe::resolve(leaf, context),
        }
    }

    /// Apply rules and merge the result into an existing object.
    ///
    /// Top-level keys overwrite; everything else replaces wholesale.
    pub fn apply_onto(
        rules: &Value,
        context: &Value,
        target: &mut Value,
    ) -> Result<(), PipeError> {
        let produced = Self::apply(rules, context)?;
        match (target, produced) {
            (Value::Object(existing), Value::Object(new_fields)) => {
                for (k, v) in new_fields {
                    existing.insert(k, v);
                }
            }
            (slot, other) => *slot = other,
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "mapper_tests.rs"]
mod tests;
