// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Type-tagged flat serialization.
//!
//! Hash fields only hold strings, so values carry a one-character type
//! tag: `s:` string, `d:` number, `b:` bool, `n:` null, `j:` nested JSON.
//! `flatten`/`restore_hierarchy` convert between a JSON tree and the flat
//! `a/b/0/c` field map stored per activity record.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub struct Serializer;

impl Serializer {
    /// Encode one value into a tagged field string.
    pub fn to_string(value: &Value) -> String {
        match value {
            Value::Null => "n:".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            Value::Number(n) => format!("d:{n}"),
            Value::String(s) => format!("s:{s}"),
            container => format!("j:{container}"),
        }
    }

    /// Decode a tagged field string.
    ///
    /// Untagged input (legacy writers) decodes as a raw string.
    pub fn from_string(raw: &str) -> Value {
        match raw.split_at_checked(2) {
            Some(("n:", _)) => Value::Null,
            Some(("b:", rest)) => Value::Bool(rest == "true"),
            Some(("d:", rest)) => rest
                .parse::<serde_json::Number>()
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Some(("s:", rest)) => Value::String(rest.to_string()),
            Some(("j:", rest)) => serde_json::from_str(rest).unwrap_or(Value::Null),
            _ => Value::String(raw.to_string()),
        }
    }

    /// Flatten a JSON tree into `path -> tagged leaf` fields.
    ///
    /// Arrays use numeric segments; empty containers are stored as `j:`
    /// leaves so restoration keeps their shape.
    pub fn flatten(value: &Value) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        flatten_into(value, String::new(), &mut out);
        out
    }

    /// Rebuild the JSON tree from flat fields.
    pub fn restore_hierarchy(fields: &BTreeMap<String, String>) -> Value {
        if fields.is_empty() {
            return Value::Object(Map::new());
        }
        if let (1, Some(root)) = (fields.len(), fields.get("")) {
            return Self::from_string(root);
        }

        let mut root = Node::default();
        for (path, raw) in fields {
            // An empty-root placeholder (empty container written before
            // real fields merged in) is superseded by them.
            if path.is_empty() {
                continue;
            }
            let mut node = &mut root;
            for segment in path.split('/') {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.leaf = Some(Self::from_string(raw));
        }
        root.into_value()
    }
}

fn flatten_into(value: &Value, path: String, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                let child = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}/{k}")
                };
                flatten_into(v, child, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                let child = if path.is_empty() {
                    i.to_string()
                } else {
                    format!("{path}/{i}")
                };
                flatten_into(v, child, out);
            }
        }
        leaf => {
            out.insert(path, Serializer::to_string(leaf));
        }
    }
}

#[derive(Default)]
struct Node {
    leaf: Option<Value>,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn into_value(self) -> Value {
        // Children supersede a leaf at the same path (an empty-container
        // placeholder later merged with real nested fields).
        if self.children.is_empty() {
            return self.leaf.unwrap_or(Value::Null);
        }
        // All-numeric, dense-from-zero children restore as an array
        let is_array = self.children.keys().all(|k| k.parse::<usize>().is_ok());
        if is_array {
            let mut indexed: Vec<(usize, Value)> = self
                .children
                .into_iter()
                .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v.into_value())))
                .collect();
            indexed.sort_by_key(|(i, _)| *i);
            if indexed
                .iter()
                .enumerate()
                .all(|(expected, (i, _))| expected == *i)
            {
                return Value::Array(indexed.into_iter().map(|(_, v)| v).collect());
            }
            // Sparse indices restore as an object to avoid inventing holes
            return Value::Object(
                indexed
                    .into_iter()
                    .map(|(i, v)| (i.to_string(), v))
                    .collect(),
            );
        }
        Value::Object(
            self.children
                .into_iter()
                .map(|(k, v)| (k, v.into_value()))
                .collect(),
        )
    }
}

#[cfg(test)]
#[path = "serializer_tests.rs"]
mod tests;
