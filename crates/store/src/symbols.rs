// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-app symbol tables.
//!
//! Activity-field paths (`w1/output/data/total`) compress to three-char
//! symbols so job hash records stay compact. Allocation order is
//! persisted with the table; reserved single-char fields (`:` status,
//! `_`-prefixed user data, `-`-prefixed ledger entries) are never
//! symbol-compressed.

use indexmap::IndexMap;
use std::collections::HashMap;

/// Symbol alphabet (base-36, lowercase-first for readability).
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Bidirectional path <-> symbol table for one app.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    to_symbol: IndexMap<String, String>,
    to_path: HashMap<String, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated symbols.
    pub fn len(&self) -> usize {
        self.to_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_symbol.is_empty()
    }

    /// Existing symbol for a path.
    pub fn symbol_for(&self, path: &str) -> Option<&str> {
        self.to_symbol.get(path).map(String::as_str)
    }

    /// Path behind a symbol.
    pub fn path_for(&self, symbol: &str) -> Option<&str> {
        self.to_path.get(symbol).map(String::as_str)
    }

    /// Get the symbol for a path, allocating the next free one if needed.
    /// Returns `(symbol, newly_allocated)`.
    pub fn get_or_alloc(&mut self, path: &str) -> (String, bool) {
        if let Some(existing) = self.to_symbol.get(path) {
            return (existing.clone(), false);
        }
        let symbol = encode(self.to_symbol.len());
        self.to_symbol.insert(path.to_string(), symbol.clone());
        self.to_path.insert(symbol.clone(), path.to_string());
        (symbol, true)
    }

    /// Compress field names through the table, allocating as needed.
    /// Returns the compressed map and any newly allocated `(path, symbol)`
    /// pairs (for persistence).
    pub fn compress(
        &mut self,
        fields: impl IntoIterator<Item = (String, String)>,
    ) -> (HashMap<String, String>, Vec<(String, String)>) {
        let mut out = HashMap::new();
        let mut fresh = Vec::new();
        for (path, value) in fields {
            let (symbol, new) = self.get_or_alloc(&path);
            if new {
                fresh.push((path, symbol.clone()));
            }
            out.insert(symbol, value);
        }
        (out, fresh)
    }

    /// Expand symbol field names back to paths. Unknown symbols and
    /// reserved fields pass through unchanged.
    pub fn expand<'a>(
        &self,
        fields: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> HashMap<String, String> {
        fields
            .into_iter()
            .map(|(symbol, value)| {
                let path = self
                    .path_for(symbol)
                    .map(str::to_string)
                    .unwrap_or_else(|| symbol.clone());
                (path, value.clone())
            })
            .collect()
    }

    /// Load from the persisted `path -> symbol` hash.
    pub fn from_map(map: HashMap<String, String>) -> Self {
        let mut entries: Vec<(String, String)> = map.into_iter().collect();
        // Restore allocation order so future allocations don't collide
        entries.sort_by_key(|(_, symbol)| decode(symbol));
        let mut table = Self::new();
        for (path, symbol) in entries {
            table.to_path.insert(symbol.clone(), path.clone());
            table.to_symbol.insert(path, symbol);
        }
        table
    }

    /// Serialize as the persisted `path -> symbol` hash.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.to_symbol
            .iter()
            .map(|(p, s)| (p.clone(), s.clone()))
            .collect()
    }
}

/// Encode an allocation ordinal as a three-char symbol.
fn encode(ordinal: usize) -> String {
    let base = ALPHABET.len();
    let mut n = ordinal;
    let mut chars = [ALPHABET[0]; 3];
    for slot in chars.iter_mut().rev() {
        *slot = ALPHABET[n % base];
        n /= base;
    }
    String::from_utf8_lossy(&chars).to_string()
}

/// Decode a symbol back to its ordinal (usize::MAX for malformed input).
fn decode(symbol: &str) -> usize {
    let mut n = 0usize;
    for c in symbol.bytes() {
        match ALPHABET.iter().position(|&a| a == c) {
            Some(i) => n = n * ALPHABET.len() + i,
            None => return usize::MAX,
        }
    }
    n
}

#[cfg(test)]
#[path = "symbols_tests.rs"]
mod tests;
