// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! hm-store: durable job state over a backend provider.
//!
//! Key minting, field-name compression through per-app symbol tables,
//! type-tagged flat serialization, and the store service the engine uses
//! for every read and transactional write.

pub mod key;
pub mod serializer;
pub mod store;
pub mod symbols;

pub use key::{KeySpace, KeyType};
pub use serializer::Serializer;
pub use store::{
    effect_field, replay_field, Store, StoreError, TimeHookKind, TimeHookRecord, WebHookTarget,
    REPLAY_PREFIX,
};
pub use symbols::SymbolTable;
