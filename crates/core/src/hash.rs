// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content hashing over canonicalised element payloads.
//!
//! The hash must be stable across serialize/deserialize round-trips, so the
//! payload is first converted to a `serde_json::Value` (whose object maps are
//! ordered by key) and the digest is taken over that canonical rendering.

use crate::element::ElementData;

/// Hex blake3 digest of the canonical JSON rendering of a payload.
///
/// Returns the digest of the literal string `"null"` if the payload cannot be
/// serialised; payloads are plain data structs so this does not happen in
/// practice.
pub fn content_hash(data: &ElementData) -> String {
    let canonical = serde_json::to_value(data)
        .and_then(|v| serde_json::to_vec(&v))
        .unwrap_or_else(|_| b"null".to_vec());
    blake3::hash(&canonical).to_hex().to_string()
}

/// Digest an arbitrary JSON value the same way [`content_hash`] does.
pub fn hash_value(value: &serde_json::Value) -> String {
    let canonical = serde_json::to_vec(value).unwrap_or_else(|_| b"null".to_vec());
    blake3::hash(&canonical).to_hex().to_string()
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
