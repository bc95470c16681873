// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_document_defaults() {
    let doc = DocumentData::new("hello");
    assert_eq!(doc.version, 1);
    assert_eq!(doc.content_type, "text/markdown");
    assert_eq!(doc.status, DocumentStatus::Active);
    assert!(!doc.immutable);
}

#[test]
fn builders() {
    let doc = DocumentData::new("{}")
        .with_content_type("application/json")
        .with_category("handoff")
        .immutable();
    assert_eq!(doc.content_type, "application/json");
    assert_eq!(doc.category.as_deref(), Some("handoff"));
    assert!(doc.immutable);
}

#[test]
fn version_defaults_when_missing_in_json() {
    let parsed: DocumentData =
        serde_json::from_str(r#"{"content":"x","status":"active"}"#).unwrap();
    assert_eq!(parsed.version, 1);
}

#[test]
fn document_round_trips_through_json() {
    let mut doc = DocumentData::new("body").with_category("notes");
    doc.version = 3;
    let json = serde_json::to_string(&doc).unwrap();
    let parsed: DocumentData = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, doc);
}
