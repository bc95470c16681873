// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{create_document, id, patch, store};
use crate::{DeleteOptions, UpdateOptions};
use foreman_core::{DocumentStatus, StoreError};
use serde_json::json;

#[test]
fn content_edit_bumps_version_and_snapshots_preimage() {
    let store = store();
    create_document(&store, "doc-1", "v1 content");

    let updated = store
        .update(
            &id("doc-1"),
            patch(&[("content", json!("v2 content"))]),
            UpdateOptions::default(),
        )
        .unwrap();
    assert_eq!(updated.as_document().unwrap().version, 2);

    let versions = store.document_versions(&id("doc-1")).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, 1);
    assert_eq!(versions[0].data.content, "v1 content");

    // The sequence stays dense across repeated edits
    store
        .update(
            &id("doc-1"),
            patch(&[("content", json!("v3 content"))]),
            UpdateOptions::default(),
        )
        .unwrap();
    let versions = store.document_versions(&id("doc-1")).unwrap();
    let numbers: Vec<u32> = versions.iter().map(|v| v.version).collect();
    assert_eq!(numbers, vec![1, 2]);

    let v2 = store.document_version(&id("doc-1"), 2).unwrap().unwrap();
    assert_eq!(v2.data.content, "v2 content");
}

#[test]
fn metadata_edit_does_not_bump_version() {
    let store = store();
    create_document(&store, "doc-1", "stable");
    let updated = store
        .update(
            &id("doc-1"),
            patch(&[("category", json!("notes"))]),
            UpdateOptions::default(),
        )
        .unwrap();
    assert_eq!(updated.as_document().unwrap().version, 1);
    assert!(store.document_versions(&id("doc-1")).unwrap().is_empty());
}

#[test]
fn immutable_documents_reject_content_edits() {
    let store = store();
    create_document(&store, "doc-1", "frozen");
    store
        .update(
            &id("doc-1"),
            patch(&[("immutable", json!(true))]),
            UpdateOptions::default(),
        )
        .unwrap();

    let err = store
        .update(
            &id("doc-1"),
            patch(&[("content", json!("thawed"))]),
            UpdateOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));

    // Non-content fields stay editable
    store
        .update(
            &id("doc-1"),
            patch(&[("category", json!("legal"))]),
            UpdateOptions::default(),
        )
        .unwrap();
}

#[test]
fn manual_version_patch_is_rejected() {
    let store = store();
    create_document(&store, "doc-1", "x");
    let err = store
        .update(
            &id("doc-1"),
            patch(&[("version", json!(7))]),
            UpdateOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[test]
fn archive_and_unarchive() {
    let store = store();
    create_document(&store, "doc-1", "x");
    let archived = store.archive_document(&id("doc-1"), "ann").unwrap();
    assert_eq!(archived.as_document().unwrap().status, DocumentStatus::Archived);

    let restored = store.unarchive_document(&id("doc-1"), "ann").unwrap();
    assert_eq!(restored.as_document().unwrap().status, DocumentStatus::Active);
}

#[test]
fn delete_removes_version_history() {
    let store = store();
    create_document(&store, "doc-1", "v1");
    store
        .update(
            &id("doc-1"),
            patch(&[("content", json!("v2"))]),
            UpdateOptions::default(),
        )
        .unwrap();
    assert_eq!(store.document_versions(&id("doc-1")).unwrap().len(), 1);

    store.delete(&id("doc-1"), DeleteOptions::default()).unwrap();
    assert!(store.document_versions(&id("doc-1")).unwrap().is_empty());
}

#[test]
fn full_text_search_finds_documents() {
    let store = store();
    create_document(&store, "doc-1", "the quick brown fox");
    create_document(&store, "doc-2", "lazy dogs sleep");

    let hits = store.search_documents("quick").unwrap();
    assert_eq!(hits, vec![id("doc-1")]);

    // Content edits keep the index current
    store
        .update(
            &id("doc-1"),
            patch(&[("content", json!("slow green turtle"))]),
            UpdateOptions::default(),
        )
        .unwrap();
    assert!(store.search_documents("quick").unwrap().is_empty());
    assert_eq!(store.search_documents("turtle").unwrap(), vec![id("doc-1")]);
}
