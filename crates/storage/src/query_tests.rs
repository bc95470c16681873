// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{
    create_document, create_entity, create_group_channel, create_task,
    create_task_with_priority, id, patch, store, store_with_clock,
};
use crate::UpdateOptions;
use foreman_core::{FakeClock, MessageData, NewElement, TaskData, TaskStatus};
use serde_json::json;
use std::time::Duration;

#[test]
fn default_listing_is_newest_first() {
    let clock = FakeClock::new();
    let store = store_with_clock(clock.clone());
    create_task(&store, "t-1", TaskStatus::Open);
    clock.advance(Duration::from_secs(1));
    create_task(&store, "t-2", TaskStatus::Open);

    let items = store.list(&ElementFilter::default()).unwrap();
    assert_eq!(items[0].id.as_str(), "t-2");
    assert_eq!(items[1].id.as_str(), "t-1");
}

#[test]
fn filter_by_kind_and_status() {
    let store = store();
    create_task(&store, "t-1", TaskStatus::Open);
    create_task(&store, "t-2", TaskStatus::Closed);
    create_entity(&store, "ent-1", "ann");

    let open_tasks = store
        .list(&ElementFilter::of_kind(ElementKind::Task).with_status("open"))
        .unwrap();
    assert_eq!(open_tasks.len(), 1);
    assert_eq!(open_tasks[0].id.as_str(), "t-1");
}

#[test]
fn tag_filters_all_and_any() {
    let store = store();
    let t1 = store
        .create(
            NewElement::new(ElementData::Task(TaskData::new("a")), "ann")
                .with_id("t-1")
                .with_tag("urgent")
                .with_tag("backend"),
        )
        .unwrap();
    store
        .create(
            NewElement::new(ElementData::Task(TaskData::new("b")), "ann")
                .with_id("t-2")
                .with_tag("urgent"),
        )
        .unwrap();

    let both = store
        .list(&ElementFilter {
            tags_all: vec!["urgent".into(), "backend".into()],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].id, t1.id);

    let any = store
        .list(&ElementFilter {
            tags_any: vec!["backend".into(), "frontend".into()],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(any.len(), 1);

    // Tags are batch-fetched and attached
    assert_eq!(both[0].tags.len(), 2);
}

#[test]
fn task_field_filters() {
    let store = store();
    create_task_with_priority(&store, "t-1", TaskStatus::Open, 1);
    create_task_with_priority(&store, "t-2", TaskStatus::Open, 4);
    store
        .update(
            &id("t-1"),
            patch(&[("assignee", json!("ann"))]),
            UpdateOptions::default(),
        )
        .unwrap();

    let assigned = store
        .list(&ElementFilter {
            assignee: Some("ann".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(assigned.len(), 1);

    let urgent = store
        .list(&ElementFilter {
            priority_at_most: Some(2),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(urgent.len(), 1);
    assert_eq!(urgent[0].id.as_str(), "t-1");
}

#[test]
fn message_filters() {
    let store = store();
    create_entity(&store, "ann", "ann");
    create_entity(&store, "bee", "bee");
    create_group_channel(&store, "ch-1", "dev", &["ann", "bee"]);
    create_document(&store, "doc-1", "one");
    create_document(&store, "doc-2", "two");
    store
        .create(
            NewElement::new(
                ElementData::Message(MessageData::new(id("ch-1"), "ann", id("doc-1"))),
                "ann",
            )
            .with_id("msg-1"),
        )
        .unwrap();
    let mut with_attachment = MessageData::new(id("ch-1"), "bee", id("doc-2"));
    with_attachment.attachments.push(id("doc-1"));
    store
        .create(NewElement::new(ElementData::Message(with_attachment), "bee").with_id("msg-2"))
        .unwrap();

    let in_channel = store
        .list(&ElementFilter {
            channel_id: Some(id("ch-1")),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(in_channel.len(), 2);

    let from_bee = store
        .list(&ElementFilter {
            sender: Some("bee".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(from_bee.len(), 1);

    let with_files = store
        .list(&ElementFilter {
            has_attachments: Some(true),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(with_files.len(), 1);
    assert_eq!(with_files[0].id.as_str(), "msg-2");
}

#[test]
fn member_filter_matches_channels() {
    let store = store();
    create_group_channel(&store, "ch-1", "dev", &["ann", "bee"]);
    create_group_channel(&store, "ch-2", "ops", &["bee", "cee"]);

    let anns = store
        .list(&ElementFilter {
            kind: Some(ElementKind::Channel),
            member: Some("ann".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(anns.len(), 1);
    assert_eq!(anns[0].id.as_str(), "ch-1");
}

#[test]
fn metadata_filter_matches() {
    let store = store();
    create_entity(&store, "ag-1", "agent-one");
    store
        .update(
            &id("ag-1"),
            patch(&[("metadata", json!({"session_status": "running"}))]),
            UpdateOptions::default(),
        )
        .unwrap();
    create_entity(&store, "ag-2", "agent-two");

    let running = store
        .list(
            &ElementFilter::of_kind(ElementKind::Entity)
                .with_metadata("session_status", "running"),
        )
        .unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id.as_str(), "ag-1");
}

#[test]
fn priority_ordering_and_pagination() {
    let store = store();
    for (i, priority) in [3u8, 1, 5, 2, 4].iter().enumerate() {
        create_task_with_priority(&store, &format!("t-{i}"), TaskStatus::Open, *priority);
    }

    let page = store
        .list_paginated(&ElementFilter {
            order_by: OrderField::Priority,
            order: OrderDir::Asc,
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 5);
    assert!(page.errors.is_empty());
    let priorities: Vec<u8> = page
        .items
        .iter()
        .map(|e| e.as_task().unwrap().priority)
        .collect();
    assert_eq!(priorities, vec![2, 3]);
}

#[test]
fn hydration_resolves_refs_in_batch() {
    let store = store();
    create_document(&store, "doc-1", "the description");
    let mut task = TaskData::new("with doc");
    task.description_ref = Some(id("doc-1"));
    store
        .create(NewElement::new(ElementData::Task(task), "ann").with_id("t-1"))
        .unwrap();
    create_task(&store, "t-2", TaskStatus::Open);

    let elements = store
        .list(&ElementFilter::of_kind(ElementKind::Task))
        .unwrap();
    let hydrated = store.hydrate(elements).unwrap();
    let by_id: std::collections::HashMap<&str, &Hydrated> = hydrated
        .iter()
        .map(|h| (h.element.id.as_str(), h))
        .collect();
    assert_eq!(by_id["t-1"].content.as_deref(), Some("the description"));
    assert!(by_id["t-2"].content.is_none());
}

#[test]
fn corrupt_rows_are_skipped_and_reported() {
    let store = store();
    create_task(&store, "t-1", TaskStatus::Open);
    create_task(&store, "t-2", TaskStatus::Open);

    // Corrupt one payload behind the store's back
    store
        .db
        .with_conn(|conn| {
            conn.execute(
                "UPDATE elements SET data = '{not json' WHERE id = 't-1'",
                [],
            )
            .map_err(crate::db::db_err)?;
            Ok(())
        })
        .unwrap();

    let items = store.list(&ElementFilter::default()).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id.as_str(), "t-2");

    let page = store.list_paginated(&ElementFilter::default()).unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.errors.len(), 1);
    assert!(page.errors[0].contains("t-1"));
}
