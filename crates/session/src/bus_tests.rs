// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[tokio::test]
async fn subscribers_receive_events_in_order() {
    let bus = SessionBus::new();
    let mut rx = bus.subscribe();

    bus.emit(SessionEvent::Raw("one".into()));
    bus.emit(SessionEvent::Raw("two".into()));

    assert!(matches!(rx.recv().await.unwrap(), SessionEvent::Raw(s) if s == "one"));
    assert!(matches!(rx.recv().await.unwrap(), SessionEvent::Raw(s) if s == "two"));
}

#[tokio::test]
async fn emitting_without_subscribers_is_fine() {
    let bus = SessionBus::new();
    bus.emit(SessionEvent::Event(json!({"ok": true})));
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn late_subscribers_miss_earlier_events() {
    let bus = SessionBus::new();
    bus.emit(SessionEvent::Raw("missed".into()));

    let mut rx = bus.subscribe();
    bus.emit(SessionEvent::Raw("seen".into()));
    assert!(matches!(rx.recv().await.unwrap(), SessionEvent::Raw(s) if s == "seen"));
}

#[tokio::test]
async fn each_subscriber_gets_every_event() {
    let bus = SessionBus::new();
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    bus.emit(SessionEvent::Exited { code: Some(0) });
    assert!(matches!(a.recv().await.unwrap(), SessionEvent::Exited { code: Some(0) }));
    assert!(matches!(b.recv().await.unwrap(), SessionEvent::Exited { code: Some(0) }));
}
