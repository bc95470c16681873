// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[yare::parameterized(
    blocks = { DependencyKind::Blocks, true, true },
    parent_child = { DependencyKind::ParentChild, true, true },
    awaits = { DependencyKind::Awaits, true, true },
    gate = { DependencyKind::Gate, true, false },
    replies_to = { DependencyKind::RepliesTo, false, false },
    mentions = { DependencyKind::Mentions, false, false },
)]
fn kind_classes(kind: DependencyKind, blocking: bool, cycle_checked: bool) {
    assert_eq!(kind.is_blocking(), blocking);
    assert_eq!(kind.is_cycle_checked(), cycle_checked);
}

#[test]
fn kind_wire_strings_are_kebab_case() {
    assert_eq!(DependencyKind::ParentChild.as_str(), "parent-child");
    assert_eq!(DependencyKind::RepliesTo.as_str(), "replies-to");
    assert_eq!(
        serde_json::to_string(&DependencyKind::ParentChild).unwrap(),
        "\"parent-child\""
    );
    assert_eq!(DependencyKind::parse("awaits"), Some(DependencyKind::Awaits));
    assert_eq!(DependencyKind::parse("unknown"), None);
}

#[test]
fn gate_state_from_missing_metadata_is_satisfied() {
    let gate = GateState::from_metadata(None);
    assert!(gate.is_satisfied());
    assert!(gate.pending().is_empty());
}

#[test]
fn gate_requires_every_listed_approver() {
    let mut gate = GateState {
        required_approvals: vec!["alice".into(), "bob".into()],
        ..Default::default()
    };
    assert!(!gate.is_satisfied());
    assert_eq!(gate.pending(), vec!["alice", "bob"]);

    assert!(gate.approve("alice"));
    assert!(!gate.is_satisfied());

    // Duplicate approval is a no-op
    assert!(!gate.approve("alice"));

    assert!(gate.approve("bob"));
    assert!(gate.is_satisfied());
}

#[test]
fn revoking_a_required_approver_unsatisfies() {
    let mut gate = GateState {
        required_approvals: vec!["alice".into()],
        approvals: vec!["alice".into()],
        satisfied: false,
    };
    assert!(gate.is_satisfied());
    assert!(gate.revoke("alice"));
    assert!(!gate.is_satisfied());
    assert!(!gate.revoke("alice"));
}

#[test]
fn one_shot_satisfaction_overrides_approvals() {
    let gate = GateState {
        required_approvals: vec!["alice".into()],
        approvals: vec![],
        satisfied: true,
    };
    assert!(gate.is_satisfied());
}

#[test]
fn metadata_round_trip_preserves_unrelated_keys() {
    let original = json!({
        "required_approvals": ["alice"],
        "note": "keep me"
    });
    let mut gate = GateState::from_metadata(Some(&original));
    assert_eq!(gate.required_approvals, vec!["alice".to_string()]);

    gate.approve("alice");
    let merged = gate.apply_to_metadata(Some(&original));
    assert_eq!(merged["note"], "keep me");
    assert_eq!(merged["approvals"], json!(["alice"]));
    assert_eq!(merged["required_approvals"], json!(["alice"]));
}
