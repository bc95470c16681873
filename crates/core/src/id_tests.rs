// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn short_id_truncates() {
    assert_eq!("abcdef".short(4), "abcd");
    assert_eq!("ab".short(4), "ab");
    assert_eq!("".short(4), "");
}

#[test]
fn uuid_idgen_is_unique() {
    let gen = UuidIdGen;
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
    assert_eq!(a.len(), 36);
}

#[test]
fn sequential_idgen_counts_up() {
    let gen = SequentialIdGen::new("t");
    assert_eq!(gen.next(), "t-1");
    assert_eq!(gen.next(), "t-2");

    // Clones share the counter
    let clone = gen.clone();
    assert_eq!(clone.next(), "t-3");
    assert_eq!(gen.next(), "t-4");
}

#[test]
fn child_id_format() {
    assert_eq!(child_id("pl-1", 1), "pl-1.1");
    assert_eq!(child_id("pl-1.2", 7), "pl-1.2.7");
}
