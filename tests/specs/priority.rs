//! Effective priority: a task blocking more urgent work inherits its
//! urgency.

use crate::prelude::{id, world};
use foreman_core::{DependencyKind, TaskStatus};
use foreman_engine::Scheduler;

#[test]
fn effective_priority_inheritance() {
    let w = world();
    w.task("t-hi", TaskStatus::Open, 1);
    w.task("t-lo", TaskStatus::Open, 5);
    // t-hi waits on t-lo
    w.link("t-hi", "t-lo", DependencyKind::Blocks);

    // t-lo is the actionable task and runs at the blocked work's urgency;
    // t-hi itself sits in the blocked set until t-lo closes.
    let ready = Scheduler::new(&w.store).ready(&Default::default()).unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].task.id.as_str(), "t-lo");
    assert_eq!(ready[0].effective_priority, 1);
    assert_eq!(ready[0].task.as_task().unwrap().priority, 5);

    let blocked = Scheduler::new(&w.store).blocked_tasks().unwrap();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].task.id.as_str(), "t-hi");

    // Once t-lo closes, t-hi surfaces at its own priority
    w.close("t-lo");
    let ready = Scheduler::new(&w.store).ready(&Default::default()).unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].task.id.as_str(), "t-hi");
    assert_eq!(ready[0].effective_priority, 1);
}

#[test]
fn urgency_flows_through_whole_chains() {
    let w = world();
    w.task("t-head", TaskStatus::Open, 1);
    w.task("t-mid", TaskStatus::Open, 3);
    w.task("t-tail", TaskStatus::Open, 5);
    w.task("t-noise", TaskStatus::Open, 2);
    w.link("t-head", "t-mid", DependencyKind::Blocks);
    w.link("t-mid", "t-tail", DependencyKind::Blocks);

    // The tail outranks an unrelated priority-2 task because it transitively
    // holds back priority-1 work.
    let ready = Scheduler::new(&w.store).ready(&Default::default()).unwrap();
    let ranked: Vec<(&str, u8)> = ready
        .iter()
        .map(|r| (r.task.id.as_str(), r.effective_priority))
        .collect();
    assert_eq!(ranked, vec![("t-tail", 1), ("t-noise", 2)]);
}
