//! Draft plans hide their children from the scheduler until activated.

use crate::prelude::{id, world};
use foreman_core::{EventKind, PlanStatus, TaskData};
use foreman_engine::{CreateTaskOptions, Planner};

#[test]
fn draft_plan_hides_children_until_activated() {
    let w = world();
    w.plan("pl-2", PlanStatus::Draft);

    let planner = Planner::new(&w.store);
    let task = planner
        .create_task_in_plan(
            &id("pl-2"),
            TaskData::new("hidden until active"),
            CreateTaskOptions::default(),
            "spec",
        )
        .unwrap();

    // Not ready while the plan is draft
    assert!(w.ready_ids().is_empty());

    w.store
        .update(
            &id("pl-2"),
            [("status".to_string(), serde_json::json!("active"))]
                .into_iter()
                .collect(),
            Default::default(),
        )
        .unwrap();

    assert_eq!(w.ready_ids(), vec![task.id.to_string()]);

    // Activating a draft plan journals as a reopen
    let events = w.store.events_for(&id("pl-2"), true).unwrap();
    assert!(events.iter().any(|e| e.kind == EventKind::Reopened));
}

#[test]
fn hierarchical_child_ids_count_up_per_plan() {
    let w = world();
    w.plan("pl-9", PlanStatus::Active);
    let planner = Planner::new(&w.store);
    let opts = CreateTaskOptions {
        hierarchical_id: true,
        ..Default::default()
    };

    let a = planner
        .create_task_in_plan(&id("pl-9"), TaskData::new("a"), opts.clone(), "spec")
        .unwrap();
    let b = planner
        .create_task_in_plan(&id("pl-9"), TaskData::new("b"), opts, "spec")
        .unwrap();
    assert_eq!(a.id.as_str(), "pl-9.1");
    assert_eq!(b.id.as_str(), "pl-9.2");
}

#[test]
fn plan_progress_tracks_bulk_close() {
    let w = world();
    w.plan("pl-3", PlanStatus::Active);
    let planner = Planner::new(&w.store);
    for title in ["one", "two", "three"] {
        planner
            .create_task_in_plan(
                &id("pl-3"),
                TaskData::new(title),
                CreateTaskOptions::default(),
                "spec",
            )
            .unwrap();
    }

    let before = planner.plan_progress(&id("pl-3")).unwrap();
    assert_eq!(before.total, 3);
    assert_eq!(before.percentage, 0);

    let result = planner.bulk_close(&id("pl-3"), None, "spec").unwrap();
    assert_eq!(result.updated, 3);

    let after = planner.plan_progress(&id("pl-3")).unwrap();
    assert_eq!(after.completed, 3);
    assert_eq!(after.percentage, 100);
}
