// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan-level operations: containment, progress aggregation, hierarchical
//! child ids, and bulk task mutations.
//!
//! Bulk operations are deliberately not atomic: each task is its own
//! transaction, ineligible tasks are skipped, and per-task failures land in
//! the result instead of aborting the rest.

use foreman_core::{
    child_id, Clock, Dependency, DependencyKind, Element, ElementData, ElementId, ElementKind,
    IdGen, NewElement, StoreError, TaskData, TaskStatus,
};
use foreman_storage::{NewDependency, Store, UpdateOptions};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Aggregated status counts for a container's tasks.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub open: usize,
    /// Completed share, 0..=100, rounded down. 100 for an empty container.
    pub percentage: u32,
}

/// Outcome of a bulk operation.
#[derive(Debug, Clone, Default)]
pub struct BulkResult {
    pub updated: usize,
    pub skipped: usize,
    pub updated_ids: Vec<ElementId>,
    pub skipped_ids: Vec<ElementId>,
    pub errors: Vec<String>,
}

impl BulkResult {
    fn updated(&mut self, id: &ElementId) {
        self.updated += 1;
        self.updated_ids.push(id.clone());
    }

    fn skipped(&mut self, id: &ElementId) {
        self.skipped += 1;
        self.skipped_ids.push(id.clone());
    }
}

/// Options for [`Planner::create_task_in_plan`].
#[derive(Debug, Clone, Default)]
pub struct CreateTaskOptions {
    /// Mint a `<planId>.<n>` child id from the plan's atomic counter.
    pub hierarchical_id: bool,
    pub tags: BTreeSet<String>,
}

/// Plan operations over a store.
pub struct Planner<'a, C: Clock, G: IdGen> {
    store: &'a Store<C, G>,
}

impl<'a, C: Clock, G: IdGen> Planner<'a, C, G> {
    pub fn new(store: &'a Store<C, G>) -> Self {
        Self { store }
    }

    fn require_container(&self, id: &ElementId) -> Result<Element, StoreError> {
        let element = self.store.require(id)?;
        match element.kind() {
            ElementKind::Plan | ElementKind::Workflow => Ok(element),
            other => Err(StoreError::Constraint(format!(
                "{id} is a {other}, not a plan or workflow"
            ))),
        }
    }

    /// Attach an existing task to a plan. The dependency layer enforces the
    /// plan-status and single-parent rules.
    pub fn add_task_to_plan(
        &self,
        plan: &ElementId,
        task: &ElementId,
        actor: &str,
    ) -> Result<Dependency, StoreError> {
        self.store.add_dependency(NewDependency::new(
            task.clone(),
            plan.clone(),
            DependencyKind::ParentChild,
            actor,
        ))
    }

    pub fn remove_task_from_plan(
        &self,
        plan: &ElementId,
        task: &ElementId,
        actor: &str,
    ) -> Result<(), StoreError> {
        self.store
            .remove_dependency(task, plan, DependencyKind::ParentChild, actor)
    }

    /// Live tasks contained in a plan or workflow, optionally filtered by
    /// status.
    pub fn tasks_in(
        &self,
        container: &ElementId,
        statuses: Option<&[TaskStatus]>,
    ) -> Result<Vec<Element>, StoreError> {
        let deps = self
            .store
            .dependents_of(container, Some(&[DependencyKind::ParentChild]))?;
        let mut tasks = Vec::with_capacity(deps.len());
        for dep in deps {
            let Some(task) = self.store.get(&dep.blocked)? else {
                continue;
            };
            if task.kind() != ElementKind::Task || task.is_tombstoned() {
                continue;
            }
            if let Some(statuses) = statuses {
                let Some(data) = task.as_task() else { continue };
                if !statuses.contains(&data.status) {
                    continue;
                }
            }
            tasks.push(task);
        }
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    /// Status counts for a plan's tasks.
    pub fn plan_progress(&self, plan: &ElementId) -> Result<Progress, StoreError> {
        self.require_container(plan)?;
        self.progress_for(plan)
    }

    pub(crate) fn progress_for(&self, container: &ElementId) -> Result<Progress, StoreError> {
        let tasks = self.tasks_in(container, None)?;
        let mut progress = Progress {
            total: tasks.len(),
            ..Default::default()
        };
        for task in &tasks {
            let Some(data) = task.as_task() else { continue };
            match data.status {
                TaskStatus::Closed => progress.completed += 1,
                TaskStatus::InProgress => progress.in_progress += 1,
                TaskStatus::Blocked => progress.blocked += 1,
                _ => progress.open += 1,
            }
        }
        progress.percentage = if progress.total == 0 {
            100
        } else {
            (progress.completed * 100 / progress.total) as u32
        };
        Ok(progress)
    }

    /// Create a task directly inside a plan. The plan must be draft or
    /// active; a hierarchical id is minted on request.
    pub fn create_task_in_plan(
        &self,
        plan: &ElementId,
        data: TaskData,
        opts: CreateTaskOptions,
        actor: &str,
    ) -> Result<Element, StoreError> {
        let container = self.require_container(plan)?;
        if let Some(plan_data) = container.as_plan() {
            if !plan_data.status.accepts_tasks() {
                return Err(StoreError::Constraint(format!(
                    "plan {plan} is {} and does not accept tasks",
                    plan_data.status
                )));
            }
        }

        let mut new = NewElement::new(ElementData::Task(data), actor);
        new.tags = opts.tags;
        if opts.hierarchical_id {
            let n = self.store.next_child_number(plan.as_str())?;
            new = new.with_id(child_id(plan.as_str(), n));
        }

        let task = self.store.create(new)?;
        self.store.add_dependency(NewDependency::new(
            task.id.clone(),
            plan.clone(),
            DependencyKind::ParentChild,
            actor,
        ))?;
        Ok(task)
    }

    /// Close every closable task in the plan.
    pub fn bulk_close(
        &self,
        plan: &ElementId,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<BulkResult, StoreError> {
        self.bulk_update(plan, actor, |task| {
            if task.status.is_terminal() {
                return None;
            }
            let mut patch = Map::new();
            patch.insert("status".into(), json!("closed"));
            if let Some(reason) = reason {
                patch.insert("close_reason".into(), json!(reason));
            }
            Some(patch)
        })
    }

    /// Defer every active task in the plan.
    pub fn bulk_defer(&self, plan: &ElementId, actor: &str) -> Result<BulkResult, StoreError> {
        self.bulk_update(plan, actor, |task| {
            if task.status.is_terminal() || task.status == TaskStatus::Deferred {
                return None;
            }
            let mut patch = Map::new();
            patch.insert("status".into(), json!("deferred"));
            Some(patch)
        })
    }

    /// Reassign every non-terminal task not already owned by `assignee`.
    pub fn bulk_reassign(
        &self,
        plan: &ElementId,
        assignee: &str,
        actor: &str,
    ) -> Result<BulkResult, StoreError> {
        self.bulk_update(plan, actor, |task| {
            if task.status.is_terminal() || task.assignee.as_deref() == Some(assignee) {
                return None;
            }
            let mut patch = Map::new();
            patch.insert("assignee".into(), json!(assignee));
            Some(patch)
        })
    }

    /// Add tags to every task in the plan missing at least one of them.
    pub fn bulk_tag(
        &self,
        plan: &ElementId,
        tags: &[String],
        actor: &str,
    ) -> Result<BulkResult, StoreError> {
        self.require_container(plan)?;
        let tasks = self.tasks_in(plan, None)?;
        let mut result = BulkResult::default();

        for task in tasks {
            if task.as_task().map(|t| t.status.is_terminal()).unwrap_or(true) {
                result.skipped(&task.id);
                continue;
            }
            let mut merged: BTreeSet<String> = task.tags.clone();
            for tag in tags {
                merged.insert(tag.clone());
            }
            if merged == task.tags {
                result.skipped(&task.id);
                continue;
            }
            let mut patch = Map::new();
            patch.insert(
                "tags".into(),
                Value::Array(merged.into_iter().map(Value::String).collect()),
            );
            match self.store.update(
                &task.id,
                patch,
                UpdateOptions {
                    actor: Some(actor.to_string()),
                    ..Default::default()
                },
            ) {
                Ok(_) => result.updated(&task.id),
                Err(e) => result.errors.push(format!("{}: {e}", task.id)),
            }
        }
        Ok(result)
    }

    /// Shared bulk loop: one transaction per task, skip on `None` patch,
    /// collect errors and keep going.
    fn bulk_update(
        &self,
        plan: &ElementId,
        actor: &str,
        decide: impl Fn(&TaskData) -> Option<Map<String, Value>>,
    ) -> Result<BulkResult, StoreError> {
        self.require_container(plan)?;
        let tasks = self.tasks_in(plan, None)?;
        let mut result = BulkResult::default();

        for task in tasks {
            let Some(data) = task.as_task() else {
                result.skipped(&task.id);
                continue;
            };
            let Some(patch) = decide(data) else {
                result.skipped(&task.id);
                continue;
            };
            match self.store.update(
                &task.id,
                patch,
                UpdateOptions {
                    actor: Some(actor.to_string()),
                    ..Default::default()
                },
            ) {
                Ok(_) => result.updated(&task.id),
                Err(e) => result.errors.push(format!("{}: {e}", task.id)),
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
#[path = "plans_tests.rs"]
mod tests;
