// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow-level operations: topological ordering, destructive deletion,
//! and garbage collection of finished ephemeral workflows.

use crate::plans::{Planner, Progress};
use crate::scheduler::{ReadyFilter, ReadyTask, Scheduler};
use foreman_core::{
    Clock, DependencyKind, Element, ElementId, ElementKind, IdGen, StoreError,
};
use foreman_storage::{ElementFilter, Store};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Outcome of [`Workflows::delete_workflow`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowDeleteResult {
    pub workflows_deleted: usize,
    pub tasks_deleted: usize,
}

/// Options for [`Workflows::gc`].
#[derive(Debug, Clone)]
pub struct GcOptions {
    /// Minimum age since `finished_at` before an ephemeral workflow is
    /// collected.
    pub max_age_ms: u64,
    pub limit: Option<usize>,
    pub dry_run: bool,
}

/// Outcome of [`Workflows::gc`].
#[derive(Debug, Clone, Default)]
pub struct GcResult {
    pub workflows_deleted: usize,
    pub tasks_deleted: usize,
    pub workflow_ids: Vec<ElementId>,
}

/// Workflow operations over a store.
pub struct Workflows<'a, C: Clock, G: IdGen> {
    store: &'a Store<C, G>,
}

impl<'a, C: Clock, G: IdGen> Workflows<'a, C, G> {
    pub fn new(store: &'a Store<C, G>) -> Self {
        Self { store }
    }

    fn require_workflow(&self, id: &ElementId) -> Result<Element, StoreError> {
        let element = self.store.require(id)?;
        if element.as_workflow().is_none() {
            return Err(StoreError::Constraint(format!("{id} is not a workflow")));
        }
        Ok(element)
    }

    fn child_tasks(&self, workflow: &ElementId) -> Result<Vec<Element>, StoreError> {
        Planner::new(self.store).tasks_in(workflow, None)
    }

    /// Hard-delete a workflow and its child tasks, events and tags
    /// included. Destructive and journal-erasing, unlike soft delete.
    pub fn delete_workflow(
        &self,
        id: &ElementId,
    ) -> Result<WorkflowDeleteResult, StoreError> {
        self.require_workflow(id)?;
        let children = self.child_tasks(id)?;

        let mut doomed: Vec<ElementId> = vec![id.clone()];
        doomed.extend(children.iter().map(|c| c.id.clone()));
        self.store.hard_delete(&doomed)?;

        info!(workflow = %id, tasks = children.len(), "workflow hard-deleted");
        Ok(WorkflowDeleteResult {
            workflows_deleted: 1,
            tasks_deleted: children.len(),
        })
    }

    /// Collect ephemeral workflows that finished longer than `max_age_ms`
    /// ago. A dry run reports what would go without touching anything.
    pub fn gc(&self, opts: GcOptions) -> Result<GcResult, StoreError> {
        let now = self.store.clock().epoch_ms();
        let cutoff = now.saturating_sub(opts.max_age_ms);

        let workflows = self
            .store
            .list(&ElementFilter::of_kind(ElementKind::Workflow))?;
        let mut result = GcResult::default();

        for workflow in workflows {
            if let Some(limit) = opts.limit {
                if result.workflows_deleted >= limit {
                    break;
                }
            }
            let Some(data) = workflow.as_workflow() else { continue };
            if !data.ephemeral || !data.status.is_terminal() {
                continue;
            }
            let Some(finished_at) = data.finished_at else { continue };
            if finished_at > cutoff {
                continue;
            }

            let children = self.child_tasks(&workflow.id)?;
            if !opts.dry_run {
                let mut doomed: Vec<ElementId> = vec![workflow.id.clone()];
                doomed.extend(children.iter().map(|c| c.id.clone()));
                self.store.hard_delete(&doomed)?;
            }
            result.workflows_deleted += 1;
            result.tasks_deleted += children.len();
            result.workflow_ids.push(workflow.id.clone());
        }

        if result.workflows_deleted > 0 && !opts.dry_run {
            info!(
                workflows = result.workflows_deleted,
                tasks = result.tasks_deleted,
                "ephemeral workflows collected"
            );
        }
        Ok(result)
    }

    /// Kahn's algorithm over the `blocks` sub-DAG induced by the workflow's
    /// tasks. Ready nodes drain by (priority asc, created_at, id); tasks on
    /// a cycle come after every orderable task, deterministically by id.
    pub fn ordered_tasks(&self, id: &ElementId) -> Result<Vec<Element>, StoreError> {
        self.require_workflow(id)?;
        let tasks = self.child_tasks(id)?;
        let members: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

        // blocker -> blocked edges restricted to workflow members
        let mut out_edges: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for task in &tasks {
            in_degree.entry(task.id.as_str()).or_insert(0);
        }
        for task in &tasks {
            for dep in self
                .store
                .dependencies_of(&task.id, Some(&[DependencyKind::Blocks]))?
            {
                if let Some(&blocker) = members.get(dep.blocker.as_str()) {
                    // Hold a member-owned &str so the maps borrow from `tasks`.
                    out_edges.entry(blocker).or_default().push(task.id.as_str());
                    *in_degree.entry(task.id.as_str()).or_insert(0) += 1;
                }
            }
        }

        let by_id: HashMap<&str, &Element> =
            tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let rank = |id: &str| {
            let task = by_id[id];
            (
                task.as_task().map(|t| t.priority).unwrap_or(5),
                task.created_at,
                id.to_string(),
            )
        };

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        ready.sort_by_key(|id| rank(id));

        let mut ordered: Vec<&str> = Vec::with_capacity(tasks.len());
        while !ready.is_empty() {
            let next = ready.remove(0);
            ordered.push(next);
            if let Some(blocked) = out_edges.get(next) {
                for &b in blocked {
                    let d = in_degree.entry(b).or_insert(0);
                    *d -= 1;
                    if *d == 0 {
                        ready.push(b);
                    }
                }
            }
            ready.sort_by_key(|id| rank(id));
        }

        // Whatever never reached in-degree zero sits on a cycle; append it
        // deterministically with no order guarantee beyond that.
        let placed: HashSet<&str> = ordered.iter().copied().collect();
        let mut tail: Vec<&str> = members
            .iter()
            .filter(|m| !placed.contains(*m))
            .copied()
            .collect();
        tail.sort_unstable();
        ordered.extend(tail);

        Ok(ordered
            .into_iter()
            .filter_map(|id| by_id.get(id).map(|t| (*t).clone()))
            .collect())
    }

    /// Ready tasks scoped to one workflow. Ephemeral workflows show their
    /// own children here.
    pub fn ready_tasks(&self, id: &ElementId) -> Result<Vec<ReadyTask>, StoreError> {
        self.require_workflow(id)?;
        let members: HashSet<String> = self
            .child_tasks(id)?
            .into_iter()
            .map(|t| t.id.as_str().to_string())
            .collect();

        let ready = Scheduler::new(self.store).ready(&ReadyFilter {
            include_ephemeral: true,
            ..Default::default()
        })?;
        Ok(ready
            .into_iter()
            .filter(|r| members.contains(r.task.id.as_str()))
            .collect())
    }

    /// Status counts for a workflow's tasks (tombstones excluded).
    pub fn progress(&self, id: &ElementId) -> Result<Progress, StoreError> {
        self.require_workflow(id)?;
        Planner::new(self.store).progress_for(id)
    }
}

#[cfg(test)]
#[path = "workflows_tests.rs"]
mod tests;
