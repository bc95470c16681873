// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The ready-task scheduler.
//!
//! `ready()` answers "what can an agent start right now", ordered by
//! effective priority: a task that blocks more urgent work inherits that
//! work's urgency, so unblocking chains drain in the right order.

use foreman_core::{
    Clock, DependencyKind, Element, ElementId, ElementKind, IdGen, PlanStatus, StoreError,
    TaskStatus,
};
use foreman_storage::{ElementFilter, Store};
use std::collections::{HashMap, HashSet};

/// Filter for [`Scheduler::ready`].
#[derive(Debug, Clone, Default)]
pub struct ReadyFilter {
    /// Matches the task's assignee directly, or any team the assignee
    /// belongs to.
    pub assignee: Option<String>,
    pub owner: Option<String>,
    pub priority: Option<u8>,
    pub priority_at_most: Option<u8>,
    pub complexity: Option<u8>,
    pub task_type: Option<String>,
    pub tags_all: Vec<String>,
    /// Include children of ephemeral workflows.
    pub include_ephemeral: bool,
    pub limit: Option<usize>,
}

/// A ready task with the priority it effectively runs at.
#[derive(Debug, Clone)]
pub struct ReadyTask {
    pub task: Element,
    pub effective_priority: u8,
}

/// A blocked task annotated from the cache.
#[derive(Debug, Clone)]
pub struct BlockedTask {
    pub task: Element,
    pub blocked_by: Vec<ElementId>,
    pub reason: Option<String>,
}

/// Work sequencing over a store.
pub struct Scheduler<'a, C: Clock, G: IdGen> {
    store: &'a Store<C, G>,
}

impl<'a, C: Clock, G: IdGen> Scheduler<'a, C, G> {
    pub fn new(store: &'a Store<C, G>) -> Self {
        Self { store }
    }

    /// Tasks an agent can start now, ordered by effective priority
    /// ascending, ties broken by base priority then creation time.
    pub fn ready(&self, filter: &ReadyFilter) -> Result<Vec<ReadyTask>, StoreError> {
        let now = self.store.clock().epoch_ms();

        let mut list_filter = ElementFilter::of_kind(ElementKind::Task);
        list_filter.statuses = vec!["open".into(), "in_progress".into()];
        list_filter.owner = filter.owner.clone();
        list_filter.task_type = filter.task_type.clone();
        list_filter.priority = filter.priority;
        list_filter.priority_at_most = filter.priority_at_most;
        list_filter.complexity = filter.complexity;
        list_filter.tags_all = filter.tags_all.clone();
        let candidates = self.store.list(&list_filter)?;

        // One cache read answers every membership question below.
        let blocked: HashSet<String> = self
            .store
            .blocked_entries()?
            .into_iter()
            .map(|e| e.element_id.as_str().to_string())
            .collect();

        // Team-aware assignee match: the filter's assignee also matches
        // tasks assigned to any team they belong to.
        let allowed_assignees: Option<HashSet<String>> = match &filter.assignee {
            None => None,
            Some(assignee) => {
                let mut allowed = HashSet::from([assignee.clone()]);
                let teams = self.store.list(&ElementFilter {
                    kind: Some(ElementKind::Team),
                    member: Some(assignee.clone()),
                    ..Default::default()
                })?;
                for team in teams {
                    allowed.insert(team.id.as_str().to_string());
                }
                Some(allowed)
            }
        };

        let mut eligible = Vec::new();
        for task in candidates {
            let Some(data) = task.as_task() else { continue };

            if let Some(allowed) = &allowed_assignees {
                match &data.assignee {
                    Some(assignee) if allowed.contains(assignee) => {}
                    _ => continue,
                }
            }
            if blocked.contains(task.id.as_str()) {
                continue;
            }
            if let Some(scheduled_for) = data.scheduled_for {
                if scheduled_for > now {
                    continue;
                }
            }
            if !self.parent_allows(&task, &blocked, filter.include_ephemeral)? {
                continue;
            }
            eligible.push(task);
        }

        let mut memo: HashMap<String, u8> = HashMap::new();
        let mut ready: Vec<ReadyTask> = Vec::with_capacity(eligible.len());
        for task in eligible {
            let mut visiting = HashSet::new();
            let effective = self.effective_priority(&task, &mut memo, &mut visiting)?;
            ready.push(ReadyTask {
                task,
                effective_priority: effective,
            });
        }

        ready.sort_by(|a, b| {
            let pa = a.task.as_task().map(|t| t.priority).unwrap_or(5);
            let pb = b.task.as_task().map(|t| t.priority).unwrap_or(5);
            a.effective_priority
                .cmp(&b.effective_priority)
                .then(pa.cmp(&pb))
                .then(a.task.created_at.cmp(&b.task.created_at))
                .then(a.task.id.cmp(&b.task.id))
        });
        if let Some(limit) = filter.limit {
            ready.truncate(limit);
        }
        Ok(ready)
    }

    /// Container checks the cache does not cover: a draft parent plan hides
    /// children, and ephemeral-workflow children are excluded by default.
    fn parent_allows(
        &self,
        task: &Element,
        blocked: &HashSet<String>,
        include_ephemeral: bool,
    ) -> Result<bool, StoreError> {
        let parents = self
            .store
            .dependencies_of(&task.id, Some(&[DependencyKind::ParentChild]))?;
        let Some(parent_dep) = parents.first() else {
            return Ok(true);
        };
        if blocked.contains(parent_dep.blocker.as_str()) {
            return Ok(false);
        }
        let Some(parent) = self.store.get(&parent_dep.blocker)? else {
            return Ok(true);
        };
        if let Some(plan) = parent.as_plan() {
            if plan.status == PlanStatus::Draft {
                return Ok(false);
            }
        }
        if let Some(workflow) = parent.as_workflow() {
            if workflow.ephemeral && !include_ephemeral {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `effective(T) = min(T.priority, min over tasks X with
    /// (X, T, blocks|awaits) of effective(X))`, with visited-set cycle
    /// fallback to the base priority.
    fn effective_priority(
        &self,
        task: &Element,
        memo: &mut HashMap<String, u8>,
        visiting: &mut HashSet<String>,
    ) -> Result<u8, StoreError> {
        let base = task.as_task().map(|t| t.priority).unwrap_or(5);
        if let Some(&cached) = memo.get(task.id.as_str()) {
            return Ok(cached);
        }
        if !visiting.insert(task.id.as_str().to_string()) {
            return Ok(base);
        }

        let mut effective = base;
        let dependents = self.store.dependents_of(
            &task.id,
            Some(&[DependencyKind::Blocks, DependencyKind::Awaits]),
        )?;
        for dep in dependents {
            let Some(dependent) = self.store.get(&dep.blocked)? else {
                continue;
            };
            if dependent.kind() != ElementKind::Task || dependent.is_tombstoned() {
                continue;
            }
            let upstream = self.effective_priority(&dependent, memo, visiting)?;
            effective = effective.min(upstream);
        }

        visiting.remove(task.id.as_str());
        memo.insert(task.id.as_str().to_string(), effective);
        Ok(effective)
    }

    /// The triage queue: backlog tasks by (priority asc, created_at asc).
    /// Not part of the ready set.
    pub fn backlog(&self, limit: Option<usize>) -> Result<Vec<Element>, StoreError> {
        let mut tasks = self.store.list(
            &ElementFilter::of_kind(ElementKind::Task)
                .with_status(TaskStatus::Backlog.as_str()),
        )?;
        tasks.sort_by(|a, b| {
            let pa = a.as_task().map(|t| t.priority).unwrap_or(5);
            let pb = b.as_task().map(|t| t.priority).unwrap_or(5);
            pa.cmp(&pb)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        if let Some(limit) = limit {
            tasks.truncate(limit);
        }
        Ok(tasks)
    }

    /// Currently blocked tasks annotated with blockers and reason.
    pub fn blocked_tasks(&self) -> Result<Vec<BlockedTask>, StoreError> {
        let mut result = Vec::new();
        for entry in self.store.blocked_entries()? {
            let Some(task) = self.store.get(&entry.element_id)? else {
                continue;
            };
            if task.kind() != ElementKind::Task || task.is_tombstoned() {
                continue;
            }
            result.push(BlockedTask {
                task,
                blocked_by: entry.blocked_by,
                reason: entry.reason,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
