// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The unified element model: one header shape shared by every variant, with
//! the variant payload carried as a tagged union.
//!
//! Elements serialise flat: the header fields and the payload fields live in
//! one JSON object, discriminated by `"type"`. The store persists the payload
//! alone in the `data` column and reassembles the header from row columns.

use crate::channel::{ChannelData, MessageData};
use crate::document::DocumentData;
use crate::entity::{EntityData, LibraryData, TeamData};
use crate::plan::{PlanData, WorkflowData};
use crate::task::{TaskData, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

crate::define_id! {
    /// Globally unique, opaque element identifier.
    ///
    /// Plans and workflows may mint hierarchical child ids of the form
    /// `<parent>.<n>`; see [`crate::id::child_id`].
    #[derive(Default)]
    pub struct ElementId;
}

/// Discriminant for the element variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Task,
    Plan,
    Workflow,
    Channel,
    Message,
    Document,
    Entity,
    Team,
    Library,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Task => "task",
            ElementKind::Plan => "plan",
            ElementKind::Workflow => "workflow",
            ElementKind::Channel => "channel",
            ElementKind::Message => "message",
            ElementKind::Document => "document",
            ElementKind::Entity => "entity",
            ElementKind::Team => "team",
            ElementKind::Library => "library",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task" => Some(ElementKind::Task),
            "plan" => Some(ElementKind::Plan),
            "workflow" => Some(ElementKind::Workflow),
            "channel" => Some(ElementKind::Channel),
            "message" => Some(ElementKind::Message),
            "document" => Some(ElementKind::Document),
            "entity" => Some(ElementKind::Entity),
            "team" => Some(ElementKind::Team),
            "library" => Some(ElementKind::Library),
            _ => None,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Variant payload, discriminated by `"type"` in its JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementData {
    Task(TaskData),
    Plan(PlanData),
    Workflow(WorkflowData),
    Channel(ChannelData),
    Message(MessageData),
    Document(DocumentData),
    Entity(EntityData),
    Team(TeamData),
    Library(LibraryData),
}

impl ElementData {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementData::Task(_) => ElementKind::Task,
            ElementData::Plan(_) => ElementKind::Plan,
            ElementData::Workflow(_) => ElementKind::Workflow,
            ElementData::Channel(_) => ElementKind::Channel,
            ElementData::Message(_) => ElementKind::Message,
            ElementData::Document(_) => ElementKind::Document,
            ElementData::Entity(_) => ElementKind::Entity,
            ElementData::Team(_) => ElementKind::Team,
            ElementData::Library(_) => ElementKind::Library,
        }
    }

    /// Current lifecycle status as its wire string, for variants that have one.
    pub fn status_str(&self) -> Option<&'static str> {
        match self {
            ElementData::Task(t) => Some(t.status.as_str()),
            ElementData::Plan(p) => Some(p.status.as_str()),
            ElementData::Workflow(w) => Some(w.status.as_str()),
            ElementData::Document(d) => Some(d.status.as_str()),
            _ => None,
        }
    }

    /// Whether this element, as a blocker, satisfies `blocks`/`awaits` edges.
    ///
    /// Variants without a lifecycle never hold work back.
    pub fn is_terminal(&self) -> bool {
        match self {
            ElementData::Task(t) => t.status.is_terminal(),
            ElementData::Plan(p) => p.status.is_terminal(),
            ElementData::Workflow(w) => w.status.is_terminal(),
            _ => true,
        }
    }

    /// Whether the current status sits in the variant's closed set, used to
    /// derive `closed`/`reopened` lifecycle events on status transitions.
    ///
    /// A draft plan counts as closed: activating it is a reopen as far as the
    /// journal is concerned, which is what lets draft plans hide their
    /// children and then release them with a single observable transition.
    pub fn is_in_closed_set(&self) -> bool {
        match self {
            ElementData::Task(t) => t.status.is_terminal(),
            ElementData::Plan(p) => !matches!(p.status, crate::plan::PlanStatus::Active),
            ElementData::Workflow(w) => !matches!(w.status, crate::plan::WorkflowStatus::Running),
            ElementData::Document(d) => matches!(d.status, crate::document::DocumentStatus::Archived),
            _ => false,
        }
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        match self {
            ElementData::Task(d) => &d.metadata,
            ElementData::Plan(d) => &d.metadata,
            ElementData::Workflow(d) => &d.metadata,
            ElementData::Channel(d) => &d.metadata,
            ElementData::Message(d) => &d.metadata,
            ElementData::Document(d) => &d.metadata,
            ElementData::Entity(d) => &d.metadata,
            ElementData::Team(d) => &d.metadata,
            ElementData::Library(d) => &d.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            ElementData::Task(d) => &mut d.metadata,
            ElementData::Plan(d) => &mut d.metadata,
            ElementData::Workflow(d) => &mut d.metadata,
            ElementData::Channel(d) => &mut d.metadata,
            ElementData::Message(d) => &mut d.metadata,
            ElementData::Document(d) => &mut d.metadata,
            ElementData::Entity(d) => &mut d.metadata,
            ElementData::Team(d) => &mut d.metadata,
            ElementData::Library(d) => &mut d.metadata,
        }
    }
}

/// A stored element: header plus variant payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    #[serde(flatten)]
    pub data: ElementData,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<u64>,
    #[serde(default)]
    pub content_hash: String,
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        self.data.kind()
    }

    /// Soft-deleted elements keep their id and history but are excluded from
    /// default views.
    pub fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn as_task(&self) -> Option<&TaskData> {
        match &self.data {
            ElementData::Task(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_task_mut(&mut self) -> Option<&mut TaskData> {
        match &mut self.data {
            ElementData::Task(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_plan(&self) -> Option<&PlanData> {
        match &self.data {
            ElementData::Plan(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_workflow(&self) -> Option<&WorkflowData> {
        match &self.data {
            ElementData::Workflow(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&ChannelData> {
        match &self.data {
            ElementData::Channel(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageData> {
        match &self.data {
            ElementData::Message(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&DocumentData> {
        match &self.data {
            ElementData::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityData> {
        match &self.data {
            ElementData::Entity(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_team(&self) -> Option<&TeamData> {
        match &self.data {
            ElementData::Team(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_library(&self) -> Option<&LibraryData> {
        match &self.data {
            ElementData::Library(d) => Some(d),
            _ => None,
        }
    }

    /// Mark the task-variant status tombstone alongside `deleted_at`.
    pub fn tombstone(&mut self, at: u64) {
        self.deleted_at = Some(at);
        if let ElementData::Task(t) = &mut self.data {
            t.status = TaskStatus::Tombstone;
        }
    }
}

/// Input for creating an element. The store assigns the id when absent.
#[derive(Debug, Clone)]
pub struct NewElement {
    pub id: Option<ElementId>,
    pub created_by: String,
    pub tags: BTreeSet<String>,
    pub data: ElementData,
}

impl NewElement {
    pub fn new(data: ElementData, created_by: impl Into<String>) -> Self {
        Self {
            id: None,
            created_by: created_by.into(),
            tags: BTreeSet::new(),
            data,
        }
    }

    pub fn with_id(mut self, id: impl Into<ElementId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

#[cfg(test)]
#[path = "element_tests.rs"]
mod tests;
