// src/engine/filter.rs

use std::collections::BTreeSet;
use std::path::Component;

use crate::types::{ChangeKind, CoalescedEvent};

/// Decides whether a coalesced event should trigger actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFilter {
    kinds: BTreeSet<ChangeKind>,
    recursive: bool,
}

impl Default for ActionFilter {
    fn default() -> Self {
        Self::new(ChangeKind::CREATE_AND_MODIFY, true)
    }
}

impl ActionFilter {
    pub fn new(kinds: impl IntoIterator<Item = ChangeKind>, recursive: bool) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            recursive,
        }
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// True if the event's kind is watched and, for a non-recursive filter,
    /// the file sits directly in the base folder.
    pub fn should_run(&self, event: &CoalescedEvent) -> bool {
        self.kinds.contains(&event.kind) && (self.recursive || is_top_level(event))
    }
}

fn is_top_level(event: &CoalescedEvent) -> bool {
    event
        .path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .count()
        == 1
}
