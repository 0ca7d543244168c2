//! The question board: status-partitioned question collections.
//!
//! The board is the single owner of the active, approved and deleted
//! partitions. The lifecycle controller never touches it; the board owner
//! feeds it `LifecycleEvent`s and it moves questions between partitions.

use serde::{Deserialize, Serialize};

use crate::lifecycle::{EventKind, LifecycleEvent};
use crate::model::{ListStatus, Question};

/// Owned aggregate of every question the reviewer can see.
#[derive(Debug, Clone, Default)]
pub struct QuestionBoard {
    active: Vec<Question>,
    approved: Vec<Question>,
    deleted: Vec<Question>,
}

/// Immutable copy of the board partitions, sorted for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub active: Vec<Question>,
    pub approved: Vec<Question>,
    pub deleted: Vec<Question>,
}

impl BoardSnapshot {
    pub fn len(&self) -> usize {
        self.active.len() + self.approved.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QuestionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the partitions with freshly listed questions.
    ///
    /// Each question lands in the partition its own status maps to, not the
    /// one it was listed under.
    pub fn initialize<I>(&mut self, questions: I)
    where
        I: IntoIterator<Item = Question>,
    {
        self.active.clear();
        self.approved.clear();
        self.deleted.clear();
        for question in questions {
            self.upsert(question);
        }
    }

    /// Add newly generated questions to the active partition.
    pub fn insert_generated<I>(&mut self, questions: I)
    where
        I: IntoIterator<Item = Question>,
    {
        for question in questions {
            self.upsert(question);
        }
    }

    /// Move the event's question to the partition matching its new status.
    /// A purged question is removed from every partition.
    pub fn apply_transition(&mut self, event: &LifecycleEvent) {
        self.remove(&event.question.id);
        if event.kind != EventKind::Purged {
            self.insert(event.question.clone());
        }
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.active
            .iter()
            .chain(&self.approved)
            .chain(&self.deleted)
            .find(|q| q.id == id)
    }

    /// Active questions newest first; deleted ones most recently deleted first.
    pub fn snapshot(&self) -> BoardSnapshot {
        let mut active = self.active.clone();
        let mut approved = self.approved.clone();
        let mut deleted = self.deleted.clone();

        active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        approved.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        deleted.sort_by(|a, b| {
            b.deleted_at
                .cmp(&a.deleted_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        BoardSnapshot {
            active,
            approved,
            deleted,
        }
    }

    fn upsert(&mut self, question: Question) {
        self.remove(&question.id);
        self.insert(question);
    }

    fn insert(&mut self, question: Question) {
        let partition = match question.status.partition() {
            ListStatus::InProgress => &mut self.active,
            ListStatus::Approved => &mut self.approved,
            ListStatus::Deleted => &mut self.deleted,
        };
        partition.push(question);
    }

    fn remove(&mut self, id: &str) {
        self.active.retain(|q| q.id != id);
        self.approved.retain(|q| q.id != id);
        self.deleted.retain(|q| q.id != id);
    }
}
