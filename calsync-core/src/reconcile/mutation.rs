use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::event::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => write!(f, "+"),
            MutationKind::Update => write!(f, "~"),
            MutationKind::Delete => write!(f, "-"),
        }
    }
}

/// One write against the destination calendar.
#[derive(Debug)]
pub(crate) enum Mutation<'e> {
    Create(&'e Event),
    Update { id: &'e str, event: &'e Event },
    Delete(&'e Event),
}

impl Mutation<'_> {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Create(_) => MutationKind::Create,
            Mutation::Update { .. } => MutationKind::Update,
            Mutation::Delete(_) => MutationKind::Delete,
        }
    }

    pub fn event(&self) -> &Event {
        match self {
            Mutation::Create(event) | Mutation::Delete(event) => event,
            Mutation::Update { event, .. } => event,
        }
    }
}

impl fmt::Display for Mutation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.event().summary)
    }
}

/// What one pass did to a destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Mutations that failed and were skipped.
    pub failed: usize,
}

impl SyncStats {
    pub fn record(&mut self, kind: MutationKind) {
        match kind {
            MutationKind::Create => self.created += 1,
            MutationKind::Update => self.updated += 1,
            MutationKind::Delete => self.deleted += 1,
        }
    }

    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl AddAssign for SyncStats {
    fn add_assign(&mut self, other: SyncStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} unchanged",
            self.created, self.updated, self.deleted, self.unchanged
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}
