use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Policy, PolicyKind};
use crate::job::JobSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    estimated_duration_millis: u64,
    created_at: DateTime<Utc>,
    id: Uuid,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.estimated_duration_millis
            .cmp(&other.estimated_duration_millis)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest job first: estimated_duration ascending, then created_at,
/// then id.
#[derive(Debug, Default)]
pub struct SjfPolicy {
    heap: BinaryHeap<Reverse<Entry>>,
    present: HashSet<Uuid>,
}

impl SjfPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for SjfPolicy {
    fn offer(&mut self, job: JobSummary) {
        if !self.present.insert(job.id) {
            return;
        }
        self.heap.push(Reverse(Entry {
            estimated_duration_millis: job.estimated_duration_millis,
            created_at: job.created_at,
            id: job.id,
        }));
    }

    fn next(&mut self) -> Option<Uuid> {
        let Reverse(entry) = self.heap.pop()?;
        self.present.remove(&entry.id);
        Some(entry.id)
    }

    fn size(&self) -> usize {
        self.heap.len()
    }

    fn clear(&mut self) {
        self.heap.clear();
        self.present.clear();
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Sjf
    }
}
