use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Policy, PolicyKind};
use crate::job::JobSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    priority: u8,
    created_at: DateTime<Utc>,
    id: Uuid,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority value ascending (1 = highest, runs first), then created_at,
/// then id.
#[derive(Debug, Default)]
pub struct PriorityPolicy {
    heap: BinaryHeap<Reverse<Entry>>,
    present: HashSet<Uuid>,
}

impl PriorityPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for PriorityPolicy {
    fn offer(&mut self, job: JobSummary) {
        if !self.present.insert(job.id) {
            return;
        }
        self.heap.push(Reverse(Entry {
            priority: job.priority,
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
        PolicyKind::Priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn summary(id: Uuid, priority: u8, offset_secs: i64) -> JobSummary {
        JobSummary {
            id,
            priority,
            created_at: Utc::now() + Duration::seconds(offset_secs),
            estimated_duration_millis: 0,
        }
    }

    #[test]
    fn lower_priority_value_dispatches_first() {
        let mut p = PriorityPolicy::new();
        let low_prio = Uuid::new_v4(); // priority 9 = runs last
        let high_prio = Uuid::new_v4(); // priority 1 = runs first
        p.offer(summary(low_prio, 9, 0));
        p.offer(summary(high_prio, 1, 1));

        assert_eq!(p.next(), Some(high_prio));
        assert_eq!(p.next(), Some(low_prio));
    }
}
