use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Policy, PolicyKind};
use crate::job::JobSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    created_at: DateTime<Utc>,
    id: Uuid,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// First-come, first-served: created_at ascending, id ascending on ties.
#[derive(Debug, Default)]
pub struct FcfsPolicy {
    heap: BinaryHeap<Reverse<Entry>>,
    present: HashSet<Uuid>,
}

impl FcfsPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for FcfsPolicy {
    fn offer(&mut self, job: JobSummary) {
        if !self.present.insert(job.id) {
            return;
        }
        self.heap.push(Reverse(Entry {
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
        PolicyKind::Fcfs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn summary(id: Uuid, offset_secs: i64) -> JobSummary {
        JobSummary {
            id,
            priority: 5,
            created_at: Utc::now() + Duration::seconds(offset_secs),
            estimated_duration_millis: 0,
        }
    }

    #[test]
    fn drains_in_created_at_order() {
        let mut p = FcfsPolicy::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        p.offer(summary(b, 2));
        p.offer(summary(a, 0));
        p.offer(summary(c, 3));

        assert_eq!(p.next(), Some(a));
        assert_eq!(p.next(), Some(b));
        assert_eq!(p.next(), Some(c));
        assert_eq!(p.next(), None);
    }

    #[test]
    fn ties_break_on_id_ascending() {
        let mut p = FcfsPolicy::new();
        let now = Utc::now();
        let lo = Uuid::from_u128(1);
        let hi = Uuid::from_u128(2);
        p.offer(JobSummary {
            id: hi,
            priority: 5,
            created_at: now,
            estimated_duration_millis: 0,
        });
        p.offer(JobSummary {
            id: lo,
            priority: 5,
            created_at: now,
            estimated_duration_millis: 0,
        });

        assert_eq!(p.next(), Some(lo));
        assert_eq!(p.next(), Some(hi));
    }
}
