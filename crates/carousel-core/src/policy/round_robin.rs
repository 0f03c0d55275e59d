use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

use super::{Policy, PolicyKind};
use crate::job::JobSummary;

/// Round robin: pure insertion order. A job re-offered after a retry
/// lands at the tail, since it arrives as a fresh `offer` call once it
/// cycles back through `Pending`.
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    queue: VecDeque<Uuid>,
    present: HashSet<Uuid>,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Policy for RoundRobinPolicy {
    fn offer(&mut self, job: JobSummary) {
        if !self.present.insert(job.id) {
            return;
        }
        self.queue.push_back(job.id);
    }

    fn next(&mut self) -> Option<Uuid> {
        let id = self.queue.pop_front()?;
        self.present.remove(&id);
        Some(id)
    }

    fn size(&self) -> usize {
        self.queue.len()
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.present.clear();
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::RoundRobin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn summary(id: Uuid) -> JobSummary {
        JobSummary {
            id,
            priority: 5,
            created_at: Utc::now(),
            estimated_duration_millis: 0,
        }
    }

    #[test]
    fn dispatches_in_insertion_order() {
        let mut p = RoundRobinPolicy::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        p.offer(summary(a));
        p.offer(summary(b));
        p.offer(summary(c));

        assert_eq!(p.next(), Some(a));
        assert_eq!(p.next(), Some(b));
        assert_eq!(p.next(), Some(c));
    }

    #[test]
    fn reoffered_id_goes_to_tail() {
        let mut p = RoundRobinPolicy::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        p.offer(summary(a));
        p.offer(summary(b));

        assert_eq!(p.next(), Some(a));
        p.offer(summary(a)); // retried back in
        assert_eq!(p.next(), Some(b));
        assert_eq!(p.next(), Some(a));
    }
}
