//! Pluggable scheduling policies: pure in-memory ordering structures with
//! no I/O, owned exclusively by the scheduler engine.

mod fcfs;
mod priority;
mod round_robin;
mod sjf;

pub use fcfs::FcfsPolicy;
pub use priority::PriorityPolicy;
pub use round_robin::RoundRobinPolicy;
pub use sjf::SjfPolicy;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CarouselError, CarouselResult};
use crate::job::JobSummary;

/// The four supported scheduling disciplines. A sum type rather than
/// open-ended dynamic dispatch — the engine holds exactly one live
/// discipline at a time and swaps it wholesale on a policy change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Fcfs,
    Sjf,
    Priority,
    RoundRobin,
}

impl PolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Fcfs => "fcfs",
            PolicyKind::Sjf => "sjf",
            PolicyKind::Priority => "priority",
            PolicyKind::RoundRobin => "round_robin",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = CarouselError;

    fn from_str(s: &str) -> CarouselResult<Self> {
        match s {
            "fcfs" => Ok(PolicyKind::Fcfs),
            "sjf" => Ok(PolicyKind::Sjf),
            "priority" => Ok(PolicyKind::Priority),
            "round_robin" => Ok(PolicyKind::RoundRobin),
            other => Err(CarouselError::Validation(format!(
                "unknown policy: {other}"
            ))),
        }
    }
}

/// Uniform ordering contract every policy variant implements.
pub trait Policy: Send {
    /// Inserts a job. Idempotent w.r.t. id: a second offer of an id
    /// already present is a no-op.
    fn offer(&mut self, job: JobSummary);

    /// Returns and removes the next id per policy order. Never blocks;
    /// returns `None` when empty.
    fn next(&mut self) -> Option<Uuid>;

    /// Number of ids currently held.
    fn size(&self) -> usize;

    /// Drops every held id. Called on policy switch, after any ids still
    /// held have been migrated into the replacement policy.
    fn clear(&mut self);

    fn kind(&self) -> PolicyKind;
}

/// Builds a fresh, empty policy of the given kind.
pub fn build(kind: PolicyKind) -> Box<dyn Policy> {
    match kind {
        PolicyKind::Fcfs => Box::new(FcfsPolicy::new()),
        PolicyKind::Sjf => Box::new(SjfPolicy::new()),
        PolicyKind::Priority => Box::new(PriorityPolicy::new()),
        PolicyKind::RoundRobin => Box::new(RoundRobinPolicy::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn summary(id: Uuid, priority: u8, offset_secs: i64, duration_ms: u64) -> JobSummary {
        JobSummary {
            id,
            priority,
            created_at: Utc::now() + Duration::seconds(offset_secs),
            estimated_duration_millis: duration_ms,
        }
    }

    #[test]
    fn policy_kind_round_trips_through_str() {
        for kind in [
            PolicyKind::Fcfs,
            PolicyKind::Sjf,
            PolicyKind::Priority,
            PolicyKind::RoundRobin,
        ] {
            let parsed: PolicyKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn unknown_policy_name_is_rejected() {
        assert!("backfill".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn offer_is_idempotent_per_id() {
        let mut p = build(PolicyKind::Fcfs);
        let id = Uuid::new_v4();
        p.offer(summary(id, 5, 0, 0));
        assert_eq!(p.size(), 1);
        p.offer(summary(id, 5, 0, 0));
        assert_eq!(p.size(), 1, "duplicate offer must be a no-op");
    }

    #[test]
    fn clear_empties_the_policy() {
        let mut p = build(PolicyKind::Priority);
        p.offer(summary(Uuid::new_v4(), 1, 0, 0));
        p.offer(summary(Uuid::new_v4(), 2, 1, 0));
        assert_eq!(p.size(), 2);
        p.clear();
        assert_eq!(p.size(), 0);
        assert!(p.next().is_none());
    }
}
