//! The legal transition graph for a job's lifecycle.
//!
//! ```text
//!         submit
//!   ∅ ─────────► PENDING ─────E────► SCHEDULED ─────W────► RUNNING
//!                   ▲                                         │
//!                   │                                         ├─ ok ──► COMPLETED
//!                   │                                         │
//!                   └──────── RETRIED ◄──── retry ────────────┤
//!                                                             │
//!                                                             └─ exhausted ──► FAILED
//! ```
//!
//! `RETRIED` is transient: a job lands there for exactly one observable
//! instant before being re-inserted as `PENDING`.

use crate::job::JobStatus;

/// Whether `to` is a legal next state from `from`. Used by stores to
/// reject transitions the caller has no business requesting, independent
/// of whatever the row's *current* status happens to be (that's the CAS
/// check, not this one).
pub fn is_legal_transition(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Scheduled)
            | (Scheduled, Running)
            | (Scheduled, Pending) // compensating rollback when a dispatch fails to push
            | (Running, Completed)
            | (Running, Retried)
            | (Running, Failed)
            | (Retried, Pending)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    #[test]
    fn happy_path_is_legal() {
        assert!(is_legal_transition(Pending, Scheduled));
        assert!(is_legal_transition(Scheduled, Running));
        assert!(is_legal_transition(Running, Completed));
    }

    #[test]
    fn retry_loop_is_legal() {
        assert!(is_legal_transition(Running, Retried));
        assert!(is_legal_transition(Retried, Pending));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edge() {
        for to in [Pending, Scheduled, Running, Completed, Failed, Retried] {
            assert!(!is_legal_transition(Completed, to));
            assert!(!is_legal_transition(Failed, to));
        }
    }

    #[test]
    fn cannot_skip_scheduled() {
        assert!(!is_legal_transition(Pending, Running));
    }
}
