//! The error taxonomy shared by every Carousel crate.
//!
//! `CarouselError` gives each kind of failure its own variant so store/
//! engine/worker code can match on *kind* rather than on string content.
//! `Categorizable` lets a handler's opaque failure be mapped onto
//! [`FailureKind`] for the worker pool's retry/DLQ decision.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CarouselError {
    /// Bad submission inputs. Surfaced to the caller; no state change.
    #[error("invalid job spec: {0}")]
    Validation(String),

    /// Unknown job id.
    #[error("job {0} not found")]
    NotFound(Uuid),

    /// A compare-and-set transition did not match the expected `from`
    /// status. Inside the engine/worker this is routine and handled by
    /// dropping the message; surfaced only to `cancel`.
    #[error("job {id} is {actual}, expected {expected}")]
    Conflict {
        id: Uuid,
        expected: String,
        actual: String,
    },

    /// A job handler raised a failure. Drives retry/DLQ accounting; never
    /// surfaced synchronously to a submitter.
    #[error("handler failed: {0}")]
    HandlerFailure(String),

    /// Store or transport unreachable. The caller should back off and
    /// retry; no job is lost because state only advances after a durable
    /// commit.
    #[error("transient infrastructure error: {0}")]
    Transient(#[source] anyhow::Error),

    /// Unknown `job_type` dispatched to a worker. Validation at
    /// `JobStore::create` should make this unreachable in practice; it is
    /// handled as a `HandlerFailure` with no retry (defense in depth).
    #[error("no handler registered for job_type {0:?}")]
    UnknownJobType(String),
}

pub type CarouselResult<T> = Result<T, CarouselError>;

/// Whether a handler failure should consume a retry or go straight to the
/// dead-letter queue. Mirrors the `FailureKind` distinction the Postgres
/// store uses to decide between backoff and immediate dead-lettering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Retryable,
    NonRetryable,
}

/// Lets a handler's own error type be mapped onto [`FailureKind`] without
/// the worker pool knowing anything about that error type's internals.
pub trait Categorizable {
    fn failure_kind(&self) -> FailureKind;
}

impl Categorizable for CarouselError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            CarouselError::UnknownJobType(_) => FailureKind::NonRetryable,
            _ => FailureKind::Retryable,
        }
    }
}
