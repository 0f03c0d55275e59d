//! # Carousel Core
//!
//! The job lifecycle engine's shared vocabulary: the `Job` data model,
//! the lifecycle state machine, the `JobStore` and `Transport` trait
//! contracts, and the four pluggable scheduling policies.
//!
//! ## Architecture
//!
//! ```text
//! submit ──► JobStore (S) ──claim_pending──► Policy (P) ──next()──► Transport (T)
//!                ▲                                                      │
//!                │                                                      ▼
//!                └──────────────────── transition ◄──────────── Worker Pool (W)
//! ```
//!
//! `S` is the single source of truth; `P` is a pure in-memory ordering
//! structure owned exclusively by the scheduler engine; `T` is a logical
//! single-writer/multi-reader hand-off between the engine process and
//! the worker pool process. This crate defines the contracts; concrete
//! backends live in `carousel-store-postgres` and
//! `carousel-transport-redis`, and the processes that drive them live in
//! `carousel-engine` and `carousel-worker`.
//!
//! ## Key Invariants
//!
//! 1. Status is monotonic along the legal transitions in [`state_machine`].
//! 2. `retry_count` never exceeds `max_retries`; reaching equality at a
//!    failure transition sends the job to `Failed`, not `Retried`.
//! 3. A job id appears on `T` at most once per scheduling tick.
//! 4. `Completed`/`Failed` jobs are absent from both `P` and `T`.
//!
//! ## What This Is Not
//!
//! Carousel is not a general-purpose event-sourcing or actor framework —
//! it has one job: accept work, order it, run it, and account for every
//! attempt.

pub mod error;
pub mod handler;
pub mod job;
pub mod policy;
pub mod state_machine;
pub mod store;
pub mod transport;

pub use error::{CarouselError, CarouselResult, Categorizable, FailureKind};
pub use handler::{Handler, HandlerRegistry};
pub use job::{
    dlq_entry, DlqEntry, Job, JobFilter, JobSpec, JobStatus, JobSummary, ListResult, Page,
    ResolvedJobSpec, DEFAULT_MAX_RETRIES, DEFAULT_PRIORITY, MAX_PAGE_SIZE, MAX_PRIORITY,
    MIN_PRIORITY,
};
pub use policy::{build as build_policy, Policy, PolicyKind};
pub use state_machine::is_legal_transition;
pub use store::{JobStore, TransitionPatch};
pub use transport::Transport;

// Re-export the macro the `#[async_trait]` sugar depends on, so
// downstream crates implementing these traits don't need a direct
// dependency on `async-trait` themselves.
pub use async_trait::async_trait;
