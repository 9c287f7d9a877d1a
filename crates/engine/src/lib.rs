//! provost-engine: the approval-lifecycle engine.
//!
//! The engine is the sole writer of record lifecycle fields (`status`,
//! `updated_at`, `version`, `history`). Callers create records, request
//! transitions, mutate payloads, and derive reports; every status move is
//! validated against the record type's workflow definition and written
//! with optimistic concurrency control, stamping actor and timestamp into
//! an append-only history.
//!
//! # Public API
//!
//! - [`LifecycleEngine`] -- create / get / list / transition / update / delete
//! - [`TransitionReceipt`] -- committed record plus any observer failures
//! - [`TransitionObserver`], [`ObserverRegistry`] -- post-commit fan-out
//! - [`GradePublicationObserver`] -- per-student rows from a published
//!   grade sheet
//! - [`summarize`], [`Aggregate`] -- derived reporting over a snapshot
//! - [`EngineError`] -- the failure taxonomy

mod engine;
mod error;
pub mod observer;
pub mod observers;
pub mod summary;

pub use engine::{LifecycleEngine, TransitionReceipt};
pub use error::EngineError;
pub use observer::{ObserverError, ObserverFailure, ObserverId, ObserverRegistry, TransitionObserver};
pub use observers::GradePublicationObserver;
pub use summary::{summarize, Aggregate};
