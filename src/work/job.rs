//! # Job abstraction.
//!
//! This module defines the [`Job`] trait, the unit of work gated by the
//! coordinator, and [`JobRef`], an `Arc<dyn Job>` suitable for sharing across
//! threads and the dispatch machinery.
//!
//! The coordinator never cancels a job once dispatched; cancellation of
//! in-flight work stays with the caller. A job that wants to honor a
//! caller-side cancellation signal should observe it internally and return
//! [`WorkError::Canceled`](crate::WorkError::Canceled).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkError;

/// Shared handle to a job (`Arc<dyn Job>`).
pub type JobRef = Arc<dyn Job>;

/// # Asynchronous unit of work.
///
/// A `Job` has a stable [`name`](Job::name) and an async [`run`](Job::run)
/// method. Jobs are executed either inline by the caller (after an accepted
/// [`begin_request`](crate::ControlPoint::begin_request)) or by the dispatch
/// machinery when deferred through
/// [`queue_task`](crate::ControlPoint::queue_task).
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use floodgate::{Job, WorkError};
///
/// struct Demo;
///
/// #[async_trait]
/// impl Job for Demo {
///     fn name(&self) -> &str { "demo" }
///
///     async fn run(&self) -> Result<(), WorkError> {
///         // do work...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Returns a stable, human-readable job name.
    fn name(&self) -> &str;

    /// Executes the job to completion.
    ///
    /// Errors returned from a dispatched job are caught at the dispatch
    /// boundary and reported via the event bus; they never poison the
    /// admission counters.
    async fn run(&self) -> Result<(), WorkError>;
}
