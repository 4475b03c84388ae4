//! Error types used by the floodgate coordinator and its jobs.
//!
//! This module defines two error enums:
//!
//! - [`QueueError`] — errors raised when deferring work through
//!   [`ControlPoint::queue_task`](crate::ControlPoint::queue_task).
//! - [`WorkError`] — errors raised by individual job executions.
//!
//! Admission failure is **not** an error: [`begin_request`](crate::ControlPoint::begin_request)
//! reports it through [`RunResult::Rejected`](crate::RunResult), and callers branch on the value.
//! Both enums provide `as_label` helpers producing stable snake_case strings
//! for logs and metrics.

use thiserror::Error;

/// # Errors produced when queueing deferred work.
///
/// Returned by [`ControlPoint::queue_task`](crate::ControlPoint::queue_task).
/// A queued task that is *accepted* never surfaces an error afterwards; its
/// outcome is reported through events instead.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The control point's queue is bounded and currently at capacity.
    #[error("task queue full")]
    Full,

    /// The owning controller has been dropped; no dispatch is possible.
    #[error("controller closed")]
    Closed,
}

impl QueueError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use floodgate::QueueError;
    ///
    /// assert_eq!(QueueError::Full.as_label(), "queue_full");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Full => "queue_full",
            QueueError::Closed => "queue_closed",
        }
    }
}

/// # Errors produced by job execution.
///
/// Returned by [`Job::run`](crate::Job::run). Errors crossing the dispatch
/// boundary are caught there, reported as a
/// [`JobFailed`](crate::EventKind::JobFailed) event, and never prevent the
/// matching counter decrement.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkError {
    /// Job execution failed.
    #[error("execution failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// Job observed a caller-side cancellation and exited early.
    #[error("canceled by caller")]
    Canceled,
}

impl WorkError {
    /// Convenience constructor for [`WorkError::Failed`].
    pub fn failed(error: impl Into<String>) -> Self {
        WorkError::Failed {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use floodgate::WorkError;
    ///
    /// let err = WorkError::failed("boom");
    /// assert_eq!(err.as_label(), "work_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkError::Failed { .. } => "work_failed",
            WorkError::Canceled => "work_canceled",
        }
    }
}
