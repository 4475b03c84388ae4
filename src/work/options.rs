//! # Options for deferred work.
//!
//! [`QueueOptions`] names every knob of
//! [`queue_task`](crate::ControlPoint::queue_task) explicitly instead of
//! threading positional flags through the call site.

use std::time::Duration;

use crate::work::job::JobRef;

/// Named options controlling how a deferred task is queued and evicted.
///
/// ## Example
/// ```
/// use std::time::Duration;
/// use floodgate::{JobFn, QueueOptions, WorkError};
///
/// let opts = QueueOptions::new()
///     .with_timeout(Duration::from_secs(5))
///     .with_on_timeout(JobFn::arc("send-503", || async {
///         Ok::<_, WorkError>(())
///     }));
/// assert!(!opts.bypass_limit);
/// ```
#[derive(Clone, Default)]
pub struct QueueOptions {
    /// How long the task may wait in the queue before eviction.
    ///
    /// `None` = the task waits indefinitely for dispatch.
    pub timeout: Option<Duration>,

    /// Handler fired when the timeout evicts the task.
    ///
    /// Runs outside the admission bracket (it is an eviction notice, not
    /// admitted work). When `None`, a timed-out task is dropped and the
    /// condition is reported as a
    /// [`TaskDropped`](crate::EventKind::TaskDropped) event.
    pub on_timeout: Option<JobRef>,

    /// Dispatch this task with [`force_begin_request`](crate::ControlPoint::force_begin_request),
    /// skipping global and local limit checks.
    ///
    /// The paused state still defers the task; bypass only exempts it from
    /// capacity ceilings.
    pub bypass_limit: bool,
}

impl QueueOptions {
    /// Creates options with no timeout, no handler, and limit checks enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue-wait timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the eviction handler fired when the timeout wins the claim race.
    pub fn with_on_timeout(mut self, handler: JobRef) -> Self {
        self.on_timeout = Some(handler);
        self
    }

    /// Exempts the task from limit checks on dispatch.
    pub fn with_bypass_limit(mut self) -> Self {
        self.bypass_limit = true;
        self
    }
}
