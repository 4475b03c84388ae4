//! # Events emitted by the coordinator.
//!
//! The [`EventKind`] enum classifies events across four categories:
//! - **Suspend lifecycle**: the running/paused state machine and drain completion
//! - **Queue lifecycle**: deferred tasks entering, leaving and timing out of queues
//! - **Failures**: job errors at the dispatch boundary, counter invariant violations
//! - **Subscriber plumbing**: overflow and panic reports from subscriber workers
//!
//! The [`Event`] struct carries metadata such as timestamps, the control
//! point label, job name, queue-wait time and failure reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use floodgate::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::TaskTimedOut)
//!     .with_point("shop/http")
//!     .with_job("checkout")
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::TaskTimedOut);
//! assert_eq!(ev.point.as_deref(), Some("shop/http"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of coordinator events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `job`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `job`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Suspend lifecycle ===
    /// Controller transitioned Running → Paused.
    SuspendRequested,

    /// Drain condition reached: zero active requests and all queues empty.
    ///
    /// Published immediately before the drain callback fires. May originate
    /// from whichever thread performed the final completion or eviction.
    Drained,

    /// Controller transitioned Paused → Running; queues are being re-dispatched.
    Resumed,

    // === Queue lifecycle ===
    /// A deferred task entered a control point's queue.
    ///
    /// Sets:
    /// - `point`: control point label
    /// - `job`: job name
    /// - `timeout_ms`: eviction timeout, if armed
    TaskQueued,

    /// A deferred task won the claim race and was handed to the runtime.
    ///
    /// Sets:
    /// - `point`: control point label
    /// - `job`: job name
    /// - `source`: which path dispatched it (fast path, completion, resume)
    /// - `waited_ms`: time spent in the queue (absent on the fast path)
    TaskDispatched,

    /// A queued task's timer won the claim race; its timeout handler ran.
    ///
    /// Sets:
    /// - `point`: control point label
    /// - `job`: job name
    /// - `timeout_ms`: the configured timeout
    TaskTimedOut,

    /// A queued task timed out with no handler and was dropped.
    ///
    /// This is the documented lossy path: the work is lost, and this event
    /// is its only trace.
    TaskDropped,

    // === Failures ===
    /// A dispatched job (or timeout handler) returned an error.
    ///
    /// Caught at the dispatch boundary; the admission counters are
    /// decremented regardless.
    JobFailed,

    /// A completion was recorded without a matching admission.
    ///
    /// Fatal invariant violation: counters would go negative. The decrement
    /// is refused and this event is published instead.
    CounterUnderflow,
}

/// Which path dispatched a deferred task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchSource {
    /// Admission succeeded at `queue_task` time; the task never queued.
    Immediate,
    /// A `request_complete` freed capacity and claimed the queue head.
    Completion,
    /// `resume()` drained the queue unconditionally.
    Resume,
}

/// Coordinator event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Control point label (`deployment/entry_point`), if applicable.
    pub point: Option<Arc<str>>,
    /// Job (or subscriber) name, if applicable.
    pub job: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Queue-wait timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Time the task spent queued before dispatch, in milliseconds (compact).
    pub waited_ms: Option<u32>,
    /// Dispatch path for [`EventKind::TaskDispatched`].
    pub source: Option<DispatchSource>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next
    /// sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            point: None,
            job: None,
            reason: None,
            timeout_ms: None,
            waited_ms: None,
            source: None,
        }
    }

    /// Attaches a control point label.
    #[inline]
    pub fn with_point(mut self, point: impl Into<Arc<str>>) -> Self {
        self.point = Some(point.into());
        self
    }

    /// Attaches a job name.
    #[inline]
    pub fn with_job(mut self, job: impl Into<Arc<str>>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches the queue-wait duration (stored as milliseconds).
    #[inline]
    pub fn with_waited(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.waited_ms = Some(ms);
        self
    }

    /// Attaches the dispatch source.
    #[inline]
    pub fn with_source(mut self, source: DispatchSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_job(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_job(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::now(EventKind::SuspendRequested);
        let b = Event::now(EventKind::Resumed);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builders_set_fields() {
        let ev = Event::now(EventKind::TaskDispatched)
            .with_point("shop/http")
            .with_job("checkout")
            .with_waited(Duration::from_millis(250))
            .with_source(DispatchSource::Resume);

        assert_eq!(ev.point.as_deref(), Some("shop/http"));
        assert_eq!(ev.job.as_deref(), Some("checkout"));
        assert_eq!(ev.waited_ms, Some(250));
        assert_eq!(ev.source, Some(DispatchSource::Resume));
    }

    #[test]
    fn test_timeout_saturates_at_u32_max() {
        let ev = Event::now(EventKind::TaskQueued).with_timeout(Duration::from_secs(u64::MAX / 2));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }
}
