//! # Admission outcome and controller state.
//!
//! Two small value types shared across the gate:
//! - [`RunResult`]: outcome of one admission attempt.
//! - [`GateState`]: the controller's running/paused state machine.
//!
//! ## Invariants
//! - `Rejected` has no side effects; a rejected caller must not proceed and
//!   must not call [`request_complete`](crate::ControlPoint::request_complete).
//! - Every `Accepted` must be matched by exactly one
//!   [`request_complete`](crate::ControlPoint::request_complete), including on
//!   error paths.

/// Outcome of an admission attempt.
///
/// Returned by [`begin_request`](crate::ControlPoint::begin_request). Value
/// type with no identity; callers branch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunResult {
    /// The request was admitted; counters are incremented.
    ///
    /// The caller owns one completion obligation and must call
    /// `request_complete()` when the unit of work finishes.
    Accepted,

    /// The request was not admitted; no side effects occurred.
    ///
    /// Map this to a hard "do not proceed" signal (e.g., a
    /// service-unavailable response). Callers that prefer deferral over
    /// rejection use [`queue_task`](crate::ControlPoint::queue_task) instead.
    Rejected,
}

/// State of the request controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    /// Accepting new admissions (initial state).
    Running,

    /// Suspended: `begin_request` rejects, `queue_task` defers, in-flight and
    /// queued work drains toward the pending drain callback.
    Paused,
}
