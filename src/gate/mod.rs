//! Admission gate core: controller, control points, queued tasks.
//!
//! This module contains the coordinator mechanism. The public API surface is
//! [`RequestController`] (process-wide state, suspend/resume protocol) and
//! [`ControlPoint`] (per-entry-point admission bracket and task queue).
//!
//! Internal modules:
//! - [`controller`]: global counters, suspend/resume state machine, drain signal;
//! - [`point`]: per-entry-point admission, FIFO queue, claim-based dispatch;
//! - [`queued`]: deferred task with the one-shot claim flag;
//! - [`counters`]: lock-free counter primitives shared by both levels.

mod controller;
mod counters;
mod point;
mod queued;
mod state;

pub use controller::{ControllerBuilder, RequestController};
pub use point::ControlPoint;
pub use state::{GateState, RunResult};
