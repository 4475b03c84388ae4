//! Coordinator events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the controller, control points,
//! timeout timers and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`DispatchSource`] which path dispatched a deferred task
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `RequestController` (suspend lifecycle),
//!   `ControlPoint` (queue/dispatch lifecycle), timeout timers (evictions),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumer**: the controller's subscriber listener, which fans events
//!   out to the [`SubscriberSet`](crate::SubscriberSet).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{DispatchSource, Event, EventKind};
