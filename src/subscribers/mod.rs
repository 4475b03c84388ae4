//! # Event subscribers for the floodgate coordinator.
//!
//! This module provides the [`Subscribe`] trait and the fan-out machinery
//! for handling events broadcast through the [`Bus`](crate::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   controller / points ── publish(Event) ──► Bus ──► subscriber listener
//!                                                          │
//!                                                    SubscriberSet::emit
//!                                                   ┌──────┴──────┬────────┐
//!                                                   ▼             ▼        ▼
//!                                               LogWriter      Metrics   ...
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use async_trait::async_trait;
//! use floodgate::{Event, EventKind, Subscribe};
//!
//! struct RejectionMetrics;
//!
//! #[async_trait]
//! impl Subscribe for RejectionMetrics {
//!     async fn on_event(&self, event: &Event) {
//!         if let EventKind::TaskDropped = event.kind {
//!             // increment drop counter
//!         }
//!     }
//!     fn name(&self) -> &'static str { "rejection-metrics" }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
