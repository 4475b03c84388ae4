//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [suspend-requested]
//! [queued] point=shop/http job=checkout timeout_ms=5000
//! [dispatched] point=shop/http job=checkout source=Resume waited_ms=120
//! [timed-out] point=shop/http job=checkout timeout_ms=5000
//! [dropped] point=shop/http job=checkout
//! [drained]
//! [resumed]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event
/// descriptions to stdout for debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::SuspendRequested => {
                println!("[suspend-requested]");
            }
            EventKind::Drained => {
                println!("[drained]");
            }
            EventKind::Resumed => {
                println!("[resumed]");
            }
            EventKind::TaskQueued => {
                println!(
                    "[queued] point={:?} job={:?} timeout_ms={:?}",
                    e.point, e.job, e.timeout_ms
                );
            }
            EventKind::TaskDispatched => {
                println!(
                    "[dispatched] point={:?} job={:?} source={:?} waited_ms={:?}",
                    e.point, e.job, e.source, e.waited_ms
                );
            }
            EventKind::TaskTimedOut => {
                println!(
                    "[timed-out] point={:?} job={:?} timeout_ms={:?}",
                    e.point, e.job, e.timeout_ms
                );
            }
            EventKind::TaskDropped => {
                println!("[dropped] point={:?} job={:?}", e.point, e.job);
            }
            EventKind::JobFailed => {
                println!(
                    "[job-failed] point={:?} job={:?} err={:?}",
                    e.point, e.job, e.reason
                );
            }
            EventKind::CounterUnderflow => {
                println!("[counter-underflow] point={:?}", e.point);
            }
            EventKind::SubscriberOverflow => {
                println!("[subscriber-overflow] sub={:?} reason={:?}", e.job, e.reason);
            }
            EventKind::SubscriberPanicked => {
                println!("[subscriber-panic] sub={:?} info={:?}", e.job, e.reason);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
