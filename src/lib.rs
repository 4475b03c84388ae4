//! # floodgate
//!
//! **Floodgate** is a request admission-control and graceful-suspend
//! coordinator for async servers.
//!
//! It gates concurrent units of work entering a running server, enforces
//! global and per-entry-point concurrency ceilings, and implements a
//! race-free protocol for draining in-flight and queued work during a
//! coordinated shutdown or reload. The crate is mechanism only: it performs
//! no I/O, persists nothing, and leaves limit *values* to the embedding
//! management layer.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   listener A            listener B            admin thread
//!       │                     │                      │
//!       ▼                     ▼                      │ suspend()/resume()
//! ┌──────────────┐     ┌──────────────┐              ▼
//! │ ControlPoint │     │ ControlPoint │   ┌─────────────────────────────┐
//! │ "shop/http"  │     │ "shop/jms"   │──►│ RequestController           │
//! │ - local count│     │ - local count│   │ - global count / limit      │
//! │ - FIFO queue │     │ - FIFO queue │   │ - Running ⇄ Paused          │
//! └──────┬───────┘     └──────┬───────┘   │ - parked drain callback     │
//!        │                    │           └──────────────┬──────────────┘
//!        │ begin_request()    │ queue_task()             │
//!        │ request_complete() │                          ▼
//!        │                    │                 Bus ──► SubscriberSet
//!        └────────────────────┴──────────────► (events: queued, dispatched,
//!                                               timed-out, drained, ...)
//! ```
//!
//! ### Admission lifecycle
//! ```text
//! begin_request()
//!   ├─ Paused ──────────────► Rejected
//!   ├─ limit reached ───────► Rejected        (no side effects either way)
//!   └─ otherwise ───────────► Accepted
//!                               └─► caller runs the work
//!                                     └─► request_complete()
//!                                           ├─► claim-dispatch the queue head
//!                                           └─► last one out fires the
//!                                               parked drain callback
//!
//! queue_task(job, opts)
//!   ├─ Running + admitted ──► dispatched inline
//!   └─ otherwise ───────────► parked in FIFO queue
//!        claimed later by: completion | resume() | timeout timer
//!        (one-shot claim: main job XOR timeout handler, exactly once)
//! ```
//!
//! ## Guarantees
//! | Property | Description |
//! |---|---|
//! | **Counter safety** | Counts never go negative and never exceed a configured ceiling; underflow is surfaced, not clamped. |
//! | **No lost wakeups** | Any set of concurrent completions collectively drains a queue exactly once per task. |
//! | **FIFO** | Per-point queues dispatch in enqueue order on resume. |
//! | **Exactly-once** | A queued task fires its main job or its timeout handler, never both, never neither (a handler-less timeout is dropped and reported). |
//! | **Drain precision** | The suspend callback fires only when nothing is in flight and every queue is empty. |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use floodgate::{
//!     ControllerConfig, JobFn, QueueOptions, RequestController, RunResult, WorkError,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let controller = RequestController::builder(ControllerConfig::default()).build();
//!     let point = controller.control_point("shop", "http");
//!
//!     // Synchronous admission bracket.
//!     assert_eq!(point.begin_request(), RunResult::Accepted);
//!     // ... handle the request ...
//!     point.request_complete();
//!
//!     // Deferred work under backpressure.
//!     let report = JobFn::arc("daily-report", || async { Ok::<_, WorkError>(()) });
//!     point.queue_task(report, QueueOptions::new()).unwrap();
//!
//!     // Graceful drain before a reload.
//!     assert!(controller.suspend_and_wait().await);
//!     controller.resume();
//!     controller.shutdown();
//! }
//! ```

mod config;
mod error;
mod events;
mod gate;
mod subscribers;
mod work;

// ---- Public re-exports ----

pub use config::ControllerConfig;
pub use error::{QueueError, WorkError};
pub use events::{Bus, DispatchSource, Event, EventKind};
pub use gate::{ControlPoint, ControllerBuilder, GateState, RequestController, RunResult};
pub use subscribers::{Subscribe, SubscriberSet};
pub use work::{Job, JobFn, JobRef, QueueOptions};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
