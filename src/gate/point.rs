//! # ControlPoint: named admission gate for one entry point.
//!
//! A [`ControlPoint`] brackets units of work entering the server through one
//! logical entry point (e.g., one deployment's listener). It owns a local
//! active count, an optional local limit, and a FIFO queue of deferred tasks.
//!
//! ## Admission bracket
//! ```text
//! begin_request() ──► Accepted ──► [ caller runs the work ] ──► request_complete()
//!        │
//!        └──► Rejected (paused, or a limit is hit; no side effects)
//! ```
//!
//! ## Deferred work
//! ```text
//! queue_task(job, opts)
//!   ├─ running + admitted ──► dispatch inline (fast path)
//!   └─ paused | limit hit ──► FIFO queue ──► claimed by:
//!        ├─ a completion that freed capacity
//!        ├─ resume() (unconditional drain)
//!        └─ the timeout timer (eviction)
//! ```
//!
//! ## Rules
//! - Counters are incremented **before** a task leaves the queue, so a drain
//!   decision never observes "no active work" while a dispatch is in flight.
//! - The dequeue loop reserves capacity, pops, then claims; a task whose
//!   timer already won is skipped and its reserved slot released.
//! - The completion decrement is owned by an RAII guard on the dispatch
//!   path, so job errors and panics cannot leak an increment.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::error::QueueError;
use crate::events::{DispatchSource, Event, EventKind};
use crate::gate::controller::RequestController;
use crate::gate::counters;
use crate::gate::queued::QueuedTask;
use crate::gate::state::RunResult;
use crate::work::{JobRef, QueueOptions};

/// Named admission gate, keyed by `(deployment, entry_point)`.
///
/// Created lazily by
/// [`RequestController::control_point`](crate::RequestController::control_point)
/// and never destroyed independently of its controller. Cheap to share:
/// callers hold an `Arc<ControlPoint>` and use it from any thread.
pub struct ControlPoint {
    deployment: String,
    entry_point: String,
    /// `deployment/entry_point`, preformatted for events.
    label: Arc<str>,

    active: AtomicUsize,
    /// Local admission ceiling; 0 = unlimited.
    max_requests: AtomicUsize,

    queue: Mutex<VecDeque<Arc<QueuedTask>>>,
    controller: Weak<RequestController>,
}

impl ControlPoint {
    pub(crate) fn new(
        deployment: &str,
        entry_point: &str,
        controller: Weak<RequestController>,
    ) -> Arc<Self> {
        Arc::new(Self {
            deployment: deployment.to_string(),
            entry_point: entry_point.to_string(),
            label: format!("{deployment}/{entry_point}").into(),
            active: AtomicUsize::new(0),
            max_requests: AtomicUsize::new(0),
            queue: Mutex::new(VecDeque::new()),
            controller,
        })
    }

    /// Attempts to admit one unit of work.
    ///
    /// Returns [`RunResult::Rejected`] while the controller is paused or when
    /// the global or local limit is reached; rejection has no side effects.
    /// On [`RunResult::Accepted`] the caller must guarantee a matching
    /// [`request_complete`](Self::request_complete), including on error paths.
    ///
    /// Lock-free: a bounded CAS loop on the two counters. Never blocks.
    pub fn begin_request(&self) -> RunResult {
        let Some(ctrl) = self.controller.upgrade() else {
            return RunResult::Rejected;
        };
        if ctrl.is_paused() {
            return RunResult::Rejected;
        }
        if self.try_acquire(&ctrl) {
            RunResult::Accepted
        } else {
            RunResult::Rejected
        }
    }

    /// Admits one unit of work unconditionally, bypassing limits and the
    /// paused state.
    ///
    /// For limit-exempt internal work. The completion obligation is the same
    /// as for an accepted [`begin_request`](Self::begin_request).
    pub fn force_begin_request(&self) {
        let Some(ctrl) = self.controller.upgrade() else {
            return;
        };
        self.force_acquire(&ctrl);
    }

    /// Completes one previously admitted unit of work.
    ///
    /// Decrements the local and global counters, then re-runs the dequeue
    /// loop (a freed slot may dispatch the queue head) and, while paused,
    /// checks whether this completion was the one that finished the drain.
    ///
    /// A completion without a matching admission is a programming error: the
    /// decrement is refused and a
    /// [`CounterUnderflow`](crate::EventKind::CounterUnderflow) event is
    /// published instead.
    pub fn request_complete(self: &Arc<Self>) {
        let Some(ctrl) = self.controller.upgrade() else {
            return;
        };
        if !counters::release_checked(&self.active) {
            ctrl.publish(Event::now(EventKind::CounterUnderflow).with_point(self.label.clone()));
            return;
        }
        if !ctrl.release_global_checked() {
            ctrl.publish(Event::now(EventKind::CounterUnderflow).with_point(self.label.clone()));
            return;
        }
        self.drain_queue(&ctrl, DispatchSource::Completion);
        ctrl.check_drained();
    }

    /// Defers a job, or runs it immediately when capacity allows.
    ///
    /// Never blocks the calling thread:
    /// - **Fast path** (running, admission succeeds): the job is handed to
    ///   the runtime right away, bracketed by the admission counters.
    /// - **Slow path** (paused, or a limit is hit): the job is appended to
    ///   this point's FIFO queue; if `options.timeout` is set, a timer is
    ///   armed that races the dispatchers for the task's one-shot claim.
    ///
    /// # Errors
    /// - [`QueueError::Full`] when the queue is bounded and at capacity.
    /// - [`QueueError::Closed`] when the controller has been dropped.
    pub fn queue_task(
        self: &Arc<Self>,
        job: JobRef,
        options: QueueOptions,
    ) -> Result<(), QueueError> {
        let Some(ctrl) = self.controller.upgrade() else {
            return Err(QueueError::Closed);
        };

        if !ctrl.is_paused() {
            let admitted = if options.bypass_limit {
                self.force_acquire(&ctrl);
                true
            } else {
                self.try_acquire(&ctrl)
            };
            if admitted {
                self.dispatch(&ctrl, job, DispatchSource::Immediate, None);
                return Ok(());
            }
        }

        let timeout = options.timeout;
        let task = Arc::new(QueuedTask::new(job, &options));
        {
            // Appends are serialized with the drain decision so a suspend
            // cannot conclude "all queues empty" mid-enqueue.
            let _drain = ctrl.lock_drain();
            let mut queue = self.queue.lock().unwrap();
            if let Some(bound) = ctrl.queue_bound() {
                if queue.len() >= bound {
                    return Err(QueueError::Full);
                }
            }
            queue.push_back(Arc::clone(&task));
        }

        let mut ev = Event::now(EventKind::TaskQueued)
            .with_point(self.label.clone())
            .with_job(task.job_name());
        if let Some(d) = timeout {
            ev = ev.with_timeout(d);
        }
        ctrl.publish(ev);

        if let Some(d) = timeout {
            self.arm_timeout(&ctrl, Arc::clone(&task), d);
        }

        // A completion may have freed capacity between the failed admission
        // above and the enqueue; re-running the loop closes that window.
        if !ctrl.is_paused() {
            self.drain_queue(&ctrl, DispatchSource::Completion);
        }
        Ok(())
    }

    /// Returns the local admission ceiling (`0` = unlimited).
    pub fn max_requests(&self) -> usize {
        self.max_requests.load(Ordering::Acquire)
    }

    /// Sets the local admission ceiling (`0` = unlimited).
    ///
    /// Applies to future admissions only; in-flight work is never affected.
    pub fn set_max_requests(&self, limit: usize) {
        self.max_requests.store(limit, Ordering::Release);
    }

    /// Number of units of work currently admitted through this point.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Number of tasks currently parked in this point's queue.
    pub fn queue_depth(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Deployment half of the identity key.
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    /// Entry-point half of the identity key.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub(crate) fn queue_is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    // ---------------------------
    // Dispatch internals
    // ---------------------------

    /// Limit-checked admission of one slot: global first, then local, with
    /// rollback when the local ceiling loses the race.
    fn try_acquire(&self, ctrl: &RequestController) -> bool {
        if !ctrl.try_acquire_global() {
            return false;
        }
        if !counters::try_acquire(&self.active, &self.max_requests) {
            let _ = ctrl.release_global_checked();
            return false;
        }
        true
    }

    /// Unconditional admission of one slot (global first, then local).
    fn force_acquire(&self, ctrl: &RequestController) {
        ctrl.force_acquire_global();
        counters::acquire(&self.active);
    }

    /// Releases one slot reserved by `try_acquire`/`force_acquire` that was
    /// never handed to a job (local first, then global).
    fn release(&self, ctrl: &RequestController) {
        if counters::release_checked(&self.active) {
            let _ = ctrl.release_global_checked();
        }
    }

    /// The claim-based dequeue loop.
    ///
    /// Every caller — a completion, a fresh enqueue, a resume — runs the same
    /// loop: reserve capacity, pop the head, claim it, dispatch. Because the
    /// claim is atomic per task, any set of concurrent callers collectively
    /// drains the queue exactly once per task, whatever the interleaving;
    /// a caller that finds the queue empty or the capacity exhausted simply
    /// returns, and the next completion retries.
    ///
    /// With `DispatchSource::Resume` the capacity check is skipped: resumed
    /// tasks were already backlogged awaiting capacity, and unconditional
    /// dispatch guarantees forward progress.
    pub(crate) fn drain_queue(
        self: &Arc<Self>,
        ctrl: &Arc<RequestController>,
        source: DispatchSource,
    ) {
        let unconditional = matches!(source, DispatchSource::Resume);
        loop {
            let task = {
                let mut queue = self.queue.lock().unwrap();
                let Some(front) = queue.front() else {
                    return;
                };
                // Counters go up before the task leaves the queue; see module docs.
                if unconditional || front.bypass_limit() {
                    self.force_acquire(ctrl);
                } else if !self.try_acquire(ctrl) {
                    return;
                }
                match queue.pop_front() {
                    Some(task) => task,
                    None => {
                        self.release(ctrl);
                        return;
                    }
                }
            };

            if task.claim() {
                let waited = task.waited();
                self.dispatch(ctrl, task.job().clone(), source, Some(waited));
            } else {
                // Timer won the race; give the slot back and try the next entry.
                self.release(ctrl);
            }
        }
    }

    /// Hands an admitted job to the runtime.
    ///
    /// The caller has already incremented the counters; the spawned task owns
    /// the completion via an RAII guard, so the decrement survives job errors
    /// and panics.
    fn dispatch(
        self: &Arc<Self>,
        ctrl: &Arc<RequestController>,
        job: JobRef,
        source: DispatchSource,
        waited: Option<Duration>,
    ) {
        let mut ev = Event::now(EventKind::TaskDispatched)
            .with_point(self.label.clone())
            .with_job(job.name())
            .with_source(source);
        if let Some(w) = waited {
            ev = ev.with_waited(w);
        }
        ctrl.publish(ev);

        let bus = ctrl.bus_clone();
        let label = self.label.clone();
        let point = Arc::clone(self);
        ctrl.runtime().spawn(async move {
            let _done = CompletionGuard { point };
            if let Err(err) = job.run().await {
                bus.publish(
                    Event::now(EventKind::JobFailed)
                        .with_point(label)
                        .with_job(job.name())
                        .with_reason(err.to_string()),
                );
            }
        });
    }

    /// Arms the eviction timer racing the dispatchers for `task`'s claim.
    fn arm_timeout(
        self: &Arc<Self>,
        ctrl: &Arc<RequestController>,
        task: Arc<QueuedTask>,
        after: Duration,
    ) {
        let point = Arc::clone(self);
        let controller = Arc::downgrade(ctrl);
        let shutdown = ctrl.shutdown_token();
        ctrl.runtime().spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {}
                _ = shutdown.cancelled() => return,
            }
            if !task.claim() {
                return; // dispatched first; the timer is a no-op
            }
            point.remove_queued(&task);

            let Some(ctrl) = controller.upgrade() else {
                return;
            };
            match task.on_timeout() {
                Some(handler) => {
                    ctrl.publish(
                        Event::now(EventKind::TaskTimedOut)
                            .with_point(point.label.clone())
                            .with_job(task.job_name())
                            .with_timeout(after),
                    );
                    // The handler is an eviction notice, not admitted work:
                    // it runs outside the counter bracket.
                    let bus = ctrl.bus_clone();
                    let label = point.label.clone();
                    ctrl.runtime().spawn(async move {
                        if let Err(err) = handler.run().await {
                            bus.publish(
                                Event::now(EventKind::JobFailed)
                                    .with_point(label)
                                    .with_job(handler.name())
                                    .with_reason(err.to_string()),
                            );
                        }
                    });
                }
                None => {
                    ctrl.publish(
                        Event::now(EventKind::TaskDropped)
                            .with_point(point.label.clone())
                            .with_job(task.job_name()),
                    );
                }
            }
            // An eviction can be the last thing blocking a drain.
            ctrl.check_drained();
        });
    }

    fn remove_queued(&self, task: &Arc<QueuedTask>) {
        let mut queue = self.queue.lock().unwrap();
        queue.retain(|t| !Arc::ptr_eq(t, task));
    }
}

/// Completes the admission bracket when the dispatched job finishes,
/// errors, or panics.
struct CompletionGuard {
    point: Arc<ControlPoint>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.point.request_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::error::WorkError;
    use crate::work::JobFn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn build(cfg: ControllerConfig) -> Arc<RequestController> {
        RequestController::builder(cfg).build()
    }

    fn counting_job(name: String, counter: Arc<AtomicUsize>) -> JobRef {
        JobFn::arc(name, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, WorkError>(())
            }
        })
    }

    fn parked_job(name: &'static str) -> JobRef {
        // Never finishes on its own; holds its admission slot for the whole test.
        JobFn::arc(name, || async {
            std::future::pending::<()>().await;
            Ok::<_, WorkError>(())
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_capacity_exactly_enforced_under_contention() {
        let controller = build(ControllerConfig {
            max_requests: 100,
            ..ControllerConfig::default()
        });
        let point = controller.control_point("app", "http");

        let accepted = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..150 {
            let point = Arc::clone(&point);
            let accepted = Arc::clone(&accepted);
            let rejected = Arc::clone(&rejected);
            handles.push(std::thread::spawn(move || match point.begin_request() {
                RunResult::Accepted => accepted.fetch_add(1, Ordering::SeqCst),
                RunResult::Rejected => rejected.fetch_add(1, Ordering::SeqCst),
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(accepted.load(Ordering::SeqCst), 100);
        assert_eq!(rejected.load(Ordering::SeqCst), 50);
        assert_eq!(controller.active_requests(), 100);
        assert_eq!(point.active(), 100);

        for _ in 0..100 {
            point.request_complete();
        }
        assert_eq!(controller.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_local_limit_rolls_back_global_count() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");
        point.set_max_requests(2);

        assert_eq!(point.begin_request(), RunResult::Accepted);
        assert_eq!(point.begin_request(), RunResult::Accepted);
        assert_eq!(point.begin_request(), RunResult::Rejected);

        // The failed local check must not leak a global increment.
        assert_eq!(controller.active_requests(), 2);
        assert_eq!(point.active(), 2);
    }

    #[tokio::test]
    async fn test_paused_rejects_without_side_effects() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");

        controller.suspend(|| {});
        assert_eq!(point.begin_request(), RunResult::Rejected);
        assert_eq!(controller.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_fast_path_dispatches_without_queueing() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");

        let runs = Arc::new(AtomicUsize::new(0));
        point
            .queue_task(
                counting_job("inline".into(), Arc::clone(&runs)),
                QueueOptions::new(),
            )
            .unwrap();
        assert_eq!(point.queue_depth(), 0);

        let deadline = Instant::now() + Duration::from_secs(2);
        while (runs.load(Ordering::SeqCst) == 0 || controller.active_requests() != 0)
            && Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(controller.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_bounded_queue_returns_full() {
        let controller = build(ControllerConfig {
            max_queue_size: 1,
            ..ControllerConfig::default()
        });
        let point = controller.control_point("app", "http");
        controller.suspend(|| {});

        let runs = Arc::new(AtomicUsize::new(0));
        assert!(point
            .queue_task(
                counting_job("first".into(), Arc::clone(&runs)),
                QueueOptions::new()
            )
            .is_ok());
        assert_eq!(
            point.queue_task(
                counting_job("second".into(), Arc::clone(&runs)),
                QueueOptions::new()
            ),
            Err(QueueError::Full)
        );
        assert_eq!(point.queue_depth(), 1);
    }

    #[tokio::test]
    async fn test_bypass_limit_dispatches_over_a_full_gate() {
        let controller = build(ControllerConfig {
            max_requests: 1,
            ..ControllerConfig::default()
        });
        let point = controller.control_point("app", "http");

        assert_eq!(point.begin_request(), RunResult::Accepted);

        // Limit-checked deferral parks behind the full gate.
        let runs = Arc::new(AtomicUsize::new(0));
        point
            .queue_task(
                counting_job("limited".into(), Arc::clone(&runs)),
                QueueOptions::new(),
            )
            .unwrap();
        assert_eq!(point.queue_depth(), 1);

        // Bypass skips the ceiling entirely.
        point
            .queue_task(parked_job("exempt"), QueueOptions::new().with_bypass_limit())
            .unwrap();
        assert_eq!(point.queue_depth(), 1);
        assert_eq!(controller.active_requests(), 2);
    }

    #[tokio::test]
    async fn test_unmatched_complete_is_surfaced_not_clamped() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");
        let mut rx = controller.subscribe();

        point.request_complete();

        assert_eq!(controller.active_requests(), 0);
        let ev = rx.try_recv().expect("expected an event");
        assert_eq!(ev.kind, EventKind::CounterUnderflow);
        assert_eq!(ev.point.as_deref(), Some("app/http"));
    }

    #[tokio::test]
    async fn test_control_point_lookup_is_idempotent() {
        let controller = build(ControllerConfig::default());
        let a = controller.control_point("app", "http");
        let b = controller.control_point("app", "http");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.deployment(), "app");
        assert_eq!(a.entry_point(), "http");

        let other = controller.control_point("app", "jms");
        assert!(!Arc::ptr_eq(&a, &other));
    }
}
