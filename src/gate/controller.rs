//! # RequestController: process-wide admission and suspend coordination.
//!
//! The [`RequestController`] owns the global active count, the global limit,
//! the running/paused state machine, and the set of [`ControlPoint`]s. It is
//! created once per server process and lives for the process lifetime.
//!
//! ## Suspend protocol
//! ```text
//! suspend(on_drained)
//!   ├─ quiescent at the call ──► on_drained() fires synchronously
//!   └─ work in flight ─────────► callback parked
//!
//! request_complete() / timeout eviction (any thread)
//!   └─ after its decrement: re-check {paused, active == 0, queues empty}
//!        └─ condition holds ──► parked callback fires exactly once
//!
//! resume()
//!   └─ Paused → Running, then every queue drains FIFO, unconditionally
//! ```
//!
//! The drain callback runs on whichever thread happens to perform the
//! triggering completion, so it must be non-blocking and cheap.
//!
//! ## Rules
//! - The drain decision (`paused && active == 0 && queues empty`) is made
//!   under the drain mutex; queue appends while paused take the same mutex,
//!   so the decision never interleaves with a half-finished enqueue.
//! - Counters are incremented before a task leaves any queue, so
//!   `active == 0` implies no dispatch is in flight.
//! - `suspend` is idempotent: a second call while a callback is parked is a
//!   no-op and the new callback is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;
use crate::events::{Bus, DispatchSource, Event, EventKind};
use crate::gate::counters;
use crate::gate::point::ControlPoint;
use crate::gate::state::GateState;
use crate::subscribers::{Subscribe, SubscriberSet};

/// One-shot callback invoked when a suspend finishes draining.
pub(crate) type DrainCallback = Box<dyn FnOnce() + Send + 'static>;

/// Process-wide admission-control and graceful-suspend coordinator.
///
/// Constructed through [`RequestController::builder`] and shared as an
/// `Arc`; entry points receive it by reference (dependency injection), which
/// keeps it independently testable — there is no global instance.
pub struct RequestController {
    cfg: ControllerConfig,

    /// Units of work currently admitted, across all control points.
    active: AtomicUsize,
    /// Global admission ceiling; 0 = unlimited.
    max_requests: AtomicUsize,
    paused: AtomicBool,

    /// Parked drain callback; also the mutex guarding the drain decision.
    drain: Mutex<Option<DrainCallback>>,
    points: RwLock<HashMap<(String, String), Arc<ControlPoint>>>,

    bus: Bus,
    runtime: Handle,
    shutdown: CancellationToken,
}

impl RequestController {
    /// Returns a builder for constructing a controller.
    pub fn builder(cfg: ControllerConfig) -> ControllerBuilder {
        ControllerBuilder {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Returns the control point for `(deployment, entry_point)`, creating it
    /// on first lookup.
    ///
    /// Idempotent; the same `Arc` is returned for the same key. Control
    /// points are never destroyed independently of the controller.
    pub fn control_point(self: &Arc<Self>, deployment: &str, entry_point: &str) -> Arc<ControlPoint> {
        let key = (deployment.to_string(), entry_point.to_string());
        {
            let points = self.points.read().unwrap();
            if let Some(point) = points.get(&key) {
                return Arc::clone(point);
            }
        }
        let mut points = self.points.write().unwrap();
        Arc::clone(
            points
                .entry(key)
                .or_insert_with(|| ControlPoint::new(deployment, entry_point, Arc::downgrade(self))),
        )
    }

    /// Transitions Running → Paused and registers the drain callback.
    ///
    /// If the controller is already quiescent (no active work, all queues
    /// empty) at the instant of the call, `on_drained` is invoked
    /// synchronously on the calling thread. Otherwise it is parked and fired
    /// by whichever completion or eviction observes the final
    /// zero-count/empty-queue condition.
    ///
    /// Idempotent: calling again while a callback is still parked is a no-op
    /// and the new callback is dropped. Calling while paused *and* already
    /// drained fires the new callback synchronously.
    ///
    /// The callback may run on an arbitrary request-handling thread; keep it
    /// non-blocking and cheap (signal a channel, flip a flag).
    pub fn suspend<F>(&self, on_drained: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let newly_paused;
        let fire: Option<DrainCallback> = {
            let mut pending = self.drain.lock().unwrap();
            newly_paused = !self.paused.swap(true, Ordering::AcqRel);
            if !newly_paused && pending.is_some() {
                return;
            }
            if self.active.load(Ordering::Acquire) == 0 && self.queues_empty() {
                Some(Box::new(on_drained))
            } else {
                *pending = Some(Box::new(on_drained));
                None
            }
        };

        if newly_paused {
            self.publish(Event::now(EventKind::SuspendRequested));
        }
        if let Some(cb) = fire {
            self.publish(Event::now(EventKind::Drained));
            cb();
        }
    }

    /// Suspends and waits for the drain to finish.
    ///
    /// Convenience wrapper around [`suspend`](Self::suspend) with a oneshot
    /// channel as the callback. Returns `true` once drained; returns `false`
    /// when the suspend was aborted by a concurrent [`resume`](Self::resume)
    /// or superseded by an earlier still-pending suspend.
    pub async fn suspend_and_wait(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        self.suspend(move || {
            let _ = tx.send(());
        });
        rx.await.is_ok()
    }

    /// Transitions Paused → Running, then drains every control point's queue
    /// in strict FIFO order, dispatching each task unconditionally.
    ///
    /// Queued tasks bypass limit checks here: they were already backlogged
    /// awaiting capacity, and unconditional dispatch guarantees forward
    /// progress. A drain callback that never fired is discarded. No-op when
    /// already running.
    pub fn resume(self: &Arc<Self>) {
        {
            let mut pending = self.drain.lock().unwrap();
            if !self.paused.swap(false, Ordering::AcqRel) {
                return;
            }
            *pending = None;
        }
        self.publish(Event::now(EventKind::Resumed));

        let points: Vec<Arc<ControlPoint>> = {
            let map = self.points.read().unwrap();
            map.values().cloned().collect()
        };
        for point in points {
            point.drain_queue(self, DispatchSource::Resume);
        }
    }

    /// Returns the current state of the controller.
    pub fn state(&self) -> GateState {
        if self.paused.load(Ordering::Acquire) {
            GateState::Paused
        } else {
            GateState::Running
        }
    }

    /// Units of work currently admitted, across all control points.
    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Returns the global admission ceiling (`0` = unlimited).
    pub fn max_requests(&self) -> usize {
        self.max_requests.load(Ordering::Acquire)
    }

    /// Sets the global admission ceiling (`0` = unlimited).
    ///
    /// Applies to future admission decisions only; requests already in
    /// flight are never affected.
    pub fn set_max_requests(&self, limit: usize) {
        self.max_requests.store(limit, Ordering::Release);
    }

    /// Creates a new receiver observing subsequent coordinator events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Stops the controller's background workers (timers, subscriber
    /// listener).
    ///
    /// Counters and queues are untouched; this is for embedding runtimes and
    /// tests that want deterministic teardown. Also performed on drop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    // ---------------------------
    // Crate-internal surface
    // ---------------------------

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub(crate) fn try_acquire_global(&self) -> bool {
        counters::try_acquire(&self.active, &self.max_requests)
    }

    pub(crate) fn force_acquire_global(&self) {
        counters::acquire(&self.active);
    }

    pub(crate) fn release_global_checked(&self) -> bool {
        counters::release_checked(&self.active)
    }

    pub(crate) fn publish(&self, ev: Event) {
        self.bus.publish(ev);
    }

    pub(crate) fn bus_clone(&self) -> Bus {
        self.bus.clone()
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub(crate) fn queue_bound(&self) -> Option<usize> {
        self.cfg.queue_bound()
    }

    pub(crate) fn lock_drain(&self) -> MutexGuard<'_, Option<DrainCallback>> {
        self.drain.lock().unwrap()
    }

    /// Fires the parked drain callback when the drain condition holds.
    ///
    /// Called by every completion after its decrement and by every timeout
    /// eviction after its queue removal. The cheap pre-check keeps the hot
    /// path free of the mutex while running.
    pub(crate) fn check_drained(&self) {
        if !self.paused.load(Ordering::Acquire) || self.active.load(Ordering::Acquire) != 0 {
            return;
        }
        let fire = {
            let mut pending = self.drain.lock().unwrap();
            if self.paused.load(Ordering::Acquire)
                && self.active.load(Ordering::Acquire) == 0
                && self.queues_empty()
            {
                pending.take()
            } else {
                None
            }
        };
        if let Some(cb) = fire {
            self.publish(Event::now(EventKind::Drained));
            cb();
        }
    }

    /// True when every control point's queue is empty.
    ///
    /// Callers that need the result to be part of the drain decision must
    /// hold the drain mutex.
    fn queues_empty(&self) -> bool {
        let points = self.points.read().unwrap();
        points.values().all(|p| p.queue_is_empty())
    }
}

impl Drop for RequestController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Builder for constructing a [`RequestController`] with optional features.
pub struct ControllerBuilder {
    cfg: ControllerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ControllerBuilder {
    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive coordinator events (queue lifecycle, suspend
    /// lifecycle, failures) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Appends a single event subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Builds the controller and starts its background workers.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime: the controller captures
    /// the current [`Handle`] so that dispatch, timers and `resume()` work
    /// from plain administrative threads afterwards.
    pub fn build(self) -> Arc<RequestController> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let shutdown = CancellationToken::new();

        let ctrl = Arc::new(RequestController {
            active: AtomicUsize::new(0),
            max_requests: AtomicUsize::new(self.cfg.max_requests),
            paused: AtomicBool::new(false),
            drain: Mutex::new(None),
            points: RwLock::new(HashMap::new()),
            bus: bus.clone(),
            runtime: Handle::current(),
            shutdown,
            cfg: self.cfg,
        });

        if !self.subscribers.is_empty() {
            ctrl.spawn_listener(self.subscribers);
        }
        ctrl
    }
}

impl RequestController {
    /// Pumps bus events into the subscriber set until shutdown.
    fn spawn_listener(self: &Arc<Self>, subscribers: Vec<Arc<dyn Subscribe>>) {
        let set = SubscriberSet::new(subscribers, self.bus.clone());
        let mut rx = self.bus.subscribe();
        let token = self.shutdown.clone();

        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit_arc(Arc::new(ev)),
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
            set.shutdown().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkError;
    use crate::gate::state::RunResult;
    use crate::work::{JobFn, JobRef, QueueOptions};
    use std::sync::atomic::Ordering as AtomicOrd;
    use std::time::{Duration, Instant};

    fn build(cfg: ControllerConfig) -> Arc<RequestController> {
        RequestController::builder(cfg).build()
    }

    fn counting_job(name: String, counter: Arc<AtomicUsize>) -> JobRef {
        JobFn::arc(name, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, AtomicOrd::SeqCst);
                Ok::<_, WorkError>(())
            }
        })
    }

    /// The historical regression scenario: tasks queued while paused must be
    /// drained exactly once by whichever concurrent completions happen to
    /// observe free capacity, with no lost wakeups in any interleaving.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_completions_drain_queue_exactly_once() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");

        for _ in 0..20 {
            assert_eq!(point.begin_request(), RunResult::Accepted);
        }

        let drained = Arc::new(AtomicBool::new(false));
        {
            let drained = Arc::clone(&drained);
            controller.suspend(move || drained.store(true, AtomicOrd::SeqCst));
        }
        assert!(!drained.load(AtomicOrd::SeqCst));

        let runs: Vec<Arc<AtomicUsize>> =
            (0..10).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        for (i, counter) in runs.iter().enumerate() {
            point
                .queue_task(
                    counting_job(format!("task-{i}"), Arc::clone(counter)),
                    QueueOptions::new(),
                )
                .unwrap();
        }
        assert_eq!(point.queue_depth(), 10);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let point = Arc::clone(&point);
            handles.push(std::thread::spawn(move || point.request_complete()));
        }
        for h in handles {
            h.join().unwrap();
        }

        // Completions alone must finish the drain; no resume involved.
        let deadline = Instant::now() + Duration::from_secs(5);
        while !drained.load(AtomicOrd::SeqCst) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(drained.load(AtomicOrd::SeqCst), "drain callback never fired");
        assert_eq!(controller.active_requests(), 0);
        assert_eq!(point.queue_depth(), 0);
        for counter in &runs {
            assert_eq!(counter.load(AtomicOrd::SeqCst), 1);
        }

        // Nothing left for the resume drain to double-dispatch.
        controller.resume();
        tokio::time::sleep(Duration::from_millis(50)).await;
        for counter in &runs {
            assert_eq!(counter.load(AtomicOrd::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_resume_dispatches_in_fifo_order() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");
        let mut rx = controller.subscribe();

        controller.suspend(|| {});
        let runs = Arc::new(AtomicUsize::new(0));
        for i in 0..5 {
            point
                .queue_task(
                    counting_job(format!("task-{i}"), Arc::clone(&runs)),
                    QueueOptions::new(),
                )
                .unwrap();
        }

        controller.resume();

        let mut dispatched = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::TaskDispatched {
                assert_eq!(ev.source, Some(DispatchSource::Resume));
                assert!(ev.waited_ms.is_some());
                dispatched.push(ev.job.as_deref().unwrap_or_default().to_string());
            }
        }
        let dispatched: Vec<&str> = dispatched.iter().map(String::as_str).collect();
        assert_eq!(
            dispatched,
            vec!["task-0", "task-1", "task-2", "task-3", "task-4"]
        );
    }

    #[tokio::test]
    async fn test_suspend_when_quiescent_fires_synchronously() {
        let controller = build(ControllerConfig::default());
        let fired = Arc::new(AtomicBool::new(false));
        {
            let fired = Arc::clone(&fired);
            controller.suspend(move || fired.store(true, AtomicOrd::SeqCst));
        }
        assert!(fired.load(AtomicOrd::SeqCst));
        assert_eq!(controller.state(), GateState::Paused);
    }

    #[tokio::test]
    async fn test_second_suspend_is_noop_while_pending() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");

        assert_eq!(point.begin_request(), RunResult::Accepted);

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        {
            let first = Arc::clone(&first);
            controller.suspend(move || {
                first.fetch_add(1, AtomicOrd::SeqCst);
            });
        }
        {
            let second = Arc::clone(&second);
            controller.suspend(move || {
                second.fetch_add(1, AtomicOrd::SeqCst);
            });
        }
        assert_eq!(first.load(AtomicOrd::SeqCst), 0);

        point.request_complete();
        assert_eq!(first.load(AtomicOrd::SeqCst), 1);
        assert_eq!(second.load(AtomicOrd::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drain_fires_only_after_final_completion() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");

        for _ in 0..5 {
            assert_eq!(point.begin_request(), RunResult::Accepted);
        }

        let drained = Arc::new(AtomicBool::new(false));
        {
            let drained = Arc::clone(&drained);
            controller.suspend(move || drained.store(true, AtomicOrd::SeqCst));
        }

        for _ in 0..4 {
            point.request_complete();
            assert!(!drained.load(AtomicOrd::SeqCst));
        }
        point.request_complete();
        assert!(drained.load(AtomicOrd::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_handler_fires_exactly_once_never_both() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");

        // Hold one admission so the queue cannot drain through completions.
        assert_eq!(point.begin_request(), RunResult::Accepted);
        controller.suspend(|| {});

        let ran = Arc::new(AtomicUsize::new(0));
        let timed_out = Arc::new(AtomicUsize::new(0));
        point
            .queue_task(
                counting_job("slow".into(), Arc::clone(&ran)),
                QueueOptions::new()
                    .with_timeout(Duration::from_millis(50))
                    .with_on_timeout(counting_job("on-timeout".into(), Arc::clone(&timed_out))),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(timed_out.load(AtomicOrd::SeqCst), 1);
        assert_eq!(ran.load(AtomicOrd::SeqCst), 0);
        assert_eq!(point.queue_depth(), 0);

        // The evicted task must never also dispatch as the main job.
        point.request_complete();
        controller.resume();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ran.load(AtomicOrd::SeqCst), 0);
        assert_eq!(timed_out.load(AtomicOrd::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handlerless_timeout_drops_and_reports() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");
        let mut rx = controller.subscribe();

        assert_eq!(point.begin_request(), RunResult::Accepted);
        controller.suspend(|| {});

        let ran = Arc::new(AtomicUsize::new(0));
        point
            .queue_task(
                counting_job("doomed".into(), Arc::clone(&ran)),
                QueueOptions::new().with_timeout(Duration::from_millis(50)),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ran.load(AtomicOrd::SeqCst), 0);
        assert_eq!(point.queue_depth(), 0);

        let mut dropped = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::TaskDropped {
                assert_eq!(ev.job.as_deref(), Some("doomed"));
                dropped = true;
            }
        }
        assert!(dropped, "expected a TaskDropped event");

        point.request_complete();
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_completes_the_drain() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");

        // First suspend is quiescent and fires immediately.
        controller.suspend(|| {});

        // A task parked after the drain keeps the next suspend pending.
        let ran = Arc::new(AtomicUsize::new(0));
        point
            .queue_task(
                counting_job("straggler".into(), Arc::clone(&ran)),
                QueueOptions::new().with_timeout(Duration::from_millis(50)),
            )
            .unwrap();

        let drained = Arc::new(AtomicBool::new(false));
        {
            let drained = Arc::clone(&drained);
            controller.suspend(move || drained.store(true, AtomicOrd::SeqCst));
        }
        assert!(!drained.load(AtomicOrd::SeqCst));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(drained.load(AtomicOrd::SeqCst));
        assert_eq!(ran.load(AtomicOrd::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_aborts_a_pending_suspend() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");

        assert_eq!(point.begin_request(), RunResult::Accepted);

        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.suspend_and_wait().await })
        };
        while controller.state() != GateState::Paused {
            tokio::task::yield_now().await;
        }

        controller.resume();
        assert!(!waiter.await.unwrap());

        point.request_complete();
        assert_eq!(controller.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_live_limit_change_applies_to_future_admissions() {
        let controller = build(ControllerConfig::default());
        let point = controller.control_point("app", "http");

        assert_eq!(point.begin_request(), RunResult::Accepted);
        assert_eq!(point.begin_request(), RunResult::Accepted);

        // Tightening below the in-flight count never evicts anyone.
        controller.set_max_requests(1);
        assert_eq!(controller.active_requests(), 2);
        assert_eq!(point.begin_request(), RunResult::Rejected);

        controller.set_max_requests(0);
        assert_eq!(point.begin_request(), RunResult::Accepted);
        assert_eq!(controller.max_requests(), 0);

        for _ in 0..3 {
            point.request_complete();
        }
    }

    #[tokio::test]
    async fn test_suspend_and_wait_returns_once_drained() {
        let controller = build(ControllerConfig::default());
        assert!(controller.suspend_and_wait().await);
        assert_eq!(controller.state(), GateState::Paused);
        controller.resume();
        assert_eq!(controller.state(), GateState::Running);
    }
}
