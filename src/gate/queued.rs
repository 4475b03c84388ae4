//! # Deferred task with a one-shot claim flag.
//!
//! A [`QueuedTask`] sits in a control point's FIFO queue until either a
//! dispatcher (completion drain, resume drain) or its timeout timer claims
//! it. Claiming is a single atomic `compare_exchange` on the `claimed` flag,
//! so exactly one side wins regardless of interleaving:
//!
//! ```text
//! dispatcher ──┐
//!              ├──► claim() ──► winner runs (main job | timeout handler)
//! timer      ──┘               loser is a no-op
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::work::{JobRef, QueueOptions};

/// A unit of work parked in a control point's queue.
pub(crate) struct QueuedTask {
    job: JobRef,
    on_timeout: Option<JobRef>,
    bypass_limit: bool,
    enqueued_at: Instant,
    /// One-shot ownership flag; see module docs.
    claimed: AtomicBool,
}

impl QueuedTask {
    pub(crate) fn new(job: JobRef, options: &QueueOptions) -> Self {
        Self {
            job,
            on_timeout: options.on_timeout.clone(),
            bypass_limit: options.bypass_limit,
            enqueued_at: Instant::now(),
            claimed: AtomicBool::new(false),
        }
    }

    /// Takes ownership of the task. Returns `true` exactly once.
    pub(crate) fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn job(&self) -> &JobRef {
        &self.job
    }

    pub(crate) fn job_name(&self) -> &str {
        self.job.name()
    }

    pub(crate) fn on_timeout(&self) -> Option<JobRef> {
        self.on_timeout.clone()
    }

    pub(crate) fn bypass_limit(&self) -> bool {
        self.bypass_limit
    }

    /// Time spent in the queue so far.
    pub(crate) fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkError;
    use crate::work::JobFn;
    use std::sync::Arc;

    fn noop() -> JobRef {
        JobFn::arc("noop", || async { Ok::<_, WorkError>(()) })
    }

    #[test]
    fn test_claim_fires_exactly_once() {
        let task = QueuedTask::new(noop(), &QueueOptions::new());
        assert!(task.claim());
        assert!(!task.claim());
        assert!(!task.claim());
    }

    #[test]
    fn test_concurrent_claim_has_single_winner() {
        let task = Arc::new(QueuedTask::new(noop(), &QueueOptions::new()));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let task = Arc::clone(&task);
            handles.push(std::thread::spawn(move || usize::from(task.claim())));
        }
        let winners: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(winners, 1);
    }
}
