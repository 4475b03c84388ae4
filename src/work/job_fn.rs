//! # Function-backed job (`JobFn`)
//!
//! [`JobFn`] wraps a closure `F: Fn() -> Fut`, producing a fresh future per
//! run. This avoids shared mutable state inside the job itself; if shared
//! state is needed, capture an `Arc<...>` explicitly in the closure.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkError;
use crate::work::job::Job;

/// Function-backed job implementation.
///
/// Wraps a closure that *creates* a new future per run.
///
/// ## Example
/// ```
/// use floodgate::{JobFn, JobRef, WorkError};
///
/// let j: JobRef = JobFn::arc("report", || async {
///     // do work...
///     Ok::<_, WorkError>(())
/// });
///
/// assert_eq!(j.name(), "report");
/// ```
#[derive(Debug)]
pub struct JobFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> JobFn<F> {
    /// Creates a new function-backed job.
    ///
    /// Prefer [`JobFn::arc`] when you immediately need a [`JobRef`](crate::JobRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the job and returns it as a shared handle (`Arc<Self>`).
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Job for JobFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), WorkError> {
        (self.f)().await
    }
}
