//! # Controller configuration.
//!
//! Provides [`ControllerConfig`], the settings bundle passed to
//! [`RequestController::builder`](crate::RequestController::builder).
//!
//! ## Sentinel values
//! - `max_requests = 0` → unlimited (no global ceiling)
//! - `max_queue_size = 0` → unbounded per-point queues
//!
//! The global limit can be changed at runtime with
//! [`RequestController::set_max_requests`](crate::RequestController::set_max_requests);
//! the value here is only the initial setting.

/// Configuration for the request controller.
///
/// ## Field semantics
/// - `max_requests`: global concurrent-request ceiling (`0` = unlimited)
/// - `max_queue_size`: per-control-point queue bound (`0` = unbounded)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped)
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Maximum number of requests admitted concurrently across all control points.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = at most `n` requests in flight at once
    ///
    /// Takes effect for future admission decisions only; changing it never
    /// affects requests already in flight.
    pub max_requests: usize,

    /// Maximum number of deferred tasks held per control point.
    ///
    /// When the bound is reached,
    /// [`queue_task`](crate::ControlPoint::queue_task) returns
    /// [`QueueError::Full`](crate::QueueError::Full).
    pub max_queue_size: usize,

    /// Capacity of the event bus broadcast ring buffer.
    ///
    /// Subscribers lagging behind more than `bus_capacity` events observe
    /// `Lagged` and skip older items. Minimum value is 1 (enforced by the bus).
    pub bus_capacity: usize,
}

impl ControllerConfig {
    /// Returns the global admission limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` concurrent requests
    #[inline]
    pub fn global_limit(&self) -> Option<usize> {
        if self.max_requests == 0 {
            None
        } else {
            Some(self.max_requests)
        }
    }

    /// Returns the per-point queue bound as an `Option`.
    ///
    /// - `None` → unbounded
    /// - `Some(n)` → at most `n` queued tasks per control point
    #[inline]
    pub fn queue_bound(&self) -> Option<usize> {
        if self.max_queue_size == 0 {
            None
        } else {
            Some(self.max_queue_size)
        }
    }

    /// Returns the bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ControllerConfig {
    /// Default configuration:
    ///
    /// - `max_requests = 0` (unlimited)
    /// - `max_queue_size = 0` (unbounded queues)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            max_requests: 0,
            max_queue_size: 0,
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_accessors() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.global_limit(), None);
        assert_eq!(cfg.queue_bound(), None);

        let cfg = ControllerConfig {
            max_requests: 100,
            max_queue_size: 16,
            bus_capacity: 0,
        };
        assert_eq!(cfg.global_limit(), Some(100));
        assert_eq!(cfg.queue_bound(), Some(16));
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
