//! Per-tenant sliding-window rate limiter
//!
//! Guards API admission (upload and search); worker-internal enqueues are
//! never rate limited. Each tenant keeps a window of admission timestamps;
//! a check evicts entries older than the window and admits while the count
//! stays under the tenant's limit.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after_ms: u64 },
}

impl RateDecision {
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Sliding-window counter per tenant
pub struct SlidingWindowLimiter {
    window: Duration,
    windows: DashMap<Uuid, Mutex<VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            windows: DashMap::new(),
        }
    }

    /// Check admission for a tenant with the given per-window limit
    pub fn check(&self, tenant_id: Uuid, limit: u32) -> RateDecision {
        self.check_at(tenant_id, limit, Instant::now())
    }

    /// Clock-injected variant used by tests
    pub fn check_at(&self, tenant_id: Uuid, limit: u32, now: Instant) -> RateDecision {
        let entry = self.windows.entry(tenant_id).or_default();
        let mut window = entry.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < limit as usize {
            window.push_back(now);
            RateDecision::Allowed
        } else {
            let retry_after = window.front().map_or(Duration::ZERO, |oldest| {
                self.window.saturating_sub(now.duration_since(*oldest))
            });
            RateDecision::Denied {
                retry_after_ms: retry_after.as_millis() as u64,
            }
        }
    }

    /// Admissions currently inside the tenant's window
    pub fn current_usage(&self, tenant_id: Uuid) -> usize {
        self.current_usage_at(tenant_id, Instant::now())
    }

    fn current_usage_at(&self, tenant_id: Uuid, now: Instant) -> usize {
        self.windows.get(&tenant_id).map_or(0, |entry| {
            let window = entry.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            window
                .iter()
                .filter(|t| now.duration_since(**t) < self.window)
                .count()
        })
    }

    /// Drop a tenant's window, e.g. after tenant deletion
    pub fn forget(&self, tenant_id: Uuid) {
        self.windows.remove(&tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_denies() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60));
        let tenant = Uuid::new_v4();
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at(tenant, 3, now).is_allowed());
        }
        assert!(matches!(
            limiter.check_at(tenant, 3, now),
            RateDecision::Denied { .. }
        ));
        assert_eq!(limiter.current_usage_at(tenant, now), 3);
    }

    #[test]
    fn window_never_exceeds_limit_within_any_window() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60));
        let tenant = Uuid::new_v4();
        let start = Instant::now();

        let mut admitted = 0;
        // Spread 10 attempts over 30 seconds against a limit of 5
        for i in 0..10_u64 {
            let at = start + Duration::from_secs(i * 3);
            if limiter.check_at(tenant, 5, at).is_allowed() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5, "admissions in one window must not exceed L");
    }

    #[test]
    fn eviction_reopens_the_window() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(10));
        let tenant = Uuid::new_v4();
        let start = Instant::now();

        assert!(limiter.check_at(tenant, 1, start).is_allowed());
        assert!(!limiter.check_at(tenant, 1, start + Duration::from_secs(5)).is_allowed());
        assert!(limiter.check_at(tenant, 1, start + Duration::from_secs(10)).is_allowed());
    }

    #[test]
    fn denial_reports_time_until_oldest_entry_expires() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(10));
        let tenant = Uuid::new_v4();
        let start = Instant::now();

        assert!(limiter.check_at(tenant, 1, start).is_allowed());
        match limiter.check_at(tenant, 1, start + Duration::from_secs(4)) {
            RateDecision::Denied { retry_after_ms } => {
                assert_eq!(retry_after_ms, 6_000);
            }
            RateDecision::Allowed => panic!("expected denial"),
        }
    }

    #[test]
    fn tenants_have_independent_windows() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Instant::now();

        assert!(limiter.check_at(a, 1, now).is_allowed());
        assert!(!limiter.check_at(a, 1, now).is_allowed());
        assert!(limiter.check_at(b, 1, now).is_allowed());
    }
}
