//! Monthly usage quota for remote reconciliation calls
//!
//! The gate reserves a slot in one critical section before the remote call
//! goes out. A reservation is released only when the call itself fails, so
//! two concurrent attempts can never both slip through a check-then-increment
//! gap, and a timed-out call does not cost the user a slot.

use std::sync::Mutex;

use chrono::{Datelike, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::QuotaState;

/// Default number of remote reconciliations per calendar month.
pub const DEFAULT_MONTHLY_LIMIT: u32 = 30;

/// Gate controlling access to the remote model.
pub trait QuotaGate: Send + Sync {
    /// Atomically claim one slot, or fail with `Error::QuotaExceeded`.
    fn reserve(&self) -> Result<QuotaState>;

    /// Return a previously reserved slot (remote call failed).
    fn release(&self);

    /// Current counter snapshot.
    fn state(&self) -> QuotaState;
}

struct Window {
    /// `YYYY-MM` key of the month the counter belongs to.
    month: String,
    used: u32,
}

/// In-memory quota with a monthly window.
///
/// The counter resets when the month key rolls over. Process-local; a
/// restart starts a fresh window.
pub struct MemoryQuota {
    limit: u32,
    window: Mutex<Window>,
}

fn current_month() -> String {
    let now = Utc::now();
    format!("{:04}-{:02}", now.year(), now.month())
}

impl MemoryQuota {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window: Mutex::new(Window {
                month: current_month(),
                used: 0,
            }),
        }
    }

    /// Reset the counter if the calendar month has rolled over.
    fn roll_window(window: &mut Window) {
        let month = current_month();
        if window.month != month {
            debug!(from = %window.month, to = %month, "Quota window rolled over");
            window.month = month;
            window.used = 0;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Window> {
        // A poisoned mutex only means a panic mid-update; the counter is
        // still the best information available.
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryQuota {
    fn default() -> Self {
        Self::new(DEFAULT_MONTHLY_LIMIT)
    }
}

impl QuotaGate for MemoryQuota {
    fn reserve(&self) -> Result<QuotaState> {
        let mut window = self.lock();
        Self::roll_window(&mut window);

        if window.used >= self.limit {
            return Err(Error::QuotaExceeded {
                used: window.used,
                limit: self.limit,
            });
        }

        window.used += 1;
        debug!(used = window.used, limit = self.limit, "Quota slot reserved");
        Ok(QuotaState::new(window.used, self.limit))
    }

    fn release(&self) {
        let mut window = self.lock();
        window.used = window.used.saturating_sub(1);
        debug!(used = window.used, "Quota slot released");
    }

    fn state(&self) -> QuotaState {
        let mut window = self.lock();
        Self::roll_window(&mut window);
        QuotaState::new(window.used, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reserve_until_limit() {
        let quota = MemoryQuota::new(2);
        assert_eq!(quota.reserve().unwrap().used, 1);
        assert_eq!(quota.reserve().unwrap().used, 2);

        let err = quota.reserve().unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { used: 2, limit: 2 }));
        assert!(quota.state().limit_reached);
    }

    #[test]
    fn test_release_returns_slot() {
        let quota = MemoryQuota::new(1);
        quota.reserve().unwrap();
        assert!(quota.reserve().is_err());

        quota.release();
        assert!(quota.reserve().is_ok());
    }

    #[test]
    fn test_release_never_underflows() {
        let quota = MemoryQuota::new(1);
        quota.release();
        assert_eq!(quota.state().used, 0);
    }

    #[test]
    fn test_stale_window_resets() {
        let quota = MemoryQuota::new(1);
        {
            let mut window = quota.lock();
            window.month = "2000-01".to_string();
            window.used = 1;
        }
        // The stale month rolls over on the next access.
        assert_eq!(quota.state().used, 0);
        assert!(quota.reserve().is_ok());
    }

    #[test]
    fn test_concurrent_reserves_never_exceed_limit() {
        let quota = Arc::new(MemoryQuota::new(5));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let quota = quota.clone();
            handles.push(std::thread::spawn(move || quota.reserve().is_ok()));
        }
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 5);
    }
}
