//! Rolling-Window Rate Limiter
//!
//! Admits at most `permits` requests in any trailing `window`. The limiter
//! keeps the instants of the last `permits` admissions; a caller is admitted
//! once the oldest of those has aged out of the window.
//!
//! A caller that finds a free permit and an uncontended log is admitted on
//! the spot and never counts against the queue. Everyone else waits on a
//! `tokio::sync::Mutex`, which hands the lock out in FIFO order. Queue depth
//! is bounded and callers beyond it fail fast with
//! [`RateLimitError::QueueFull`].
//!
//! ```text
//! acquire ──► free permit now? ──yes──► admit
//!               │no
//!               ▼
//!             slot? ──no──► QueueFull
//!               │yes
//!               ▼
//!          lock (FIFO) ──► prune log ──► room? ──yes──► admit
//!                                 ▲         │no
//!                                 └─ sleep until oldest + window
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::metrics;

/// Default rolling window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Limiter failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many callers already waiting.
    #[error("rate limiter queue full ({limit} waiting)")]
    QueueFull {
        /// Configured queue depth.
        limit: usize,
    },

    /// Cancelled while waiting for admission.
    #[error("rate limiter wait cancelled")]
    Cancelled,
}

/// Proof of admission.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    /// When the caller was admitted.
    pub admitted_at: Instant,
    /// Time spent queued.
    pub waited: Duration,
}

/// Process-wide rolling-window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    permits: usize,
    window: Duration,
    queue_limit: usize,
    waiting: AtomicUsize,
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `permits` per `window`.
    ///
    /// `permits` is clamped to at least one.
    #[must_use]
    pub fn new(permits: usize, window: Duration, queue_limit: usize) -> Self {
        let permits = permits.max(1);
        Self {
            permits,
            window,
            queue_limit,
            waiting: AtomicUsize::new(0),
            admissions: Mutex::new(VecDeque::with_capacity(permits)),
        }
    }

    /// Limiter admitting `rate` requests per rolling minute.
    #[must_use]
    pub fn per_minute(rate: u32, queue_limit: usize) -> Self {
        Self::new(rate as usize, DEFAULT_WINDOW, queue_limit)
    }

    /// Admissions allowed per window.
    #[must_use]
    pub const fn permits(&self) -> usize {
        self.permits
    }

    /// Callers currently queued for a permit.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Wait for admission.
    ///
    /// Cancellation (or dropping the future) releases the queue slot and
    /// records no admission.
    ///
    /// # Errors
    ///
    /// [`RateLimitError::QueueFull`] when the caller would have to wait and
    /// `queue_limit` callers are already waiting,
    /// [`RateLimitError::Cancelled`] when `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Admission, RateLimitError> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }

        if let Some(admitted_at) = self.try_admit_now() {
            return Ok(Admission {
                admitted_at,
                waited: Duration::ZERO,
            });
        }

        let Some(_slot) = QueueSlot::try_enter(&self.waiting, self.queue_limit) else {
            metrics::record_rate_limit_rejection();
            tracing::warn!(limit = self.queue_limit, "Rate limiter queue full");
            return Err(RateLimitError::QueueFull {
                limit: self.queue_limit,
            });
        };

        let requested_at = Instant::now();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RateLimitError::Cancelled),
            admitted_at = self.admit() => {
                let waited = admitted_at.duration_since(requested_at);
                if !waited.is_zero() {
                    tracing::debug!(waited_ms = waited.as_millis() as u64, "Rate limiter admitted after wait");
                }
                Ok(Admission { admitted_at, waited })
            }
        }
    }

    /// Admit without queuing when the log is free and has room.
    fn try_admit_now(&self) -> Option<Instant> {
        let mut admissions = self.admissions.try_lock().ok()?;
        let now = Instant::now();
        self.prune(&mut admissions, now);

        (admissions.len() < self.permits).then(|| {
            admissions.push_back(now);
            now
        })
    }

    async fn admit(&self) -> Instant {
        let mut admissions = self.admissions.lock().await;
        loop {
            let now = Instant::now();
            self.prune(&mut admissions, now);

            if admissions.len() < self.permits {
                admissions.push_back(now);
                return now;
            }

            if let Some(&oldest) = admissions.front() {
                tokio::time::sleep_until(oldest + self.window).await;
            }
        }
    }

    fn prune(&self, admissions: &mut VecDeque<Instant>, now: Instant) {
        while admissions
            .front()
            .is_some_and(|&at| now.duration_since(at) >= self.window)
        {
            admissions.pop_front();
        }
    }
}

/// RAII queue-depth slot.
struct QueueSlot<'a> {
    waiting: &'a AtomicUsize,
}

impl<'a> QueueSlot<'a> {
    fn try_enter(waiting: &'a AtomicUsize, limit: usize) -> Option<Self> {
        waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| Self { waiting })
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_test::{assert_pending, task};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_burst_then_waits_for_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), 100);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..3 {
            let admission = limiter.acquire(&cancel).await.unwrap();
            assert!(admission.waited.is_zero());
        }

        let fourth = limiter.acquire(&cancel).await.unwrap();
        assert_eq!(fourth.admitted_at - start, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn rolling_window_ceiling_holds_under_load() {
        let limiter = Arc::new(RateLimiter::per_minute(50, 10_000));
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..200 {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(&cancel).await.unwrap().admitted_at
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }
        admitted.sort();

        assert_eq!(admitted.len(), 200);
        for pair in admitted.windows(51) {
            assert!(pair[50].duration_since(pair[0]) >= Duration::from_secs(60));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_fails_fast() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), 1);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let mut waiter = task::spawn(limiter.acquire(&cancel));
        assert_pending!(waiter.poll());
        assert_eq!(limiter.waiting(), 1);

        assert_eq!(
            limiter.acquire(&cancel).await.unwrap_err(),
            RateLimitError::QueueFull { limit: 1 }
        );

        drop(waiter);
        assert_eq!(limiter.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_releases_slot_without_admission() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), 4);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let waiter_cancel = CancellationToken::new();
        let mut waiter = task::spawn(limiter.acquire(&waiter_cancel));
        assert_pending!(waiter.poll());

        waiter_cancel.cancel();
        assert!(waiter.is_woken());
        match waiter.poll() {
            std::task::Poll::Ready(result) => {
                assert_eq!(result.unwrap_err(), RateLimitError::Cancelled);
            }
            std::task::Poll::Pending => panic!("cancelled waiter must resolve"),
        }
        drop(waiter);
        assert_eq!(limiter.waiting(), 0);
        assert_eq!(limiter.admissions.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_queue_limit_admits_free_permits() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60), 0);
        let cancel = CancellationToken::new();

        for _ in 0..5 {
            let admission = limiter.acquire(&cancel).await.unwrap();
            assert!(admission.waited.is_zero());
        }
        assert_eq!(limiter.waiting(), 0);

        assert_eq!(
            limiter.acquire(&cancel).await.unwrap_err(),
            RateLimitError::QueueFull { limit: 0 }
        );
    }

    #[test]
    fn zero_rate_is_clamped_to_one() {
        assert_eq!(RateLimiter::per_minute(0, 10).permits(), 1);
    }
}
