//! Global request pacing: pause for `T` after every `N` requests

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::info;

/// Counter shared by every worker
///
/// Each call to [`acquire`](Self::acquire) counts one request. When the
/// counter has reached a multiple of `every`, the next acquirer sleeps for
/// `pause` while holding the lock, so every other worker waits too. Each
/// multiple triggers exactly one pause.
#[derive(Debug)]
pub struct ThrottleGovernor {
    every: u64,
    pause: Duration,
    state: Mutex<ThrottleState>,
    pauses: AtomicU64,
}

#[derive(Debug, Default)]
struct ThrottleState {
    issued: u64,
    paused_at: u64,
}

impl ThrottleGovernor {
    /// Create a governor; `every == 0` or a zero pause disables pacing
    pub fn new(every: u64, pause: Duration) -> Self {
        Self {
            every,
            pause,
            state: Mutex::new(ThrottleState::default()),
            pauses: AtomicU64::new(0),
        }
    }

    /// Governor that never pauses
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    fn enabled(&self) -> bool {
        self.every > 0 && !self.pause.is_zero()
    }

    /// Count one request, pausing first if a multiple of `every` was crossed
    ///
    /// Returns the request's 1-based sequence number.
    pub async fn acquire(&self) -> u64 {
        let mut state = self.state.lock().await;
        if self.enabled()
            && state.issued > 0
            && state.issued % self.every == 0
            && state.paused_at < state.issued
        {
            info!(
                "Throttle: {} requests issued, sleeping {:?}",
                state.issued, self.pause
            );
            sleep(self.pause).await;
            state.paused_at = state.issued;
            self.pauses.fetch_add(1, Ordering::Relaxed);
        }
        state.issued += 1;
        state.issued
    }

    /// Requests counted so far
    pub async fn issued(&self) -> u64 {
        self.state.lock().await.issued
    }

    /// Pauses taken so far
    pub fn pauses(&self) -> u64 {
        self.pauses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_one_pause_per_multiple() {
        let throttle = ThrottleGovernor::new(3, Duration::from_secs(10));
        let start = Instant::now();

        for _ in 0..3 {
            throttle.acquire().await;
        }
        assert_eq!(throttle.pauses(), 0);
        assert_eq!(Instant::now(), start);

        // 4th request waits for the pause
        assert_eq!(throttle.acquire().await, 4);
        assert_eq!(throttle.pauses(), 1);
        assert_eq!(Instant::now(), start + Duration::from_secs(10));

        for _ in 0..3 {
            throttle.acquire().await;
        }
        assert_eq!(throttle.pauses(), 2);
        assert_eq!(throttle.issued().await, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_never_pauses() {
        let throttle = ThrottleGovernor::disabled();
        let start = Instant::now();
        for _ in 0..50 {
            throttle.acquire().await;
        }
        assert_eq!(throttle.pauses(), 0);
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_is_global_across_workers() {
        let throttle = Arc::new(ThrottleGovernor::new(2, Duration::from_secs(5)));
        let start = Instant::now();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let throttle = throttle.clone();
                tokio::spawn(async move {
                    let seq = throttle.acquire().await;
                    (seq, Instant::now())
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results.sort();

        // Sequence numbers 3..=6 all started after at least one pause
        assert_eq!(throttle.pauses(), 2);
        for (seq, at) in results {
            let pauses_before = (seq - 1) / 2;
            assert_eq!(at, start + Duration::from_secs(5 * pauses_before));
        }
    }
}
