//! API key rotation with cooldown
//!
//! One rotator is shared by all workers. Selection is round-robin over keys
//! whose cooldown has expired; when every key is cooling, `select` sleeps until
//! the earliest expiry and tries again. It never fails for that reason.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Runtime state of one credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyState {
    /// The key itself
    pub key: String,

    /// Excluded from selection until this instant
    pub cooldown_until: Option<Instant>,

    /// Retryable errors since the last success
    pub consecutive_errors: u32,
}

impl KeyState {
    fn new(key: String) -> Self {
        Self {
            key,
            cooldown_until: None,
            consecutive_errors: 0,
        }
    }

    /// Whether the key may be selected at `now`
    pub fn is_eligible(&self, now: Instant) -> bool {
        self.cooldown_until.is_none_or(|until| until <= now)
    }
}

#[derive(Debug)]
struct KeyPool {
    keys: Vec<KeyState>,
    cursor: usize,
}

/// Shared pool of credentials
#[derive(Debug)]
pub struct KeyRotator {
    pool: Mutex<KeyPool>,
    cooldown: Duration,
}

impl KeyRotator {
    /// Create a rotator over `keys` with a fixed cooldown window
    ///
    /// Duplicate keys are collapsed so one credential cannot be selected twice
    /// per rotation.
    pub fn new(keys: impl IntoIterator<Item = String>, cooldown: Duration) -> Self {
        let mut states: Vec<KeyState> = Vec::new();
        for key in keys {
            if !states.iter().any(|state| state.key == key) {
                states.push(KeyState::new(key));
            }
        }
        Self {
            pool: Mutex::new(KeyPool {
                keys: states,
                cursor: 0,
            }),
            cooldown,
        }
    }

    /// Rotator for providers that use no credential
    pub fn empty() -> Self {
        Self::new(Vec::new(), Duration::ZERO)
    }

    /// Next eligible key, or `None` when the pool is empty
    pub async fn select(&self) -> Option<String> {
        loop {
            let wake_at = {
                let mut pool = self.pool.lock().await;
                if pool.keys.is_empty() {
                    return None;
                }

                let now = Instant::now();
                let len = pool.keys.len();
                for offset in 0..len {
                    let index = (pool.cursor + offset) % len;
                    if pool.keys[index].is_eligible(now) {
                        pool.keys[index].cooldown_until = None;
                        pool.cursor = (index + 1) % len;
                        return Some(pool.keys[index].key.clone());
                    }
                }

                pool.keys
                    .iter()
                    .filter_map(|state| state.cooldown_until)
                    .min()
                    .unwrap_or(now)
            };

            debug!(
                "All keys cooling down, waiting {:?}",
                wake_at.saturating_duration_since(Instant::now())
            );
            sleep_until(wake_at).await;
        }
    }

    /// Report a failed request made with `key`
    ///
    /// Retryable errors put the key on cooldown; others leave it selectable.
    pub async fn report_error(&self, key: &str, retryable: bool) {
        if !retryable {
            return;
        }
        let mut pool = self.pool.lock().await;
        if let Some(state) = pool.keys.iter_mut().find(|state| state.key == key) {
            state.consecutive_errors += 1;
            state.cooldown_until = Some(Instant::now() + self.cooldown);
            warn!(
                "Key {} cooling down for {:?} ({} consecutive errors)",
                mask(key),
                self.cooldown,
                state.consecutive_errors
            );
        }
    }

    /// Report a successful request made with `key`
    pub async fn report_success(&self, key: &str) {
        let mut pool = self.pool.lock().await;
        if let Some(state) = pool.keys.iter_mut().find(|state| state.key == key) {
            state.consecutive_errors = 0;
        }
    }

    /// Snapshot of every key's state
    pub async fn states(&self) -> Vec<KeyState> {
        self.pool.lock().await.keys.clone()
    }

    /// Number of keys in the pool
    pub async fn len(&self) -> usize {
        self.pool.lock().await.keys.len()
    }

    /// Whether the pool has no keys
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Last four characters of a key, for logs
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("...{}", tail)
}
