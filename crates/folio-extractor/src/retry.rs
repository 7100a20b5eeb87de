//! Bounded retry around the stage executor

use crate::executor::{StageExecutor, StageFailure, StageOutcome, StageRequest};
use crate::keys::KeyRotator;
use crate::prompt::RenderedPrompt;
use crate::summary::RunSummary;
use crate::throttle::ThrottleGovernor;
use folio_domain::{FailureKind, Module};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per unit, including the first
    pub max_attempts: u32,

    /// First backoff delay (zero disables backoff)
    pub backoff_base: Duration,

    /// Backoff cap
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.backoff_base.is_zero() {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(30));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(20),
        }
    }
}

/// A unit that produced valid output
#[derive(Debug, Clone, PartialEq)]
pub struct StageSuccess {
    /// Validated output object
    pub output: Map<String, Value>,

    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Drives one unit through up to `max_attempts` executor calls
///
/// Every attempt passes through the throttle, takes a fresh key and reports
/// back to the rotator. Provider-side failures cool the key; parse and
/// validation failures retry without cooling it.
pub struct RetryController {
    policy: RetryPolicy,
    keys: Arc<KeyRotator>,
    throttle: Arc<ThrottleGovernor>,
    summary: Arc<RunSummary>,
    structured: bool,
}

impl RetryController {
    /// Create a controller over shared key, throttle and summary services
    pub fn new(
        policy: RetryPolicy,
        keys: Arc<KeyRotator>,
        throttle: Arc<ThrottleGovernor>,
        summary: Arc<RunSummary>,
    ) -> Self {
        Self {
            policy,
            keys,
            throttle,
            summary,
            structured: true,
        }
    }

    /// Start every unit without structured output
    pub fn without_structured_output(mut self) -> Self {
        self.structured = false;
        self
    }

    /// Run one unit to success or exhaustion
    ///
    /// `input_chars` is the size of the document content inside `prompt`, for
    /// the run summary.
    pub async fn run(
        &self,
        executor: &StageExecutor,
        module: &Module,
        prompt: &RenderedPrompt,
        input_chars: usize,
    ) -> Result<StageSuccess, StageFailure> {
        let prompt_chars = prompt.char_count();
        let mut structured = self.structured;
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                self.summary.record_retry();
            }

            self.throttle.acquire().await;
            let key = self.keys.select().await;

            let outcome = executor
                .execute(StageRequest {
                    module,
                    prompt,
                    credential: key.as_deref(),
                    structured,
                })
                .await;

            let (failure, response_chars, mut retryable) = match outcome {
                StageOutcome::Success {
                    output,
                    response_chars,
                } => {
                    self.summary
                        .record_request(input_chars, prompt_chars, response_chars);
                    if let Some(key) = &key {
                        self.keys.report_success(key).await;
                    }
                    return Ok(StageSuccess {
                        output,
                        attempts: attempt,
                    });
                }
                StageOutcome::Retryable {
                    failure,
                    response_chars,
                } => (failure, response_chars, true),
                StageOutcome::Fatal(failure) => (failure, 0, false),
            };

            self.summary
                .record_request(input_chars, prompt_chars, response_chars);

            if failure.kind == FailureKind::StructuredOutputUnsupported {
                if structured {
                    debug!(
                        "Stage '{}': provider rejected structured output, falling back",
                        module.name
                    );
                    structured = false;
                } else {
                    retryable = false;
                }
            }

            if let Some(key) = &key {
                self.keys
                    .report_error(key, retryable && failure.kind.cools_key())
                    .await;
            }

            if !retryable || attempt >= self.policy.max_attempts {
                warn!(
                    "Stage '{}' failed after {} attempt(s): {}",
                    module.name, attempt, failure.message
                );
                return Err(failure);
            }

            debug!(
                "Stage '{}' attempt {} failed ({}), retrying",
                module.name, attempt, failure.kind
            );
            let delay = self.policy.backoff(attempt);
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_domain::ProviderError;
    use folio_llm::MockProvider;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    struct Harness {
        provider: MockProvider,
        keys: Arc<KeyRotator>,
        throttle: Arc<ThrottleGovernor>,
        summary: Arc<RunSummary>,
        controller: RetryController,
        executor: StageExecutor,
    }

    fn harness(keys: &[&str], max_attempts: u32) -> Harness {
        let provider = MockProvider::new(r#"{"title": "ok"}"#);
        let keys = Arc::new(KeyRotator::new(
            keys.iter().map(|k| k.to_string()),
            Duration::from_secs(60),
        ));
        let throttle = Arc::new(ThrottleGovernor::disabled());
        let summary = Arc::new(RunSummary::new());
        let policy = RetryPolicy {
            max_attempts,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
        };
        let controller =
            RetryController::new(policy, keys.clone(), throttle.clone(), summary.clone());
        let executor = StageExecutor::new(Arc::new(provider.clone()), Duration::from_secs(5));
        Harness {
            provider,
            keys,
            throttle,
            summary,
            controller,
            executor,
        }
    }

    fn module() -> Module {
        Module::new("meta", "s", "u", json!({"required": ["title"]}))
    }

    fn prompt() -> RenderedPrompt {
        RenderedPrompt {
            system: "s".to_string(),
            user: "u".to_string(),
        }
    }

    async fn run(h: &Harness) -> Result<StageSuccess, StageFailure> {
        h.controller.run(&h.executor, &module(), &prompt(), 10).await
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let h = harness(&["k1"], 3);
        let success = run(&h).await.unwrap();
        assert_eq!(success.attempts, 1);
        assert_eq!(h.summary.requests.load(Ordering::Relaxed), 1);
        assert_eq!(h.summary.retries.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_rotates_to_other_key() {
        let h = harness(&["k1", "k2"], 3);
        h.provider.push_error(ProviderError::RateLimited("429".into()));

        let success = run(&h).await.unwrap();
        assert_eq!(success.attempts, 2);

        let calls = h.provider.calls();
        assert_eq!(calls[0].credential.as_deref(), Some("k1"));
        assert_eq!(calls[1].credential.as_deref(), Some("k2"));

        let states = h.keys.states().await;
        assert!(states[0].cooldown_until.is_some());
        assert_eq!(states[0].consecutive_errors, 1);
    }

    #[tokio::test]
    async fn test_parse_errors_retry_without_cooling() {
        let h = harness(&["k1"], 3);
        h.provider.push_response("not json");
        h.provider.push_response(r#"{"wrong": 1}"#);

        let success = run(&h).await.unwrap();
        assert_eq!(success.attempts, 3);
        assert_eq!(h.summary.retries.load(Ordering::Relaxed), 2);
        assert_eq!(h.throttle.issued().await, 3);

        let states = h.keys.states().await;
        assert!(states[0].cooldown_until.is_none());
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_failure() {
        let h = harness(&[], 2);
        h.provider.push_response("garbage");
        h.provider.push_response(r#"{"no_title": true}"#);

        let failure = run(&h).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::ValidationError);
        assert_eq!(h.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let h = harness(&["k1"], 5);
        h.provider.push_error(ProviderError::Fatal("401".into()));

        let failure = run(&h).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::FatalProviderError);
        assert_eq!(h.provider.call_count(), 1);
        assert!(h.keys.states().await[0].cooldown_until.is_none());
    }

    #[tokio::test]
    async fn test_structured_output_fallback() {
        let h = harness(&[], 3);
        h.provider
            .push_error(ProviderError::StructuredOutputUnsupported("response_format".into()));

        let success = run(&h).await.unwrap();
        assert_eq!(success.attempts, 2);
        let calls = h.provider.calls();
        assert!(calls[0].structured);
        assert!(!calls[1].structured);
    }

    #[tokio::test]
    async fn test_structured_rejection_without_structured_mode_is_fatal() {
        let mut h = harness(&[], 3);
        h.controller = RetryController::new(
            RetryPolicy {
                max_attempts: 3,
                backoff_base: Duration::ZERO,
                backoff_max: Duration::ZERO,
            },
            h.keys.clone(),
            h.throttle.clone(),
            h.summary.clone(),
        )
        .without_structured_output();
        h.provider
            .push_error(ProviderError::StructuredOutputUnsupported("response_format".into()));

        let failure = run(&h).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::StructuredOutputUnsupported);
        assert_eq!(h.provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts() {
        let h = harness(&[], 3);
        let controller = RetryController::new(
            RetryPolicy {
                max_attempts: 3,
                backoff_base: Duration::from_secs(2),
                backoff_max: Duration::from_secs(3),
            },
            h.keys.clone(),
            h.throttle.clone(),
            h.summary.clone(),
        );
        h.provider.push_response("bad");
        h.provider.push_response("bad");

        let start = tokio::time::Instant::now();
        controller
            .run(&h.executor, &module(), &prompt(), 0)
            .await
            .unwrap();
        // 2s after the first failure, min(4s, 3s) after the second
        assert_eq!(tokio::time::Instant::now() - start, Duration::from_secs(5));
    }

    #[test]
    fn test_policy_backoff() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(3),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(3));
    }
}
