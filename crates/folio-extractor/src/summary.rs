//! Run summary collection
//!
//! Counters are atomics so workers record without contending on a lock.
//! Only the per-stage failure map takes a (short, synchronous) lock.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Characters per estimated token
pub const CHARS_PER_TOKEN: u64 = 4;

/// Estimate tokens for a character count, rounding up
pub fn estimate_tokens(chars: u64) -> u64 {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Live counters for one run
#[derive(Debug)]
pub struct RunSummary {
    /// Documents in the selected range
    pub documents_total: AtomicU64,

    /// Documents whose module chain was driven to completion
    pub documents_processed: AtomicU64,

    /// Units scheduled by the queue builder
    pub units_scheduled: AtomicU64,

    /// Units skipped because a current output existed
    pub units_skipped: AtomicU64,

    /// Units that produced a persisted output
    pub units_succeeded: AtomicU64,

    /// Units that exhausted their attempts or failed fatally
    pub units_failed: AtomicU64,

    /// Provider requests issued (every attempt)
    pub requests: AtomicU64,

    /// Attempts beyond the first
    pub retries: AtomicU64,

    /// Characters of source document sent
    pub input_chars: AtomicU64,

    /// Characters of rendered prompt sent (system + user)
    pub prompt_chars: AtomicU64,

    /// Characters of response received
    pub output_chars: AtomicU64,

    stage_failures: Mutex<BTreeMap<String, u64>>,
    start_time: Instant,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    /// Start a summary; duration is measured from now
    pub fn new() -> Self {
        Self {
            documents_total: AtomicU64::new(0),
            documents_processed: AtomicU64::new(0),
            units_scheduled: AtomicU64::new(0),
            units_skipped: AtomicU64::new(0),
            units_succeeded: AtomicU64::new(0),
            units_failed: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            input_chars: AtomicU64::new(0),
            prompt_chars: AtomicU64::new(0),
            output_chars: AtomicU64::new(0),
            stage_failures: Mutex::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record one request attempt
    pub fn record_request(&self, input_chars: usize, prompt_chars: usize, output_chars: usize) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.input_chars.fetch_add(input_chars as u64, Ordering::Relaxed);
        self.prompt_chars.fetch_add(prompt_chars as u64, Ordering::Relaxed);
        self.output_chars.fetch_add(output_chars as u64, Ordering::Relaxed);
    }

    /// Record the chars a unit would send, without a request (dry run)
    pub fn record_planned(&self, input_chars: usize, prompt_chars: usize) {
        self.input_chars.fetch_add(input_chars as u64, Ordering::Relaxed);
        self.prompt_chars.fetch_add(prompt_chars as u64, Ordering::Relaxed);
    }

    /// Record a retry attempt
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed unit for `stage`
    pub fn record_stage_failure(&self, stage: &str) {
        self.units_failed.fetch_add(1, Ordering::Relaxed);
        let mut failures = self
            .stage_failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *failures.entry(stage.to_string()).or_insert(0) += 1;
    }

    /// Add to a counter
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Freeze the counters into a report
    pub fn snapshot(&self, dry_run: bool) -> SummaryReport {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let elapsed = self.start_time.elapsed();
        let secs = elapsed.as_secs_f64();

        let documents_total = load(&self.documents_total);
        let documents_processed = load(&self.documents_processed);
        let input_chars = load(&self.input_chars);
        let prompt_chars = load(&self.prompt_chars);
        let output_chars = if dry_run { 0 } else { load(&self.output_chars) };
        let prompt_tokens = estimate_tokens(prompt_chars);
        let completion_tokens = estimate_tokens(output_chars);
        let total_tokens = prompt_tokens + completion_tokens;

        let per_doc = |value: u64| {
            if documents_total == 0 {
                0.0
            } else {
                value as f64 / documents_total as f64
            }
        };
        let rate = |value: f64| if secs > 0.0 { value / secs } else { 0.0 };

        SummaryReport {
            dry_run,
            duration: elapsed,
            documents_total,
            documents_processed,
            units_scheduled: load(&self.units_scheduled),
            units_skipped: load(&self.units_skipped),
            units_succeeded: load(&self.units_succeeded),
            units_failed: load(&self.units_failed),
            requests: load(&self.requests),
            retries: load(&self.retries),
            input_chars,
            prompt_chars,
            output_chars,
            prompt_tokens,
            completion_tokens,
            total_tokens,
            avg_input_chars_per_doc: per_doc(input_chars),
            avg_tokens_per_doc: per_doc(total_tokens),
            docs_per_minute: rate(documents_processed as f64) * 60.0,
            tokens_per_second: rate(total_tokens as f64),
            stage_failures: self
                .stage_failures
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
        }
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Final figures for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    /// Whether requests were actually sent
    pub dry_run: bool,

    /// Wall-clock duration (serialized as seconds)
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,

    /// Documents in the selected range
    pub documents_total: u64,

    /// Documents driven to completion
    pub documents_processed: u64,

    /// Units scheduled
    pub units_scheduled: u64,

    /// Units skipped
    pub units_skipped: u64,

    /// Units succeeded
    pub units_succeeded: u64,

    /// Units failed
    pub units_failed: u64,

    /// Requests issued
    pub requests: u64,

    /// Retry attempts
    pub retries: u64,

    /// Source characters sent
    pub input_chars: u64,

    /// Prompt characters sent
    pub prompt_chars: u64,

    /// Response characters received (0 in a dry run)
    pub output_chars: u64,

    /// Estimated prompt tokens
    pub prompt_tokens: u64,

    /// Estimated completion tokens
    pub completion_tokens: u64,

    /// Estimated total tokens
    pub total_tokens: u64,

    /// Average source characters per document
    pub avg_input_chars_per_doc: f64,

    /// Average estimated tokens per document
    pub avg_tokens_per_doc: f64,

    /// Throughput in documents per minute
    pub docs_per_minute: f64,

    /// Throughput in estimated tokens per second
    pub tokens_per_second: f64,

    /// Failed units per stage
    pub stage_failures: BTreeMap<String, u64>,
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = if self.dry_run {
            "Extraction Summary (dry run)"
        } else {
            "Extraction Summary"
        };
        writeln!(f, "{}", title)?;
        writeln!(f, "{}", "=".repeat(title.len()))?;
        writeln!(f, "Duration: {:.1}s", self.duration.as_secs_f64())?;
        writeln!(
            f,
            "Documents: {} processed / {} selected",
            self.documents_processed, self.documents_total
        )?;
        writeln!(
            f,
            "Units: {} scheduled, {} succeeded, {} skipped, {} failed",
            self.units_scheduled, self.units_succeeded, self.units_skipped, self.units_failed
        )?;
        writeln!(f, "Requests: {} ({} retries)", self.requests, self.retries)?;
        writeln!(
            f,
            "Chars: {} input, {} prompt, {} output",
            self.input_chars, self.prompt_chars, self.output_chars
        )?;
        writeln!(
            f,
            "Estimated tokens: {} prompt + {} completion = {}",
            self.prompt_tokens, self.completion_tokens, self.total_tokens
        )?;
        writeln!(
            f,
            "Per document: {:.0} input chars, {:.0} tokens",
            self.avg_input_chars_per_doc, self.avg_tokens_per_doc
        )?;
        write!(
            f,
            "Throughput: {:.2} docs/min, {:.1} tokens/s",
            self.docs_per_minute, self.tokens_per_second
        )?;

        if !self.stage_failures.is_empty() {
            writeln!(f)?;
            writeln!(f)?;
            write!(f, "Failures by stage:")?;
            for (stage, count) in &self.stage_failures {
                write!(f, "\n  {}: {}", stage, count)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(1), 1);
        assert_eq!(estimate_tokens(8), 2);
        assert_eq!(estimate_tokens(9), 3);
    }

    #[test]
    fn test_record_and_snapshot() {
        let summary = RunSummary::new();
        RunSummary::add(&summary.documents_total, 2);
        summary.record_request(100, 120, 40);
        summary.record_request(100, 120, 0);
        summary.record_retry();
        summary.record_stage_failure("summary");
        summary.record_stage_failure("summary");

        let report = summary.snapshot(false);
        assert_eq!(report.requests, 2);
        assert_eq!(report.retries, 1);
        assert_eq!(report.input_chars, 200);
        assert_eq!(report.prompt_tokens, 60);
        assert_eq!(report.completion_tokens, 10);
        assert_eq!(report.units_failed, 2);
        assert_eq!(report.stage_failures.get("summary"), Some(&2));
        assert_eq!(report.avg_input_chars_per_doc, 100.0);
    }

    #[test]
    fn test_dry_run_reports_zero_output() {
        let summary = RunSummary::new();
        summary.record_planned(400, 480);
        summary.output_chars.fetch_add(99, Ordering::Relaxed);

        let report = summary.snapshot(true);
        assert_eq!(report.output_chars, 0);
        assert_eq!(report.completion_tokens, 0);
        assert_eq!(report.prompt_tokens, 120);
        assert_eq!(report.requests, 0);
    }

    #[test]
    fn test_display() {
        let summary = RunSummary::new();
        summary.record_stage_failure("meta");
        let text = summary.snapshot(false).to_string();
        assert!(text.starts_with("Extraction Summary\n"));
        assert!(text.contains("Failures by stage:\n  meta: 1"));
    }

    #[test]
    fn test_report_serializes_duration_as_seconds() {
        let report = RunSummary::new().snapshot(false);
        let value = serde_json::to_value(&report).unwrap();
        assert!(value["duration"].is_f64());
    }
}
