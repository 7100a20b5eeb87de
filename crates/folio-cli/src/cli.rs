//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use folio_extractor::{ExtractorConfig, RunOptions};
use std::path::PathBuf;

/// Folio - Batch extraction of structured metadata from documents with LLMs.
#[derive(Debug, Parser)]
#[command(name = "folio")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FOLIO_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract structured results from a corpus
    Extract(ExtractArgs),

    /// List built-in templates, or show one template's modules
    Templates(TemplatesArgs),
}

/// Arguments for the extract command.
#[derive(Debug, Parser)]
pub struct ExtractArgs {
    /// Input files or directories
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// File pattern for directory inputs (default: *.md)
    #[arg(short, long)]
    pub glob: Option<String>,

    /// Built-in template name or template file
    #[arg(short, long)]
    pub template: Option<String>,

    /// Model reference (provider/model)
    #[arg(short, long, env = "FOLIO_MODEL")]
    pub model: Option<String>,

    /// Output directory for stage outputs, results and error report
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Also write one result file per document
    #[arg(long)]
    pub split: bool,

    /// Directory for split output (implies --split; default: <output-dir>/split)
    #[arg(long)]
    pub split_dir: Option<PathBuf>,

    /// Rerun every module of documents without a complete result
    #[arg(long, conflicts_with = "retry_failed_stages")]
    pub retry_failed: bool,

    /// Rerun only modules that failed last time or have no output
    #[arg(long)]
    pub retry_failed_stages: bool,

    /// Rerun this module regardless of stored outputs (repeatable)
    #[arg(long = "force-stage", value_name = "MODULE")]
    pub force_stages: Vec<String>,

    /// First document index (inclusive)
    #[arg(long, default_value_t = 0)]
    pub start_idx: usize,

    /// Last document index (exclusive); -1 means through the last document
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub end_idx: i64,

    /// Pause after every N requests
    #[arg(long)]
    pub sleep_every: Option<u64>,

    /// Length of each pause in seconds
    #[arg(long)]
    pub sleep_time: Option<f64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Attempts per module, including the first
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Documents processed concurrently
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Language for free-text output fields
    #[arg(long)]
    pub output_language: Option<String>,

    /// Include documents with only some modules complete in the results
    #[arg(long)]
    pub allow_partial: bool,

    /// Schedule and estimate without sending requests
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl ExtractArgs {
    /// Apply command-line overrides on top of file configuration
    pub fn apply_overrides(&self, config: &mut ExtractorConfig) {
        if let Some(n) = self.sleep_every {
            config.sleep_every = n;
        }
        if let Some(secs) = self.sleep_time {
            config.sleep_time_secs = secs;
        }
        if let Some(secs) = self.timeout {
            config.timeout_secs = secs;
        }
        if let Some(n) = self.max_retries {
            config.max_retries = n;
        }
        if let Some(n) = self.max_concurrency {
            config.max_concurrency = n;
        }
        if let Some(language) = &self.output_language {
            config.output_language = language.clone();
        }
        if self.allow_partial {
            config.allow_partial = true;
        }
    }

    /// Per-run selection options
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            start_idx: self.start_idx,
            end_idx: self.end_idx,
            retry_failed: self.retry_failed,
            retry_failed_stages: self.retry_failed_stages,
            force_stages: self.force_stages.clone(),
            dry_run: self.dry_run,
        }
    }
}

/// Arguments for the templates command.
#[derive(Debug, Parser)]
pub struct TemplatesArgs {
    /// Template name or file to show in detail
    pub template: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("folio").chain(args.iter().copied()))
    }

    fn extract_args(args: &[&str]) -> ExtractArgs {
        match parse(args).unwrap().command {
            Command::Extract(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_extract_defaults() {
        let args = extract_args(&["extract", "papers/"]);
        assert_eq!(args.inputs, vec![PathBuf::from("papers/")]);
        let options = args.run_options();
        assert_eq!(options.start_idx, 0);
        assert_eq!(options.end_idx, -1);
        assert!(!options.dry_run);
    }

    #[test]
    fn test_negative_end_idx_and_repeated_force_stage() {
        let args = extract_args(&[
            "extract",
            "a.md",
            "--end-idx",
            "-1",
            "--force-stage",
            "meta",
            "--force-stage",
            "summary",
        ]);
        assert_eq!(args.end_idx, -1);
        assert_eq!(args.force_stages, vec!["meta", "summary"]);
    }

    #[test]
    fn test_retry_flags_conflict() {
        let result = parse(&["extract", "a.md", "--retry-failed", "--retry-failed-stages"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_apply_on_top_of_file_config() {
        let args = extract_args(&[
            "extract",
            "a.md",
            "--sleep-every",
            "10",
            "--sleep-time",
            "2.5",
            "--timeout",
            "90",
            "--max-retries",
            "5",
        ]);
        let mut config = ExtractorConfig {
            max_concurrency: 2,
            ..ExtractorConfig::default()
        };
        args.apply_overrides(&mut config);

        assert_eq!(config.sleep_every, 10);
        assert_eq!(config.sleep_time_secs, 2.5);
        assert_eq!(config.timeout_secs, 90);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.max_concurrency, 2);
    }

    #[test]
    fn test_verbose_counts() {
        let cli = parse(&["-vv", "templates"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
