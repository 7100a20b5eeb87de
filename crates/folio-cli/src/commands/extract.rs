//! Extract command implementation.

use crate::cli::ExtractArgs;
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use folio_extractor::{
    discover, load_documents, resolve_template, Orchestrator, OutputPaths, RunReport,
    DEFAULT_TEMPLATE,
};
use folio_llm::{ProviderRegistry, StructuredMode};
use folio_store::JsonStageStore;
use std::path::PathBuf;
use tracing::info;

/// Output directory used when neither the flag nor the config names one
pub const DEFAULT_OUTPUT_DIR: &str = "folio-out";

/// Execute the extract command.
pub async fn execute_extract(args: ExtractArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let report = run_extract(&args, config).await?;
    print_report(&args, &report, formatter)?;
    Ok(())
}

/// Resolve everything the run needs, then drive it.
///
/// All configuration problems surface here, before any request is sent.
pub async fn run_extract(args: &ExtractArgs, config: &Config) -> Result<RunReport> {
    let mut extract = config.extract.clone();
    args.apply_overrides(&mut extract);
    extract.validate().map_err(CliError::Config)?;

    let options = args.run_options();
    options.validate().map_err(CliError::Config)?;

    let template_ref = args
        .template
        .as_deref()
        .or(config.defaults.template.as_deref())
        .unwrap_or(DEFAULT_TEMPLATE);
    let template = resolve_template(template_ref)?;

    let model_ref = args
        .model
        .as_deref()
        .or(config.defaults.model.as_deref())
        .ok_or_else(|| {
            CliError::Config("no model given; pass --model provider/model".to_string())
        })?;
    let resolved = ProviderRegistry::new(config.providers.iter().cloned()).resolve(model_ref)?;

    let paths = discover(&args.inputs, args.glob.as_deref())?;
    let documents = load_documents(&paths)?;
    info!(
        "Loaded {} documents, template '{}', model {}",
        documents.len(),
        template.name,
        model_ref
    );

    let output_dir = output_dir(args, config);
    let mut output_paths = OutputPaths::in_dir(&output_dir);
    if let Some(dir) = &args.split_dir {
        output_paths = output_paths.with_split_dir(dir.clone());
    } else if args.split {
        output_paths = output_paths.with_split_dir(output_dir.join("split"));
    }
    let store = JsonStageStore::new(output_dir.join("stages"))?;

    let mut orchestrator = Orchestrator::new(extract, template, resolved.provider, store, output_paths)
        .with_api_keys(resolved.api_keys);
    if resolved.config.structured_mode() == StructuredMode::None {
        orchestrator = orchestrator.without_structured_output();
    }

    Ok(orchestrator.run(&documents, &options).await?)
}

fn output_dir(args: &ExtractArgs, config: &Config) -> PathBuf {
    args.output_dir
        .clone()
        .or_else(|| config.defaults.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

fn print_report(args: &ExtractArgs, report: &RunReport, formatter: &Formatter) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
        return Ok(());
    }

    println!("{}", report.summary);
    if report.summary.dry_run {
        println!("{}", formatter.info("Dry run: no requests sent, no files written"));
        return Ok(());
    }

    if report.failures.is_empty() {
        println!(
            "{}",
            formatter.success(&format!(
                "{} documents in results",
                report.aggregate_documents
            ))
        );
    } else {
        println!(
            "{}",
            formatter.warning(&format!(
                "{} modules failed; rerun with --retry-failed-stages",
                report.failures.len()
            ))
        );
        println!("{}", formatter.format_failures(&report.failures));
    }
    if !report.split_files.is_empty() {
        println!(
            "{}",
            formatter.info(&format!("{} split files written", report.split_files.len()))
        );
    }
    Ok(())
}
