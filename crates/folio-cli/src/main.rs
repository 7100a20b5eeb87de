//! Folio CLI - batch extraction of structured metadata from documents.

use clap::Parser;
use folio_cli::commands;
use folio_cli::{Cli, Command, Config, Formatter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let formatter = Formatter::new(!cli.no_color);
    if let Err(e) = run(cli, &formatter).await {
        eprintln!("{}", formatter.error(&e.to_string()));
        std::process::exit(1);
    }
}

/// Log to stderr so stdout carries only command output
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli, formatter: &Formatter) -> folio_cli::Result<()> {
    match cli.command {
        Command::Extract(args) => {
            let config = Config::load(cli.config.as_deref())?;
            commands::execute_extract(args, &config, formatter).await
        }
        Command::Templates(args) => commands::execute_templates(args, formatter).await,
    }
}
