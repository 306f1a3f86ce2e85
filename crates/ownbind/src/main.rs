//! `ownbind` command line: classify a declaration catalog and print the
//! wrapper report as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ownbind::{ClassifyContext, RustFrontend};

#[derive(Parser, Debug)]
#[command(name = "ownbind", version, about = "Classify ownership in native declarations")]
struct Cli {
    /// Catalog of declarations written as Rust items
    catalog: PathBuf,

    /// Classifier configuration (JSON); defaults apply to missing fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the report on one line
    #[arg(long)]
    compact: bool,

    /// Exit with an error when any declaration could not be planned
    #[arg(long)]
    deny_failures: bool,

    /// Require explicit annotations on non-const pointers
    #[arg(long)]
    strict: bool,
}

fn load_context(cli: &Cli) -> Result<ClassifyContext> {
    let mut ctx = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ClassifyContext::from_json(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ClassifyContext::default(),
    };
    if cli.strict {
        ctx.require_explicit_pointer_ownership = true;
    }
    Ok(ctx)
}

fn run(cli: &Cli) -> Result<bool> {
    let ctx = load_context(cli)?;
    let report = ownbind::report_path(&RustFrontend::new(), &cli.catalog, &ctx)
        .with_context(|| format!("loading catalog {}", cli.catalog.display()))?;
    let json = report
        .to_json(!cli.compact)
        .context("serializing report")?;
    println!("{}", json);

    info!(
        plans = report.plans.len(),
        skipped = report.skipped.len(),
        failures = report.failures.len(),
        "report written"
    );
    Ok(report.is_clean())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(clean) if clean || !cli.deny_failures => ExitCode::SUCCESS,
        Ok(_) => {
            eprintln!("error: some declarations could not be planned");
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}
