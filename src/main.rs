use std::path::PathBuf;

use clap::Parser;
use patchsheet::config::{ReportConfig, init_logging};
use patchsheet::service::{DirectorySink, NoopSink, SnapshotService};
use patchsheet::{ReportError, Result, report};

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(&cli.log_filter)?;

    if !cli.snapshot.exists() {
        return Err(ReportError::MissingInput(cli.snapshot));
    }

    let mut config = ReportConfig {
        output_dir: cli.output_dir,
        ..ReportConfig::default()
    };
    if !cli.baseline_prefix.is_empty() {
        config.baseline_prefixes = cli.baseline_prefix;
    }

    let mut service = SnapshotService::from_path(&cli.snapshot)?;
    let summary = match cli.bucket {
        Some(bucket) => {
            config.bucket = bucket;
            let mut sink = DirectorySink;
            report::generate(&mut service, &mut sink, &config)?
        }
        None => {
            let mut sink = NoopSink;
            report::generate(&mut service, &mut sink, &config)?
        }
    };

    for (file, outcome) in &summary.outcomes {
        println!("{file}: {outcome}");
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Build a multi-sheet patch inventory report from a captured API snapshot."
)]
struct Cli {
    /// JSON snapshot of the management API's responses.
    #[arg(long)]
    snapshot: PathBuf,

    /// Directory the workbook is written into.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Destination directory standing in for the upload bucket. When absent
    /// the workbook is kept where it was written.
    #[arg(long)]
    bucket: Option<String>,

    /// Patch-baseline name prefixes to query. Repeat for multiple prefixes.
    #[arg(long = "baseline-prefix")]
    baseline_prefix: Vec<String>,

    /// Tracing filter directive.
    #[arg(long, default_value = "info")]
    log_filter: String,
}
