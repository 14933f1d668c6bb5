use anyhow::{Context, Result, bail};
use clap::Parser;
use merger::{merge_files, validate_batch};
use tracing_subscriber::EnvFilter;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::instrument;

#[derive(Parser)]
#[command(name = "docmerge-cli")]
#[command(about = "Merge documents of the same type into one")]
#[command(version)]
struct Args {
    /// Files to merge, in order
    #[arg(required = true, num_args = 2.., help = "Two or more files sharing one extension")]
    files: Vec<PathBuf>,

    /// Render PDFs, images and text as a single PDF
    #[arg(long)]
    save_as_pdf: bool,

    /// Path to the merged file (optional)
    #[arg(
        short,
        long,
        help = "Output path for the merged file. Defaults to merged_document.<ext> in the current directory"
    )]
    output: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    let count = args.files.len();
    let start_time = Instant::now();
    let output_path = run(args)?;

    let duration = start_time.elapsed();
    println!(
        "✅ Merged {} files into {} in {:?}",
        count,
        output_path.display(),
        duration
    );

    Ok(())
}

/// Validate and merge the input files, returning where the result was written.
#[instrument(skip_all, fields(files = args.files.len(), save_as_pdf = args.save_as_pdf))]
fn run(args: Args) -> Result<PathBuf> {
    let names = args
        .files
        .iter()
        .map(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
                .with_context(|| format!("Invalid file name: {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    validate_batch(&names)?;

    for path in &args.files {
        if !path.is_file() {
            bail!("No such file: {}", path.display());
        }
    }

    let start_time = Instant::now();
    let workdir = tempfile::tempdir().context("Could not create scratch directory")?;
    tracing::debug!("Merging in scratch directory. workdir={:?}", workdir.path());
    let merged = merge_files(&args.files, args.save_as_pdf, workdir.path())?;

    let output_path = args
        .output
        .unwrap_or_else(|| PathBuf::from(merged.download_name()));
    fs::copy(&merged.path, &output_path)
        .with_context(|| format!("Could not write {}", output_path.display()))?;

    tracing::info!(
        "Documents merged. extension={} output={:?} elapsed={:?}",
        merged.extension,
        output_path,
        start_time.elapsed()
    );
    Ok(output_path)
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
