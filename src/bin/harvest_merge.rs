//! harvest-merge: merge a fetched batch into a source's CSV store
//!
//! Usage:
//!   # Merge an export batch into the store configured for the source
//!   harvest-merge --config config/sources.json --source worldbank batch.json
//!
//!   # Catalog search response, records under result.rows, from stdin
//!   curl -s "$SEARCH_URL" | harvest-merge --source unhcr --records-pointer /result/rows
//!
//!   # See what would be appended without writing
//!   harvest-merge --source unhcr --ndjson --dry-run fetched.jsonl
//!
//! Exits with status 2 when the store header disagrees with the configured schema.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use mdl_harvest::{logging, read_records, run_incremental, HarvestConfig, HarvestError, IngestOptions, RunOptions};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "harvest-merge")]
#[command(about = "Append newly fetched datasets to a schema-stable CSV store", long_about = None)]
struct Args {
    /// Input batch (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Configuration file with flattening settings and source schemas
    #[arg(long, short = 'c', default_value = "config/sources.json")]
    config: PathBuf,

    /// Source name as configured, e.g. worldbank or unhcr
    #[arg(long, short = 's')]
    source: String,

    /// Store file (defaults to the source's configured store)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Process newline-delimited JSON (one document per line)
    #[arg(long)]
    ndjson: bool,

    /// JSON pointer to the record list inside each document
    #[arg(long)]
    records_pointer: Option<String>,

    /// JSON pointer used to fill a missing identifier, e.g. /doc_desc/idno
    #[arg(long)]
    identifier_from: Option<String>,

    /// Keep only records created in this year
    #[arg(long)]
    year: Option<i32>,

    /// Report what would be appended without writing the store
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    logging::init_logging();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let schema_mismatch = err
                .downcast_ref::<HarvestError>()
                .map(HarvestError::is_schema_format)
                .unwrap_or(false);
            error!("{:#}", err);
            if schema_mismatch {
                error!("store layout disagrees with the configured schema; migrate the store or edit the schema, then rerun");
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = HarvestConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let pipeline = config.pipeline(&args.source)?;

    let store_path = match args.store {
        Some(path) => path,
        None => config
            .source(&args.source)?
            .store
            .clone()
            .ok_or_else(|| anyhow!("no --store given and source '{}' has no configured store", args.source))?,
    };

    let reader: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(std::io::stdin()),
    };

    let options = IngestOptions {
        ndjson: args.ndjson,
        records_pointer: args.records_pointer,
        identifier_from: args.identifier_from,
        created_year: args.year,
    };
    let records = read_records(reader, pipeline.schema.identifier(), &options)
        .context("Failed to read input batch")?;
    info!(source = %args.source, records = records.len(), "read input batch");

    // HarvestError is kept as the root cause so main can pick the exit code
    let summary = run_incremental(
        &store_path,
        records,
        &pipeline,
        RunOptions {
            dry_run: args.dry_run,
        },
    )?;

    println!(
        "{}: {} appended, {} already stored, {} duplicate in batch, {} skipped; {} -> {} rows{}",
        args.source,
        summary.merge.appended,
        summary.merge.already_stored,
        summary.merge.duplicate_in_batch,
        summary.skipped.len(),
        summary.rows_before,
        summary.rows_after,
        if summary.written { "" } else { " (store not written)" }
    );

    Ok(())
}
