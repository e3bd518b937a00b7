//! harvest-flatten: show how records flatten and remap for a source
//!
//! Meant for editing rule tables and column lists: it prints what the merge
//! would see, and optionally which keys never make it into the store.
//!
//! Usage:
//!   # Canonical record per input record, as NDJSON
//!   harvest-flatten --source worldbank export.json
//!
//!   # Flattened keys before prefix rules are applied
//!   harvest-flatten --source worldbank --raw export.json
//!
//!   # Count keys dropped by the rules or the schema across a batch
//!   harvest-flatten --source unhcr --ndjson --dropped fetched.jsonl

use anyhow::{Context, Result};
use clap::Parser;
use mdl_harvest::flatten::Flattener;
use mdl_harvest::{logging, read_records, DropStage, HarvestConfig, IngestOptions};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "harvest-flatten")]
#[command(about = "Print flattened and canonical keys of fetched records", long_about = None)]
struct Args {
    /// Input batch (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    #[arg(long, short = 'c', default_value = "config/sources.json")]
    config: PathBuf,

    #[arg(long, short = 's')]
    source: String,

    /// Process newline-delimited JSON (one document per line)
    #[arg(long)]
    ndjson: bool,

    /// JSON pointer to the record list inside each document
    #[arg(long)]
    records_pointer: Option<String>,

    /// Print flattened keys before prefix rules are applied
    #[arg(long, conflicts_with = "dropped")]
    raw: bool,

    /// Print counts of keys that are dropped instead of the records
    #[arg(long)]
    dropped: bool,
}

fn main() -> Result<()> {
    logging::init_logging();

    let args = Args::parse();
    let config = HarvestConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let pipeline = config.pipeline(&args.source)?;

    let reader: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(File::open(path).with_context(|| format!("Failed to open {}", path.display()))?),
        None => Box::new(std::io::stdin()),
    };
    let options = IngestOptions {
        ndjson: args.ndjson,
        records_pointer: args.records_pointer.clone(),
        ..IngestOptions::default()
    };
    let records = read_records(reader, pipeline.schema.identifier(), &options)?;

    let flattener = Flattener::new(&pipeline.flatten);
    let mut out = BufWriter::new(std::io::stdout().lock());
    // (stage, dropped key) -> records containing it
    let mut dropped: BTreeMap<(DropStage, String), usize> = BTreeMap::new();

    for raw in &records {
        let flat = flattener.flatten(raw);

        if args.raw {
            let line: Map<String, Value> = flat
                .into_iter()
                .map(|(k, v)| (k, v.map(Value::from).unwrap_or(Value::Null)))
                .collect();
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
            continue;
        }

        if args.dropped {
            let per_record: BTreeSet<(DropStage, String)> =
                pipeline.dropped_keys(&flat)?.into_iter().collect();
            for (stage, key) in per_record {
                *dropped.entry((stage, key)).or_insert(0) += 1;
            }
            continue;
        }

        let canonical = pipeline.rules.remap(flat)?;
        writeln!(out, "{}", serde_json::to_string(&canonical)?)?;
    }

    if args.dropped {
        for ((stage, key), count) in &dropped {
            writeln!(out, "{:>6}  {:<6}  {}", count, stage.as_str(), key)?;
        }
        eprintln!(
            "{} distinct keys dropped across {} records",
            dropped.len(),
            records.len()
        );
    }

    out.flush()?;
    Ok(())
}
