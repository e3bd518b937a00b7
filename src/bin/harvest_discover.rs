//! harvest-discover: inspect a legacy datasets.csv before migrating it
//!
//! Lists duplicate column groups (`notes`, `notes.1`, ...), suggests canonical
//! names where the origin is known, and prints a column template to paste into
//! the source configuration.
//!
//! Usage:
//!   harvest-discover data/world_bank/datasets.csv
//!   harvest-discover --template-only --compact data/unhcr/datasets.csv

use anyhow::{Context, Result};
use clap::Parser;
use mdl_harvest::logging;
use mdl_harvest::schema::discover::suggest_canonical;
use mdl_harvest::schema::{find_duplicate_groups, profile_csv, schema_template};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "harvest-discover")]
#[command(about = "Find duplicate columns in a legacy store and draft a schema", long_about = None)]
struct Args {
    /// Legacy CSV store
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Rows sampled to count filled values per column
    #[arg(long, default_value_t = 100)]
    sample_rows: usize,

    /// Identifier column written into the template
    #[arg(long, default_value = "id")]
    identifier: String,

    /// Only print the schema template
    #[arg(long)]
    template_only: bool,

    /// Compact template output (no pretty-printing)
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    logging::init_logging();

    let args = Args::parse();
    let profile = profile_csv(&args.input, args.sample_rows)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    if !args.template_only {
        println!("{}: {} columns, {} rows sampled", args.input.display(), profile.columns.len(), profile.rows_read);

        let groups = find_duplicate_groups(&profile.columns);
        if groups.is_empty() {
            println!("\nNo duplicate column groups.");
        } else {
            println!("\nDuplicate column groups: {}", groups.len());
        }

        for group in &groups {
            println!("\n  {}:", group.base);
            for variant in &group.variants {
                let filled = profile.non_null_count(variant).unwrap_or(0);
                println!("    - {:<60} ({} non-null)", variant, filled);
            }
            match suggest_canonical(group) {
                Some(pairs) => {
                    for (variant, target) in pairs {
                        println!("    suggestion: {} -> {}", variant, target);
                    }
                }
                None => println!("    suggestion: manual review needed"),
            }
        }
        println!();
    }

    if profile.columns.is_empty() {
        eprintln!("Warning: no header found in input");
    }

    let template = schema_template(&profile.columns, &args.identifier);
    let output = if args.compact {
        serde_json::to_string(&template)?
    } else {
        serde_json::to_string_pretty(&template)?
    };
    println!("{}", output);

    Ok(())
}
