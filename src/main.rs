// src/main.rs
mod config;
mod extractors;
mod pages;
mod pipeline;
mod reconcile;
mod storage;
mod table;
mod utils;

use clap::{Parser, Subcommand};
use config::{AppConfig, DEFAULT_PROFILE};
use reconcile::HierarchyModel;
use std::path::PathBuf;
use std::sync::Arc;
use storage::{StorageManager, TableInfo};
use utils::AppError;

/// Extracts hospital financial measures from page-text reports into wide fact tables
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbose logging (debug level unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan page-text files and write per-section, merged and hierarchy tables
    Extract {
        /// Page-text files, pages separated by form feeds
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// JSON config with sections, profiles and lookup tables (built-in defaults if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Source profile to scan with
        #[arg(short, long, default_value = DEFAULT_PROFILE)]
        profile: String,

        /// Output directory for extracted tables
        #[arg(short, long, default_value = "./output")]
        output_dir: PathBuf,

        /// Base name for run-level outputs
        #[arg(short, long, default_value = "hospital")]
        name: String,

        /// Also write the merged table restricted to these subtrees
        #[arg(long, value_delimiter = ',')]
        roots: Vec<String>,
    },

    /// Merge previously written fact tables (CSV, or .bin copies) into one table
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output_dir: PathBuf,

        /// Base name of the merged table
        #[arg(short, long, default_value = "merged")]
        name: String,

        /// Header of the entity column
        #[arg(long, default_value = "Hospital")]
        entity_column: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();
    utils::logging::setup_logging(if args.verbose { "debug" } else { "info" });
    tracing::info!("Starting processing for args: {:?}", args);

    match args.command {
        Command::Extract {
            inputs,
            config,
            profile,
            output_dir,
            name,
            roots,
        } => run_extract(inputs, config, &profile, output_dir, &name, &roots).await,
        Command::Merge {
            inputs,
            output_dir,
            name,
            entity_column,
        } => run_merge(&inputs, output_dir, &name, &entity_column),
    }
}

async fn run_extract(
    inputs: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    profile_name: &str,
    output_dir: PathBuf,
    name: &str,
    roots: &[String],
) -> Result<(), AppError> {
    // 1. Configuration and lookup tables, all before any page is read
    let config = match &config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let profile = config.profile(profile_name)?;
    let lookups = config.load_lookups()?;

    // 2. Initialize storage
    let storage = StorageManager::new(&output_dir, &config.entity_column)?;

    // 3. Scan and reconcile every document
    let config = Arc::new(config);
    let lookups = Arc::new(lookups);
    let extracts = pipeline::extract_documents(
        &inputs,
        Arc::clone(&config),
        Arc::new(profile),
        Arc::clone(&lookups),
    )
    .await?;

    // 4. Per-source tables
    let mut success_count = 0;
    let mut failure_count = 0;
    for extract in &extracts {
        for section in &extract.tables {
            if section.table.is_empty() {
                tracing::warn!("{}: no records in section {}", extract.name, section.section);
                continue;
            }
            let table_name = section.file_name(&extract.name);
            let info = TableInfo {
                source: &extract.name,
                section: &section.section,
                pages: extract.pages,
                failed_pages: extract.failed_pages,
            };

            match storage
                .save_table(&table_name, &section.table)
                .and_then(|_| storage.save_table_binary(&table_name, &section.table))
                .and_then(|_| storage.save_table_metadata(&table_name, &section.table, &info))
            {
                Ok(_) => {
                    tracing::info!(
                        "Successfully extracted {} records from {} entities ({} / {})",
                        section.table.len(),
                        section.table.entity_count(),
                        extract.name,
                        section.section
                    );
                    success_count += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to save {}: {}", table_name, e);
                    failure_count += 1;
                }
            }
        }
    }

    // 5. Run-level merge and hierarchy (fatal on collisions and cycles)
    let assembled = pipeline::assemble(&extracts, &config, &lookups)?;
    if assembled.merged.is_empty() {
        tracing::warn!("No records extracted from {} documents", extracts.len());
    }
    if assembled.hierarchy.is_empty() {
        tracing::warn!("Hierarchy model is empty; no paths will be written");
    }

    // 6. One table per category across all sources
    for section in &assembled.sections {
        let table_name = section.file_name(name);
        storage.save_table(&table_name, &section.table)?;
        storage.save_table_binary(&table_name, &section.table)?;
    }

    // 7. Everything in one table, plus the hierarchy it hangs from
    let merged_name = format!("{}_merged", name);
    storage.save_table(&merged_name, &assembled.merged)?;
    storage.save_table_binary(&merged_name, &assembled.merged)?;
    storage.save_hierarchy(
        &format!("{}_hierarchy", name),
        &assembled.hierarchy,
        &assembled.paths,
    )?;

    // 8. Optional subtree view of the merged table
    if !roots.is_empty() {
        let keep = HierarchyModel::subtree(
            &assembled.paths,
            roots,
            assembled.hierarchy.delimiter(),
        );
        let view = assembled.merged.filter_measures(|m| keep.contains(m));
        tracing::info!("Subtree view of {:?}: {} records", roots, view.len());
        storage.save_table(&format!("{}_subtree", merged_name), &view)?;
    }

    // 9. Summary
    tracing::info!(
        "Processing finished. Documents: {}, tables saved: {}, failures: {}, merged records: {}, measures: {}",
        extracts.len(),
        success_count,
        failure_count,
        assembled.merged.len(),
        assembled.paths.len()
    );

    if success_count == 0 && failure_count > 0 {
        return Err(AppError::Processing(format!(
            "Failed to save any of {} extracted tables",
            failure_count
        )));
    }

    Ok(())
}

fn run_merge(
    inputs: &[PathBuf],
    output_dir: PathBuf,
    name: &str,
    entity_column: &str,
) -> Result<(), AppError> {
    // 1. Read every input table; .bin copies skip CSV parsing
    let tables = inputs
        .iter()
        .map(|path| match path.extension().and_then(|e| e.to_str()) {
            Some("bin") => storage::load_table_binary(path),
            _ => storage::read_fact_table(path),
        })
        .collect::<Result<Vec<_>, _>>()?;
    // 2. Outer union on (entity, measure), periods in ascending order
    let merged = table::merge(&tables);

    // 3. Save the merged table
    let storage = StorageManager::new(&output_dir, entity_column)?;
    storage.save_table(name, &merged)?;
    storage.save_table_binary(name, &merged)?;

    tracing::info!(
        "Merged {} tables into {} records from {} entities across {} periods",
        tables.len(),
        merged.len(),
        merged.entity_count(),
        merged.periods().len()
    );
    Ok(())
}
