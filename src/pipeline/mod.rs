// src/pipeline/mod.rs
use crate::config::{AppConfig, Lookups, SourceProfile};
use crate::extractors::{ScanReport, SectionScanner};
use crate::pages::{self, SourceDocument};
use crate::reconcile::{HierarchyBuilder, HierarchyModel, PlacedRow};
use crate::table::{self, FactKey, FactTable};
use crate::utils::error::{AppError, ConsistencyError};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Canonical table of one section of one source.
#[derive(Debug, Clone)]
pub struct SectionTable {
    pub section: String,
    pub output_suffix: String,
    pub table: FactTable,
}

/// Everything extracted from one source document.
#[derive(Debug, Clone)]
pub struct SourceExtract {
    pub name: String,
    pub tables: Vec<SectionTable>,
    /// Parent edges observed in this source's rows.
    pub hierarchy: HierarchyModel,
    pub pages: usize,
    pub failed_pages: usize,
}

impl SectionTable {
    /// Output name of this table under `base`, e.g. `hospital_ratios`.
    pub fn file_name(&self, base: &str) -> String {
        format!("{}_{}", base, self.output_suffix)
    }
}

impl SourceExtract {
    pub fn record_count(&self) -> usize {
        self.tables.iter().map(|t| t.table.len()).sum()
    }
}

/// Merged result of a run.
#[derive(Debug, Clone)]
pub struct Assembled {
    /// Per section, merged across sources.
    pub sections: Vec<SectionTable>,
    /// All sections and sources in one table.
    pub merged: FactTable,
    pub hierarchy: HierarchyModel,
    /// Measure -> materialized path; covers every measure in `merged`.
    pub paths: BTreeMap<String, String>,
}

/// Wide table from placed rows. Row order follows the document.
pub fn to_fact_table(placed: &[PlacedRow]) -> FactTable {
    let mut table = FactTable::new();
    for row in placed {
        let key = FactKey::new(row.entity.clone(), row.measure.clone());
        tracing::trace!(
            "{} / {} ({}) from page {}{}",
            row.entity,
            row.measure,
            row.source.category.as_deref().unwrap_or("uncategorized"),
            row.source.page + 1,
            row.source.unit.as_deref().map(|u| format!(", unit {}", u)).unwrap_or_default()
        );
        table.ensure_row(key.clone());
        for (period, value) in &row.source.cells {
            table.insert(key.clone(), *period, *value);
        }
    }
    table
}

/// Scans one document and reconciles each enabled section.
pub fn process_document(
    doc: &SourceDocument,
    config: &AppConfig,
    profile: &SourceProfile,
    lookups: &Lookups,
) -> Result<SourceExtract, ConsistencyError> {
    let enabled = config.enabled_sections(profile);
    let report: ScanReport = SectionScanner::new(profile, &config.sections, &enabled).scan(&doc.pages);
    let failed_pages = report.failed_pages().count();

    tracing::info!(
        "{}: scanned {} pages, {} rows ({} facts) from {} entities ({} failed pages)",
        doc.path.display(),
        doc.pages.len(),
        report.rows.len(),
        report.facts().len(),
        report.entity_count(),
        failed_pages
    );

    let builder = HierarchyBuilder::new(lookups);
    let mut hierarchy = HierarchyModel::new(lookups.path_delimiter.clone());
    let mut tables = Vec::with_capacity(enabled.len());

    for idx in enabled {
        let section = &config.sections[idx];
        let rows: Vec<_> = report
            .rows
            .iter()
            .filter(|r| r.section == section.name)
            .cloned()
            .collect();
        let placed = builder.build(&rows)?;
        hierarchy = hierarchy.overlay(&HierarchyModel::from_rows(&placed, lookups.path_delimiter.clone()));

        let table = to_fact_table(&placed);
        tracing::debug!("{} / {}: {} records", doc.name, section.name, table.len());
        tables.push(SectionTable {
            section: section.name.clone(),
            output_suffix: section.output_suffix.clone(),
            table,
        });
    }

    Ok(SourceExtract {
        name: doc.name.clone(),
        tables,
        hierarchy,
        pages: doc.pages.len(),
        failed_pages,
    })
}

/// Loads and processes every input document, one blocking task per document.
///
/// Results come back in input order. A document that cannot be read is
/// logged and skipped; a consistency violation stops the run.
pub async fn extract_documents(
    inputs: &[PathBuf],
    config: Arc<AppConfig>,
    profile: Arc<SourceProfile>,
    lookups: Arc<Lookups>,
) -> Result<Vec<SourceExtract>, AppError> {
    let mut set = JoinSet::new();

    for (idx, path) in inputs.iter().cloned().enumerate() {
        let config = Arc::clone(&config);
        let profile = Arc::clone(&profile);
        let lookups = Arc::clone(&lookups);
        set.spawn(async move {
            let result = match pages::load_document(&path).await {
                Ok(doc) => tokio::task::spawn_blocking(move || {
                    process_document(&doc, &config, &profile, &lookups).map_err(AppError::from)
                })
                .await
                .map_err(|e| AppError::Processing(format!("scan task failed: {}", e)))
                .and_then(|r| r),
                Err(e) => Err(AppError::from(e)),
            };
            (idx, path, result)
        });
    }

    let mut done: Vec<(usize, SourceExtract)> = Vec::with_capacity(inputs.len());
    let mut failure_count = 0;
    while let Some(joined) = set.join_next().await {
        let (idx, path, result) =
            joined.map_err(|e| AppError::Processing(format!("document task failed: {}", e)))?;
        match result {
            Ok(extract) => {
                tracing::info!(
                    "Extracted {} records from {} ({} pages)",
                    extract.record_count(),
                    path.display(),
                    extract.pages
                );
                done.push((idx, extract));
            }
            Err(AppError::Source(e)) => {
                tracing::error!("Failed to read {}: {}", path.display(), e);
                failure_count += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if done.is_empty() && failure_count > 0 {
        return Err(AppError::Processing(format!(
            "Failed to read any of {} source documents",
            failure_count
        )));
    }

    done.sort_by_key(|(idx, _)| *idx);
    Ok(done.into_iter().map(|(_, e)| e).collect())
}

/// Merges per-source tables per section, then across sections, and builds
/// the hierarchy model for the merged table.
pub fn assemble(
    extracts: &[SourceExtract],
    config: &AppConfig,
    lookups: &Lookups,
) -> Result<Assembled, ConsistencyError> {
    let mut sections = Vec::new();
    for spec in &config.sections {
        let inputs: Vec<FactTable> = extracts
            .iter()
            .flat_map(|e| e.tables.iter())
            .filter(|t| t.section == spec.name)
            .map(|t| t.table.clone())
            .collect();
        if inputs.is_empty() {
            continue;
        }
        sections.push(SectionTable {
            section: spec.name.clone(),
            output_suffix: spec.output_suffix.clone(),
            table: table::merge(&inputs),
        });
    }

    // The same (entity, measure) in two sections would silently share cells.
    let mut owner: HashMap<&FactKey, &str> = HashMap::new();
    for section in &sections {
        for row in section.table.rows() {
            if let Some(other) = owner.insert(&row.key, &section.section) {
                return Err(ConsistencyError::SectionCollision {
                    entity: row.key.entity.clone(),
                    measure: row.key.measure.clone(),
                    first_section: other.to_string(),
                    second_section: section.section.clone(),
                });
            }
        }
    }

    let merged = table::merge(
        &sections
            .iter()
            .map(|s| s.table.clone())
            .collect::<Vec<_>>(),
    );

    let declared = HierarchyModel::from_edges(
        lookups.statement_model.iter().cloned(),
        lookups.path_delimiter.clone(),
    );
    let hierarchy = extracts
        .iter()
        .fold(declared, |model, e| model.overlay(&e.hierarchy));
    let paths = hierarchy.paths()?;
    for measure in merged.measures() {
        if !paths.contains_key(measure) {
            tracing::warn!("'{}' has no place in the hierarchy", measure);
        }
    }
    tracing::debug!("Entities: {:?}", merged.entities());

    tracing::info!(
        "Merged {} sources: {} records from {} entities across {} periods, {} measures in hierarchy",
        extracts.len(),
        merged.len(),
        merged.entity_count(),
        merged.periods().len(),
        hierarchy.len()
    );

    Ok(Assembled {
        sections,
        merged,
        hierarchy,
        paths,
    })
}
