// src/storage/mod.rs
use crate::reconcile::HierarchyModel;
use crate::table::{FactKey, FactTable, Period};
use crate::utils::error::StorageError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const MEASURE_COLUMN: &str = "Measure";

/// Describes a saved table in the metadata file.
#[derive(Debug, Clone)]
pub struct TableInfo<'a> {
    pub source: &'a str,
    pub section: &'a str,
    pub pages: usize,
    pub failed_pages: usize,
}

pub struct StorageManager {
    base_dir: PathBuf,
    entity_column: String,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P, entity_column: &str) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self {
            base_dir: base_path,
            entity_column: entity_column.to_string(),
        })
    }

    /// Writes the wide table as `<name>.csv`. Missing cells are left empty.
    pub fn save_table(&self, name: &str, table: &FactTable) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(format!("{}.csv", name));
        write_fact_table(&file_path, table, &self.entity_column)?;
        tracing::info!("Saved {} records to {}", table.len(), file_path.display());
        Ok(file_path)
    }

    /// Binary copy of the table for fast reloads.
    pub fn save_table_binary(&self, name: &str, table: &FactTable) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(format!("{}.bin", name));

        // Encode through the table's serde repr (periods + rows)
        let bytes = bincode::serde::encode_to_vec(table, bincode::config::standard())
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, bytes).map_err(StorageError::IoError)?;

        tracing::info!("Saved binary table to {}", file_path.display());
        Ok(file_path)
    }

    /// Saves metadata about the table in JSON format
    pub fn save_table_metadata(
        &self,
        name: &str,
        table: &FactTable,
        info: &TableInfo<'_>,
    ) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(format!("{}_meta.json", name));

        // Create metadata structure
        let metadata = serde_json::json!({
            "source": info.source,
            "section": info.section,
            "record_count": table.len(),
            "entity_count": table.entity_count(),
            "periods": table.periods().iter().map(|p| p.year()).collect::<Vec<_>>(),
            "pages": info.pages,
            "failed_pages": info.failed_pages,
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        // Write the metadata to the file
        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&file_path, metadata_str).map_err(StorageError::IoError)?;

        tracing::info!("Saved metadata to {}", file_path.display());
        Ok(file_path)
    }

    /// Writes `Measure,Parent,Path` for every measure with a resolved path.
    pub fn save_hierarchy(
        &self,
        name: &str,
        model: &HierarchyModel,
        paths: &BTreeMap<String, String>,
    ) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(format!("{}.csv", name));
        let mut writer = csv::Writer::from_path(&file_path)?;
        writer.write_record([MEASURE_COLUMN, "Parent", "Path"])?;

        // Roots get an empty Parent cell
        for (measure, parent) in model.edges() {
            if let Some(path) = paths.get(measure) {
                writer.write_record([measure, parent.unwrap_or(""), path.as_str()])?;
            }
        }
        writer.flush().map_err(StorageError::IoError)?;

        tracing::info!("Saved hierarchy of {} measures to {}", paths.len(), file_path.display());
        Ok(file_path)
    }
}

fn format_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn write_fact_table(path: &Path, table: &FactTable, entity_column: &str) -> Result<(), StorageError> {
    let mut writer = csv::Writer::from_path(path)?;

    // Header: entity, measure, then one column per period in ascending order
    let mut header = vec![entity_column.to_string(), MEASURE_COLUMN.to_string()];
    header.extend(table.periods().iter().map(|p| p.to_string()));
    writer.write_record(&header)?;

    // Rows in insertion order; null cells stay empty
    for row in table.rows() {
        let mut record = vec![row.key.entity.clone(), row.key.measure.clone()];
        record.extend(row.cells(table.periods()).into_iter().map(format_cell));
        writer.write_record(&record)?;
    }

    writer.flush().map_err(StorageError::IoError)?;
    Ok(())
}

/// Reads a wide table written by `write_fact_table` or by hand.
///
/// The first two columns are entity and measure whatever their headers say.
/// Period headers may carry an "FY " prefix; columns come back sorted.
pub fn read_fact_table(path: &Path) -> Result<FactTable, StorageError> {
    let malformed = |reason: String| StorageError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    // Index columns first, then period columns
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(malformed(format!("expected entity and measure columns, found {}", headers.len())));
    }

    let periods = headers
        .iter()
        .skip(2)
        .map(|h| Period::parse(h).ok_or_else(|| malformed(format!("'{}' is not a period", h))))
        .collect::<Result<Vec<_>, _>>()?;

    // add_period keeps the columns sorted whatever the file order
    let mut table = FactTable::new();
    for period in &periods {
        table.add_period(*period);
    }

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let key = FactKey::new(
            record.get(0).unwrap_or_default(),
            record.get(1).unwrap_or_default(),
        );
        if table.contains(&key) {
            return Err(malformed(format!(
                "duplicate row for '{}' / '{}'",
                key.entity, key.measure
            )));
        }
        table.ensure_row(key.clone());

        // Empty cells are nulls; anything else must parse as a number
        for (period, cell) in periods.iter().zip(record.iter().skip(2)) {
            let value = if cell.is_empty() {
                None
            } else {
                Some(cell.parse::<f64>().map_err(|_| {
                    malformed(format!("row {}: '{}' is not a number", line + 2, cell))
                })?)
            };
            table.insert(key.clone(), *period, value);
        }
    }

    tracing::debug!("Read {} records from {}", table.len(), path.display());
    Ok(table)
}

pub fn load_table_binary(path: &Path) -> Result<FactTable, StorageError> {
    let bytes = fs::read(path).map_err(StorageError::IoError)?;
    let (table, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    Ok(table)
}
