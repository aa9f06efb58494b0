// src/config/lookups.rs
use super::AppConfig;
use crate::utils::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct NameMappingRecord {
    #[serde(rename = "As Reported")]
    as_reported: String,
    #[serde(rename = "Standardized")]
    standardized: String,
}

#[derive(Debug, Deserialize)]
struct RenameRecord {
    #[serde(rename = "Measure Name")]
    measure: String,
    #[serde(rename = "Parent")]
    parent: Option<String>,
    #[serde(rename = "New Name")]
    new_name: String,
}

#[derive(Debug, Deserialize)]
struct ModelRecord {
    #[serde(rename = "Measure")]
    measure: String,
    #[serde(rename = "Parent")]
    parent: Option<String>,
}

/// Reconciliation tables. Built once, then shared by reference.
#[derive(Debug, Clone)]
pub struct Lookups {
    pub entity_names: HashMap<String, String>,
    pub measure_names: HashMap<String, String>,
    /// (measure, parent) -> disambiguated name. `None` parent means root.
    pub hierarchy_renames: HashMap<(String, Option<String>), String>,
    /// Declared financial statement model as (measure, parent) edges.
    pub statement_model: Vec<(String, Option<String>)>,
    pub total_labels: HashSet<String>,
    pub path_delimiter: String,
}

impl Default for Lookups {
    fn default() -> Self {
        Self {
            entity_names: HashMap::new(),
            measure_names: HashMap::new(),
            hierarchy_renames: HashMap::new(),
            statement_model: Vec::new(),
            total_labels: HashSet::new(),
            path_delimiter: "/".to_string(),
        }
    }
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ConfigError> {
    let csv_err = |source| ConfigError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);
    let mut out = Vec::new();
    for record in rdr.deserialize() {
        out.push(record.map_err(csv_err)?);
    }
    Ok(out)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn load_name_map(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let records: Vec<NameMappingRecord> = read_records(path)?;
    Ok(records
        .into_iter()
        .map(|r| (r.as_reported, r.standardized))
        .collect())
}

impl Lookups {
    pub fn load(config: &AppConfig) -> Result<Self, ConfigError> {
        let mut lookups = Lookups {
            total_labels: config.total_labels.iter().cloned().collect(),
            path_delimiter: config.path_delimiter.clone(),
            ..Lookups::default()
        };
        let paths = &config.lookups;

        if let Some(p) = &paths.entity_names {
            lookups.entity_names = load_name_map(&config.resolve(p))?;
        }
        if let Some(p) = &paths.measure_names {
            lookups.measure_names = load_name_map(&config.resolve(p))?;
        }
        if let Some(p) = &paths.hierarchy_renames {
            let records: Vec<RenameRecord> = read_records(&config.resolve(p))?;
            lookups.hierarchy_renames = records
                .into_iter()
                .map(|r| ((r.measure, non_empty(r.parent)), r.new_name))
                .collect();
        }
        if let Some(p) = &paths.statement_model {
            let records: Vec<ModelRecord> = read_records(&config.resolve(p))?;
            lookups.statement_model = records
                .into_iter()
                .map(|r| (r.measure, non_empty(r.parent)))
                .collect();
        }

        tracing::info!(
            "Loaded lookups: {} entity names, {} measure names, {} hierarchy renames, {} model edges",
            lookups.entity_names.len(),
            lookups.measure_names.len(),
            lookups.hierarchy_renames.len(),
            lookups.statement_model.len()
        );
        Ok(lookups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_all_tables() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("hospital_name_mappings.csv"),
            "As Reported,Standardized\nAcme Health Inc.,Acme Health\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("clean_measure_names.csv"),
            "As Reported,Standardized\nCash and cash equivalents,Cash and Cash Equivalents\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("reported_measure_hierarchy_renames.csv"),
            "Measure Name,Parent,New Name\nOther,Total Current Assets,Other Current Assets\nOther,,Other Root\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("financial_statement_model.csv"),
            "Measure,Parent\nTotal Unrestricted Assets,\nTotal Current Assets,Total Unrestricted Assets\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{
                "lookups": {
                    "entity_names": "hospital_name_mappings.csv",
                    "measure_names": "clean_measure_names.csv",
                    "hierarchy_renames": "reported_measure_hierarchy_renames.csv",
                    "statement_model": "financial_statement_model.csv"
                },
                "total_labels": ["Total Current Assets"]
            }"#,
        )
        .unwrap();

        let config = AppConfig::load(dir.path().join("config.json")).unwrap();
        let lookups = config.load_lookups().unwrap();

        assert_eq!(lookups.entity_names["Acme Health Inc."], "Acme Health");
        assert_eq!(
            lookups.measure_names["Cash and cash equivalents"],
            "Cash and Cash Equivalents"
        );
        assert_eq!(
            lookups.hierarchy_renames[&("Other".to_string(), Some("Total Current Assets".to_string()))],
            "Other Current Assets"
        );
        assert_eq!(
            lookups.hierarchy_renames[&("Other".to_string(), None)],
            "Other Root"
        );
        assert_eq!(
            lookups.statement_model,
            vec![
                ("Total Unrestricted Assets".to_string(), None),
                (
                    "Total Current Assets".to_string(),
                    Some("Total Unrestricted Assets".to_string())
                ),
            ]
        );
        assert!(lookups.total_labels.contains("Total Current Assets"));
    }

    #[test]
    fn test_missing_table_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{ "lookups": { "entity_names": "nope.csv" } }"#,
        )
        .unwrap();
        let config = AppConfig::load(dir.path().join("config.json")).unwrap();
        assert!(matches!(config.load_lookups(), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_malformed_table_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("names.csv"), "Wrong,Header\na,b\n").unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{ "lookups": { "measure_names": "names.csv" } }"#,
        )
        .unwrap();
        let config = AppConfig::load(dir.path().join("config.json")).unwrap();
        assert!(matches!(config.load_lookups(), Err(ConfigError::Csv { .. })));
    }
}
