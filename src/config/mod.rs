// src/config/mod.rs
pub mod lookups;

pub use lookups::Lookups;

use crate::utils::error::ConfigError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PROFILE: &str = "default";

/// Which normalizer a section's value tokens go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Percentages, day counts, multiples. Grouping commas are not stripped.
    Ratio,
    /// Dollar line items with `1,234` grouping and `$` signs.
    Dollar,
}

/// A declared section of the report, e.g. "RATIOS" or "DATA ELEMENTS".
#[derive(Debug, Clone, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    /// Line text that opens the section. Defaults to `name`.
    #[serde(default)]
    pub keyword: Option<String>,
    pub value_kind: ValueKind,
    /// File name suffix for this section's output table.
    pub output_suffix: String,
}

impl SectionSpec {
    pub fn keyword(&self) -> &str {
        self.keyword.as_deref().unwrap_or(&self.name)
    }
}

/// Scanning parameters for one family of source documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceProfile {
    /// Line of each page that carries the entity name.
    pub entity_line_index: usize,
    pub continuation_marker: String,
    /// Prefix of period header lines.
    pub period_marker: String,
    /// Expected number of value columns per data row.
    pub period_count: usize,
    /// First period assumed until a period header is seen.
    pub first_period: i32,
    pub sentinels: Vec<String>,
    pub unit_words: Vec<String>,
    /// Data rows whose name contains one of these are layout artifacts.
    pub noise_markers: Vec<String>,
    /// Sections to extract by name. Empty means every declared section.
    pub sections: Vec<String>,
    /// Re-insert whitespace lost by the text layer ("Total Margin6.94%12.47%").
    pub split_glued_values: bool,
}

impl Default for SourceProfile {
    fn default() -> Self {
        Self {
            entity_line_index: 0,
            continuation_marker: "(continued)".to_string(),
            period_marker: "FY ".to_string(),
            period_count: 5,
            first_period: 2020,
            sentinels: ["-", "\u{2014}", "N/A", "n/a", "NA", "(cid:132)"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            unit_words: ["rate", "days", "years", "%", "times"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            noise_markers: ["FY ", "Units", "Consolidated"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sections: Vec::new(),
            split_glued_values: false,
        }
    }
}

/// File locations of the reconciliation tables. Relative paths resolve
/// against the config file's directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LookupPaths {
    pub entity_names: Option<PathBuf>,
    pub measure_names: Option<PathBuf>,
    pub hierarchy_renames: Option<PathBuf>,
    pub statement_model: Option<PathBuf>,
}

fn default_delimiter() -> String {
    "/".to_string()
}

fn default_entity_column() -> String {
    "Hospital".to_string()
}

fn default_sections() -> Vec<SectionSpec> {
    vec![
        SectionSpec {
            name: "RATIOS".to_string(),
            keyword: None,
            value_kind: ValueKind::Ratio,
            output_suffix: "ratios".to_string(),
        },
        SectionSpec {
            name: "DATA ELEMENTS".to_string(),
            keyword: None,
            value_kind: ValueKind::Dollar,
            output_suffix: "dollar_elements".to_string(),
        },
    ]
}

/// Run configuration, loaded once at startup and treated as immutable.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub lookups: LookupPaths,
    /// Measures that open a new subtree ("Total Unrestricted Assets", ...).
    #[serde(default)]
    pub total_labels: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub path_delimiter: String,
    /// Header of the entity column in written tables.
    #[serde(default = "default_entity_column")]
    pub entity_column: String,
    #[serde(default = "default_sections")]
    pub sections: Vec<SectionSpec>,
    #[serde(default)]
    pub profiles: BTreeMap<String, SourceProfile>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lookups: LookupPaths::default(),
            total_labels: Vec::new(),
            path_delimiter: default_delimiter(),
            entity_column: default_entity_column(),
            sections: default_sections(),
            profiles: BTreeMap::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    /// Reads and validates a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.validate()?;
        tracing::debug!(
            "Loaded config {} ({} sections, {} profiles)",
            path.display(),
            config.sections.len(),
            config.profiles.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sections.is_empty() {
            return Err(ConfigError::Invalid("no sections declared".to_string()));
        }
        if self.path_delimiter.is_empty() {
            return Err(ConfigError::Invalid("path_delimiter is empty".to_string()));
        }
        let mut names = HashSet::new();
        for section in &self.sections {
            if !names.insert(section.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "section '{}' declared twice",
                    section.name
                )));
            }
        }
        for (name, profile) in &self.profiles {
            if profile.period_count == 0 {
                return Err(ConfigError::Invalid(format!(
                    "profile '{}' has period_count 0",
                    name
                )));
            }
            for section in &profile.sections {
                if !names.contains(section.as_str()) {
                    return Err(ConfigError::UnknownSection(section.clone()));
                }
            }
        }
        Ok(())
    }

    /// Looks up a source profile; the built-in defaults answer to "default".
    pub fn profile(&self, name: &str) -> Result<SourceProfile, ConfigError> {
        match self.profiles.get(name) {
            Some(profile) => Ok(profile.clone()),
            None if name == DEFAULT_PROFILE => Ok(SourceProfile::default()),
            None => Err(ConfigError::UnknownProfile(name.to_string())),
        }
    }

    /// Indices into `sections` the profile extracts.
    pub fn enabled_sections(&self, profile: &SourceProfile) -> Vec<usize> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| profile.sections.is_empty() || profile.sections.contains(&s.name))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Loads every configured lookup table. Any missing or malformed file fails the run.
    pub fn load_lookups(&self) -> Result<Lookups, ConfigError> {
        Lookups::load(self)
    }
}
