// src/extractors/scanner.rs
use super::line::{LineClassifier, LineKind};
use crate::config::{SectionSpec, SourceProfile};
use crate::pages::Page;
use crate::table::Period;
use crate::utils::error::ExtractError;
use std::collections::BTreeSet;

// --- Data Structures ---

/// One data row as scanned, before any reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub entity: String,
    /// Name of the declared section the row was found in.
    pub section: String,
    pub category: Option<String>,
    pub measure: String,
    pub unit: Option<String>,
    /// Only the columns that had a token on the line, in line order.
    pub cells: Vec<(Period, Option<f64>)>,
    pub page: usize,
}

/// (entity, measure, period) -> value, as reported.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFact {
    pub entity: String,
    pub measure: String,
    pub period: Period,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageStatus {
    /// No text on the page.
    Empty,
    Scanned { rows: usize },
    /// Rows accepted before the failure stay in the report.
    Failed { reason: ExtractError, rows_kept: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub index: usize,
    pub status: PageStatus,
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub rows: Vec<ExtractedRow>,
    pub pages: Vec<PageOutcome>,
}

impl ScanReport {
    /// Flattens rows into facts in document encounter order.
    pub fn facts(&self) -> Vec<RawFact> {
        self.rows
            .iter()
            .flat_map(|row| {
                row.cells.iter().map(move |(period, value)| RawFact {
                    entity: row.entity.clone(),
                    measure: row.measure.clone(),
                    period: *period,
                    value: *value,
                })
            })
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.entity.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn failed_pages(&self) -> impl Iterator<Item = &PageOutcome> {
        self.pages
            .iter()
            .filter(|p| matches!(p.status, PageStatus::Failed { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    SeekingSection,
    InSection(usize),
}

/// Splits "Acme Health (continued)" into ("Acme Health", true).
fn split_continuation<'h>(header: &'h str, marker: &str) -> (&'h str, bool) {
    let header = header.trim();
    if !marker.is_empty() && header.len() >= marker.len() {
        let split = header.len() - marker.len();
        if header.is_char_boundary(split) && header[split..].eq_ignore_ascii_case(marker) {
            return (header[..split].trim_end(), true);
        }
    }
    (header, false)
}

// --- Page-State Machine ---

/// Walks the pages of one source document and collects data rows.
///
/// Entity identity carries over continuation pages; a section stays open
/// across a page break only while the same entity continues.
pub struct SectionScanner<'a> {
    profile: &'a SourceProfile,
    sections: &'a [SectionSpec],
    enabled: Vec<bool>,
    classifiers: Vec<LineClassifier>,
    state: ScanState,
    current_entity: Option<String>,
    category: Option<String>,
    periods: Vec<Period>,
}

impl<'a> SectionScanner<'a> {
    /// `enabled` lists indices into `sections` whose rows are collected.
    /// The other declared sections are still recognised as boundaries.
    pub fn new(profile: &'a SourceProfile, sections: &'a [SectionSpec], enabled: &[usize]) -> Self {
        Self {
            profile,
            sections,
            enabled: (0..sections.len()).map(|i| enabled.contains(&i)).collect(),
            classifiers: sections
                .iter()
                .map(|s| LineClassifier::new(profile, s.value_kind))
                .collect(),
            state: ScanState::SeekingSection,
            current_entity: None,
            category: None,
            periods: Period::sequence(Period(profile.first_period), profile.period_count.max(1)),
        }
    }

    pub fn scan(mut self, pages: &[Page]) -> ScanReport {
        let mut report = ScanReport::default();

        for page in pages {
            let status = if page.text.trim().is_empty() {
                tracing::trace!("Page {} is empty", page.number());
                PageStatus::Empty
            } else {
                let before = report.rows.len();
                match self.scan_page(page, &mut report.rows) {
                    Ok(()) => PageStatus::Scanned {
                        rows: report.rows.len() - before,
                    },
                    Err(e) => {
                        tracing::warn!("Error processing page {}: {}", page.number(), e);
                        PageStatus::Failed {
                            reason: e,
                            rows_kept: report.rows.len() - before,
                        }
                    }
                }
            };
            report.pages.push(PageOutcome {
                index: page.index,
                status,
            });
        }

        report
    }

    fn scan_page(&mut self, page: &Page, rows: &mut Vec<ExtractedRow>) -> Result<(), ExtractError> {
        let lines: Vec<&str> = page
            .text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let header_idx = self.profile.entity_line_index;
        let header = lines
            .get(header_idx)
            .ok_or(ExtractError::MissingHeader(header_idx))?;
        let entity = self.enter_page(header)?.to_string();

        for line in &lines[header_idx + 1..] {
            if let Some(section) = self.match_section(line) {
                tracing::debug!(
                    "Page {}: entering section {}",
                    page.number(),
                    self.sections[section].name
                );
                self.state = ScanState::InSection(section);
                self.category = None;
                continue;
            }

            let ScanState::InSection(section) = self.state else {
                continue;
            };
            if !self.enabled[section] {
                continue;
            }

            match self.classifiers[section].classify(line, self.periods.len()) {
                LineKind::PeriodHeader(declared) => {
                    self.periods = self.resolve_periods(declared)?;
                    tracing::debug!("Page {}: periods now {:?}", page.number(), self.periods);
                }
                LineKind::CategoryHeader(category) => {
                    self.category = Some(category);
                }
                LineKind::DataRow(row) => {
                    let cells = self
                        .periods
                        .iter()
                        .copied()
                        .zip(row.values)
                        .take(row.observed)
                        .collect();
                    rows.push(ExtractedRow {
                        entity: entity.clone(),
                        section: self.sections[section].name.clone(),
                        category: self.category.clone(),
                        measure: row.name,
                        unit: row.unit,
                        cells,
                        page: page.index,
                    });
                }
                LineKind::Unparseable(reason) => {
                    tracing::debug!("Page {}: skipping '{}' ({})", page.number(), line, reason);
                }
                LineKind::Skip(reason) => {
                    tracing::trace!("Page {}: skip {:?} '{}'", page.number(), reason, line);
                }
            }
        }

        Ok(())
    }

    /// Applies the page header to the entity state and returns the active entity.
    ///
    /// A header naming the active entity, marked as continued or not, leaves
    /// any open section open.
    fn enter_page<'h>(&mut self, header: &'h str) -> Result<&'h str, ExtractError> {
        let (label, continuation) = split_continuation(header, &self.profile.continuation_marker);
        if label.is_empty() {
            return Err(ExtractError::NoEntity(header.to_string()));
        }

        if self.current_entity.as_deref() == Some(label) {
            tracing::trace!("Page continues {} ({:?})", label, self.state);
            return Ok(label);
        }

        if continuation {
            tracing::warn!(
                "Continuation header for '{}' does not follow that entity (active: {:?})",
                label,
                self.current_entity
            );
        } else {
            tracing::info!("Processing {}", label);
        }
        self.current_entity = Some(label.to_string());
        self.state = ScanState::SeekingSection;
        self.category = None;
        Ok(label)
    }

    fn match_section(&self, line: &str) -> Option<usize> {
        if let Some(idx) = self.sections.iter().position(|s| line == s.keyword()) {
            return Some(idx);
        }
        if line.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        self.sections.iter().position(|s| line.contains(s.keyword()))
    }

    /// Declared periods replace the current ones; a short declaration is
    /// extended by counting up from its last period.
    fn resolve_periods(&self, mut declared: Vec<Period>) -> Result<Vec<Period>, ExtractError> {
        let width = self.profile.period_count.max(declared.len());
        while declared.len() < width {
            let last = declared
                .last()
                .copied()
                .unwrap_or(Period(self.profile.first_period - 1));
            declared.push(last.next().ok_or(ExtractError::PeriodOverflow(last.year()))?);
        }
        Ok(declared)
    }
}
