// src/table/mod.rs
pub mod merge;
pub mod period;

pub use merge::merge;
pub use period::Period;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Row identity of the wide fact table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactKey {
    pub entity: String,
    pub measure: String,
}

impl FactKey {
    pub fn new(entity: impl Into<String>, measure: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            measure: measure.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub key: FactKey,
    /// A present `None` is an explicit missing-data marker from the source.
    pub values: BTreeMap<Period, Option<f64>>,
}

impl FactRow {
    /// Values laid out against `periods`; absent cells are `None`.
    pub fn cells(&self, periods: &[Period]) -> Vec<Option<f64>> {
        periods
            .iter()
            .map(|p| self.values.get(p).copied().flatten())
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct TableRepr {
    periods: Vec<Period>,
    rows: Vec<FactRow>,
}

/// Wide table keyed by (entity, measure) with one column per period.
///
/// Rows keep first-insertion order; columns are kept strictly ascending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "TableRepr", into = "TableRepr")]
pub struct FactTable {
    periods: Vec<Period>,
    rows: Vec<FactRow>,
    index: HashMap<FactKey, usize>,
}

impl From<TableRepr> for FactTable {
    fn from(repr: TableRepr) -> Self {
        let mut table = FactTable::new();
        for p in repr.periods {
            table.add_period(p);
        }
        for row in repr.rows {
            let FactRow { key, values } = row;
            for (period, value) in values {
                table.insert(key.clone(), period, value);
            }
            table.ensure_row(key);
        }
        table
    }
}

impl From<FactTable> for TableRepr {
    fn from(table: FactTable) -> Self {
        TableRepr {
            periods: table.periods,
            rows: table.rows,
        }
    }
}

impl PartialEq for FactTable {
    fn eq(&self, other: &Self) -> bool {
        self.periods == other.periods && self.rows == other.rows
    }
}

impl FactTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn rows(&self) -> &[FactRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn add_period(&mut self, period: Period) {
        if let Err(pos) = self.periods.binary_search(&period) {
            self.periods.insert(pos, period);
        }
    }

    /// Returns the row for `key`, creating an empty one at the end if needed.
    pub fn ensure_row(&mut self, key: FactKey) -> &mut FactRow {
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.rows.push(FactRow {
                    key: key.clone(),
                    values: BTreeMap::new(),
                });
                let idx = self.rows.len() - 1;
                self.index.insert(key, idx);
                idx
            }
        };
        &mut self.rows[idx]
    }

    /// Sets one cell and returns what was there before, if the cell existed.
    pub fn insert(&mut self, key: FactKey, period: Period, value: Option<f64>) -> Option<Option<f64>> {
        self.add_period(period);
        self.ensure_row(key).values.insert(period, value)
    }

    #[cfg(test)]
    pub fn row(&self, key: &FactKey) -> Option<&FactRow> {
        self.index.get(key).map(|&idx| &self.rows[idx])
    }

    pub fn contains(&self, key: &FactKey) -> bool {
        self.index.contains_key(key)
    }

    #[cfg(test)]
    pub fn get(&self, key: &FactKey, period: Period) -> Option<f64> {
        self.row(key)?.values.get(&period).copied().flatten()
    }

    /// Distinct entities in first-seen order.
    pub fn entities(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.rows
            .iter()
            .map(|r| r.key.entity.as_str())
            .filter(|e| seen.insert(*e))
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.key.entity.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn measures(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.key.measure.as_str()).collect()
    }

    /// Copy of the table keeping only rows whose measure passes `keep`.
    pub fn filter_measures<F>(&self, mut keep: F) -> FactTable
    where
        F: FnMut(&str) -> bool,
    {
        let mut out = FactTable::new();
        for p in &self.periods {
            out.add_period(*p);
        }
        for row in self.rows.iter().filter(|r| keep(&r.key.measure)) {
            out.ensure_row(row.key.clone()).values = row.values.clone();
        }
        out
    }
}
