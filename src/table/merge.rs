// src/table/merge.rs
use super::FactTable;

/// Outer-joins `tables` on (entity, measure) into one wide table.
///
/// Columns are the union of all periods in ascending order and cells no
/// input supplies stay `None`. Period ranges may be disjoint or have gaps.
/// When two inputs both carry a value for a cell, the later input's non-null
/// value is kept.
pub fn merge(tables: &[FactTable]) -> FactTable {
    let mut merged = FactTable::new();

    for (source_idx, table) in tables.iter().enumerate() {
        for period in table.periods() {
            merged.add_period(*period);
        }
        for row in table.rows() {
            let target = merged.ensure_row(row.key.clone());
            for (period, value) in &row.values {
                match (target.values.get(period).copied().flatten(), value) {
                    (Some(old), Some(new)) if (old - new).abs() > f64::EPSILON => {
                        tracing::warn!(
                            "Restated value for {} / {} / {}: {} -> {} (source #{})",
                            row.key.entity, row.key.measure, period, old, new, source_idx + 1
                        );
                        target.values.insert(*period, Some(*new));
                    }
                    (Some(_), None) => {}
                    _ => {
                        target.values.insert(*period, *value);
                    }
                }
            }
        }
    }

    tracing::debug!(
        "Merged {} tables into {} rows x {} periods",
        tables.len(),
        merged.len(),
        merged.periods().len()
    );
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{FactKey, Period};

    fn single(entity: &str, measure: &str, period: i32, value: f64) -> FactTable {
        let mut t = FactTable::new();
        t.insert(FactKey::new(entity, measure), Period(period), Some(value));
        t
    }

    #[test]
    fn test_disjoint_entities_fill_cross_cells_with_null() {
        let a = single("Acme Health", "Total Margin", 2023, 6.94);
        let b = single("Birch Hospital", "Total Margin", 2024, 3.5);
        let merged = merge(&[a.clone(), b.clone()]);

        assert_eq!(merged.len(), a.len() + b.len());
        assert_eq!(merged.periods(), &[Period(2023), Period(2024)]);
        let acme = FactKey::new("Acme Health", "Total Margin");
        let birch = FactKey::new("Birch Hospital", "Total Margin");
        assert_eq!(merged.get(&acme, Period(2023)), Some(6.94));
        assert_eq!(merged.get(&acme, Period(2024)), None);
        assert_eq!(merged.get(&birch, Period(2023)), None);
        assert_eq!(
            merged.row(&birch).unwrap().cells(merged.periods()),
            vec![None, Some(3.5)]
        );
    }

    #[test]
    fn test_non_contiguous_ranges_sorted_chronologically() {
        let late = single("A", "Cash", 2022, 3.0);
        let early = single("A", "Cash", 2006, 1.0);
        let mid = single("A", "Cash", 2012, 2.0);
        let merged = merge(&[late, early, mid]);
        assert_eq!(merged.periods(), &[Period(2006), Period(2012), Period(2022)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged.rows()[0].cells(merged.periods()),
            vec![Some(1.0), Some(2.0), Some(3.0)]
        );
    }

    #[test]
    fn test_later_value_wins_but_null_never_erases() {
        let first = single("A", "Cash", 2020, 1.0);
        let restated = single("A", "Cash", 2020, 1.5);
        let mut blank = FactTable::new();
        blank.insert(FactKey::new("A", "Cash"), Period(2020), None);

        let merged = merge(&[first, restated, blank]);
        assert_eq!(merged.get(&FactKey::new("A", "Cash"), Period(2020)), Some(1.5));
    }

    #[test]
    fn test_empty_input() {
        let merged = merge(&[]);
        assert!(merged.is_empty());
        assert!(merged.periods().is_empty());
    }
}
