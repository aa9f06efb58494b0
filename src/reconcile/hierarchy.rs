// src/reconcile/hierarchy.rs
use super::names::NameReconciler;
use crate::config::Lookups;
use crate::extractors::ExtractedRow;
use crate::utils::error::ConsistencyError;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A scanned row with canonical names and its parent in the statement tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedRow {
    pub entity: String,
    pub measure: String,
    pub parent: Option<String>,
    pub source: ExtractedRow,
}

/// Assigns parents from document order and makes measure names unique.
pub struct HierarchyBuilder<'a> {
    lookups: &'a Lookups,
    names: NameReconciler<'a>,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(lookups: &'a Lookups) -> Self {
        Self {
            lookups,
            names: NameReconciler::new(lookups),
        }
    }

    fn rename(&self, measure: &str, parent: Option<&str>) -> String {
        self.lookups
            .hierarchy_renames
            .get(&(measure.to_string(), parent.map(str::to_string)))
            .cloned()
            .unwrap_or_else(|| measure.to_string())
    }

    /// Places the rows of a whole source, one entity at a time.
    /// Entities keep the order of their first row.
    pub fn build(&self, rows: &[ExtractedRow]) -> Result<Vec<PlacedRow>, ConsistencyError> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&ExtractedRow>> = HashMap::new();
        for row in rows {
            let entity = self.names.entity(&row.entity);
            groups
                .entry(entity)
                .or_insert_with(|| {
                    order.push(entity);
                    Vec::new()
                })
                .push(row);
        }

        let mut placed = Vec::with_capacity(rows.len());
        for entity in order {
            placed.extend(self.place_entity(&groups[entity])?);
        }
        Ok(placed)
    }

    /// Places one entity's rows, given in document order.
    ///
    /// A total label becomes a root and the parent of every following
    /// non-total row until the next total. Renames keyed by (measure, parent)
    /// run after parent assignment. Fails if two rows end up with the same
    /// canonical measure.
    pub fn place_entity(&self, rows: &[&ExtractedRow]) -> Result<Vec<PlacedRow>, ConsistencyError> {
        let mut current_parent: Option<String> = None;
        let mut seen: HashMap<String, Option<String>> = HashMap::new();
        let mut placed = Vec::with_capacity(rows.len());

        for row in rows {
            let (entity, canonical) = self.names.reconcile(&row.entity, &row.measure);

            let (measure, parent) = if self.lookups.total_labels.contains(&canonical) {
                let renamed = self.rename(&canonical, None);
                current_parent = Some(renamed.clone());
                (renamed, None)
            } else {
                let parent = current_parent.clone();
                (self.rename(&canonical, parent.as_deref()), parent)
            };

            if let Some(first_parent) = seen.get(&measure) {
                return Err(ConsistencyError::DuplicateMeasure {
                    entity,
                    measure,
                    first_parent: first_parent.clone(),
                    second_parent: parent,
                });
            }
            seen.insert(measure.clone(), parent.clone());

            if measure != row.measure {
                tracing::trace!("{}: '{}' -> '{}' (parent {:?})", entity, row.measure, measure, parent);
            }
            placed.push(PlacedRow {
                entity,
                measure,
                parent,
                source: (*row).clone(),
            });
        }

        Ok(placed)
    }
}

/// Measure -> parent edges with materialized path derivation.
#[derive(Debug, Clone)]
pub struct HierarchyModel {
    parents: BTreeMap<String, Option<String>>,
    delimiter: String,
}

impl HierarchyModel {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            parents: BTreeMap::new(),
            delimiter: delimiter.into(),
        }
    }

    /// Builds a model from declared edges. A repeated measure keeps its first parent.
    pub fn from_edges<I>(edges: I, delimiter: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        let mut model = Self::new(delimiter);
        for (measure, parent) in edges {
            if !model.insert(measure.clone(), parent) {
                tracing::warn!("Statement model lists '{}' more than once; keeping first parent", measure);
            }
        }
        model
    }

    /// Edges observed while placing rows. The first parent seen for a measure wins.
    pub fn from_rows(rows: &[PlacedRow], delimiter: impl Into<String>) -> Self {
        let mut model = Self::new(delimiter);
        for row in rows {
            if let Some(existing) = model.parents.get(&row.measure) {
                if *existing != row.parent {
                    tracing::debug!(
                        "'{}' has parent {:?} for {} but {:?} elsewhere",
                        row.measure, row.parent, row.entity, existing
                    );
                }
                continue;
            }
            model.insert(row.measure.clone(), row.parent.clone());
        }
        model
    }

    /// Adds an edge unless the measure is already present.
    pub fn insert(&mut self, measure: String, parent: Option<String>) -> bool {
        if self.parents.contains_key(&measure) {
            return false;
        }
        self.parents.insert(measure, parent);
        true
    }

    /// Declared edges first; `other` only fills in measures this model lacks.
    pub fn overlay(&self, other: &HierarchyModel) -> HierarchyModel {
        let mut out = self.clone();
        for (measure, parent) in &other.parents {
            out.insert(measure.clone(), parent.clone());
        }
        out
    }

    #[cfg(test)]
    pub fn parent(&self, measure: &str) -> Option<&str> {
        self.parents.get(measure)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.parents.iter().map(|(m, p)| (m.as_str(), p.as_deref()))
    }

    /// Materialized root-to-leaf path for every measure.
    ///
    /// A self-parent or a parent absent from the model ends the walk at that
    /// node. Each node is resolved once; a true cycle is an error.
    pub fn paths(&self) -> Result<BTreeMap<String, String>, ConsistencyError> {
        let mut memo: HashMap<&str, String> = HashMap::with_capacity(self.parents.len());

        for start in self.parents.keys() {
            if memo.contains_key(start.as_str()) {
                continue;
            }

            let mut chain: Vec<&str> = Vec::new();
            let mut on_chain: HashSet<&str> = HashSet::new();
            let mut current: &str = start;

            let mut prefix: Option<String> = loop {
                if let Some(path) = memo.get(current) {
                    break Some(path.clone());
                }
                if !on_chain.insert(current) {
                    let mut cycle: Vec<String> = chain.iter().map(|s| s.to_string()).collect();
                    cycle.push(current.to_string());
                    return Err(ConsistencyError::Cycle { chain: cycle });
                }
                chain.push(current);

                match self.parents.get(current) {
                    Some(Some(parent)) if parent != current && self.parents.contains_key(parent) => {
                        current = parent.as_str();
                    }
                    Some(Some(parent)) if parent != current => {
                        tracing::debug!("Parent '{}' of '{}' is not in the model", parent, current);
                        break None;
                    }
                    _ => break None,
                }
            };

            for node in chain.iter().rev() {
                let path = match &prefix {
                    Some(p) => format!("{}{}{}", p, self.delimiter, node),
                    None => node.to_string(),
                };
                memo.insert(*node, path.clone());
                prefix = Some(path);
            }
        }

        Ok(memo
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect())
    }

    /// Measures whose path is one of `roots` or lies beneath one.
    pub fn subtree(paths: &BTreeMap<String, String>, roots: &[String], delimiter: &str) -> BTreeSet<String> {
        paths
            .iter()
            .filter(|(_, path)| {
                roots.iter().any(|root| {
                    *path == root
                        || path
                            .strip_prefix(root.as_str())
                            .is_some_and(|rest| rest.starts_with(delimiter))
                })
            })
            .map(|(measure, _)| measure.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Period;

    fn row(entity: &str, measure: &str) -> ExtractedRow {
        ExtractedRow {
            entity: entity.to_string(),
            section: "DATA ELEMENTS".to_string(),
            category: None,
            measure: measure.to_string(),
            unit: None,
            cells: vec![(Period(2024), Some(1.0))],
            page: 0,
        }
    }

    fn lookups() -> Lookups {
        let mut l = Lookups::default();
        for t in ["Total Current Assets", "Total Current Liabilities"] {
            l.total_labels.insert(t.to_string());
        }
        l.hierarchy_renames.insert(
            ("Other".to_string(), Some("Total Current Assets".to_string())),
            "Other Current Assets".to_string(),
        );
        l.hierarchy_renames.insert(
            ("Other".to_string(), Some("Total Current Liabilities".to_string())),
            "Other Current Liabilities".to_string(),
        );
        l
    }

    fn edges(model: &HierarchyModel) -> Vec<(String, Option<String>)> {
        model
            .edges()
            .map(|(m, p)| (m.to_string(), p.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_parents_follow_totals_in_document_order() {
        let l = lookups();
        let rows = vec![
            row("Acme", "Net Revenue"),
            row("Acme", "Total Current Assets"),
            row("Acme", "Cash"),
            row("Acme", "Total Current Liabilities"),
            row("Acme", "Accounts Payable"),
        ];
        let placed = HierarchyBuilder::new(&l).build(&rows).unwrap();
        let parents: Vec<(&str, Option<&str>)> = placed
            .iter()
            .map(|p| (p.measure.as_str(), p.parent.as_deref()))
            .collect();
        assert_eq!(
            parents,
            vec![
                ("Net Revenue", None),
                ("Total Current Assets", None),
                ("Cash", Some("Total Current Assets")),
                ("Total Current Liabilities", None),
                ("Accounts Payable", Some("Total Current Liabilities")),
            ]
        );
    }

    #[test]
    fn test_ambiguous_names_resolved_by_rename_table() {
        let l = lookups();
        let rows = vec![
            row("Acme", "Total Current Assets"),
            row("Acme", "Other"),
            row("Acme", "Total Current Liabilities"),
            row("Acme", "Other"),
        ];
        let placed = HierarchyBuilder::new(&l).build(&rows).unwrap();
        assert_eq!(placed[1].measure, "Other Current Assets");
        assert_eq!(placed[3].measure, "Other Current Liabilities");
        assert_eq!(placed[3].source.measure, "Other");
        assert_eq!(placed.len(), rows.len());
    }

    #[test]
    fn test_unresolved_collision_is_fatal() {
        let mut l = lookups();
        l.hierarchy_renames.clear();
        let rows = vec![
            row("Acme", "Total Current Assets"),
            row("Acme", "Other"),
            row("Acme", "Total Current Liabilities"),
            row("Acme", "Other"),
        ];
        let err = HierarchyBuilder::new(&l).build(&rows).unwrap_err();
        assert_eq!(
            err,
            ConsistencyError::DuplicateMeasure {
                entity: "Acme".to_string(),
                measure: "Other".to_string(),
                first_parent: Some("Total Current Assets".to_string()),
                second_parent: Some("Total Current Liabilities".to_string()),
            }
        );
    }

    #[test]
    fn test_register_resets_per_entity_and_names_are_canonical() {
        let mut l = lookups();
        l.entity_names.insert("ACME".to_string(), "Acme".to_string());
        l.measure_names.insert("Cash & equivalents".to_string(), "Cash".to_string());
        let rows = vec![
            row("ACME", "Total Current Assets"),
            row("Birch", "Cash & equivalents"),
            row("Acme", "Cash"),
        ];
        let placed = HierarchyBuilder::new(&l).build(&rows).unwrap();
        assert_eq!(placed.len(), 3);
        assert_eq!(placed[0].entity, "Acme");
        assert_eq!(placed[1].entity, "Acme");
        assert_eq!(placed[1].parent.as_deref(), Some("Total Current Assets"));
        assert_eq!(placed[2].entity, "Birch");
        assert_eq!(placed[2].measure, "Cash");
        assert_eq!(placed[2].parent, None);
    }

    #[test]
    fn test_paths_through_chain() {
        let model = HierarchyModel::from_edges(
            vec![
                ("Total Unrestricted Assets".to_string(), None),
                ("Total Current Assets".to_string(), Some("Total Unrestricted Assets".to_string())),
                ("Cash".to_string(), Some("Total Current Assets".to_string())),
            ],
            "/",
        );
        let paths = model.paths().unwrap();
        assert_eq!(
            paths["Cash"],
            "Total Unrestricted Assets/Total Current Assets/Cash"
        );
        assert_eq!(paths["Total Unrestricted Assets"], "Total Unrestricted Assets");
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_self_and_missing_parents_terminate() {
        let model = HierarchyModel::from_edges(
            vec![
                ("Loop".to_string(), Some("Loop".to_string())),
                ("Child".to_string(), Some("Loop".to_string())),
                ("Orphan".to_string(), Some("Nowhere".to_string())),
            ],
            "/",
        );
        let paths = model.paths().unwrap();
        assert_eq!(paths["Loop"], "Loop");
        assert_eq!(paths["Child"], "Loop/Child");
        assert_eq!(paths["Orphan"], "Orphan");
    }

    #[test]
    fn test_true_cycle_is_detected() {
        let model = HierarchyModel::from_edges(
            vec![
                ("A".to_string(), Some("B".to_string())),
                ("B".to_string(), Some("A".to_string())),
            ],
            "/",
        );
        match model.paths() {
            Err(ConsistencyError::Cycle { chain }) => {
                assert_eq!(chain.first(), chain.last());
                assert_eq!(chain.len(), 3);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_paths_bounded_and_acyclic_for_adversarial_models() {
        // long chain, fan-out and self-parent mixed
        let mut edges = vec![("n0".to_string(), Some("n0".to_string()))];
        for i in 1..50 {
            edges.push((format!("n{}", i), Some(format!("n{}", i - 1))));
            edges.push((format!("leaf{}", i), Some(format!("n{}", i))));
        }
        let model = HierarchyModel::from_edges(edges, "/");
        let paths = model.paths().unwrap();
        assert_eq!(paths.len(), model.len());
        for path in paths.values() {
            let segments: Vec<&str> = path.split('/').collect();
            assert!(segments.len() <= model.len());
            let unique: HashSet<&str> = segments.iter().copied().collect();
            assert_eq!(unique.len(), segments.len(), "revisited node in {}", path);
            assert_eq!(segments[0], "n0");
        }
    }

    #[test]
    fn test_overlay_prefers_declared_edges() {
        let declared = HierarchyModel::from_edges(
            vec![("Cash".to_string(), Some("Total Current Assets".to_string()))],
            "/",
        );
        let l = lookups();
        let placed = HierarchyBuilder::new(&l)
            .build(&[row("Acme", "Cash"), row("Acme", "Total Current Assets")])
            .unwrap();
        let observed = HierarchyModel::from_rows(&placed, "/");
        assert_eq!(observed.parent("Cash"), None);

        let merged = declared.overlay(&observed);
        assert_eq!(
            edges(&merged),
            vec![
                ("Cash".to_string(), Some("Total Current Assets".to_string())),
                ("Total Current Assets".to_string(), None),
            ]
        );
    }

    #[test]
    fn test_subtree_selection() {
        let model = HierarchyModel::from_edges(
            vec![
                ("Total Unrestricted Assets".to_string(), None),
                ("Cash".to_string(), Some("Total Unrestricted Assets".to_string())),
                ("Total Liabilities and Equity".to_string(), None),
                ("Total Unrestricted Assets Adjusted".to_string(), None),
            ],
            "/",
        );
        let paths = model.paths().unwrap();
        let selected =
            HierarchyModel::subtree(&paths, &["Total Unrestricted Assets".to_string()], "/");
        let selected: Vec<&str> = selected.iter().map(String::as_str).collect();
        assert_eq!(selected, vec!["Cash", "Total Unrestricted Assets"]);
    }
}
