// src/reconcile/names.rs
use crate::config::Lookups;

/// Maps as-reported names to the canonical vocabulary.
/// Names missing from the tables pass through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct NameReconciler<'a> {
    lookups: &'a Lookups,
}

impl<'a> NameReconciler<'a> {
    pub fn new(lookups: &'a Lookups) -> Self {
        Self { lookups }
    }

    pub fn entity<'n>(&self, raw: &'n str) -> &'n str
    where
        'a: 'n,
    {
        let raw = raw.trim();
        self.lookups
            .entity_names
            .get(raw)
            .map(String::as_str)
            .unwrap_or(raw)
    }

    pub fn measure<'n>(&self, raw: &'n str) -> &'n str
    where
        'a: 'n,
    {
        let raw = raw.trim();
        self.lookups
            .measure_names
            .get(raw)
            .map(String::as_str)
            .unwrap_or(raw)
    }

    pub fn reconcile(&self, raw_entity: &str, raw_measure: &str) -> (String, String) {
        (
            self.entity(raw_entity).to_string(),
            self.measure(raw_measure).to_string(),
        )
    }
}
