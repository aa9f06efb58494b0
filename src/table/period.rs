// src/table/period.rs
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// "FY 2023", "FY2023", "fy-2023", "2023"
static PERIOD_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:FY[\s\-]*)?'?(\d{4})$").expect("Failed to compile PERIOD_LABEL_RE")
});

/// One fiscal year. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period(pub i32);

impl Period {
    /// Parses a period label, dropping any fiscal-year prefix.
    pub fn parse(label: &str) -> Option<Self> {
        let caps = PERIOD_LABEL_RE.captures(label.trim())?;
        caps[1].parse().ok().map(Period)
    }

    pub fn year(self) -> i32 {
        self.0
    }

    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Period)
    }

    /// `first`, `first + 1`, ... `count` periods in total.
    pub fn sequence(first: Period, count: usize) -> Vec<Period> {
        let mut out = Vec::with_capacity(count);
        let mut current = Some(first);
        while out.len() < count {
            match current {
                Some(p) => {
                    out.push(p);
                    current = p.next();
                }
                None => break,
            }
        }
        out
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
