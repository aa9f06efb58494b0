// src/extractors/values.rs
use crate::config::ValueKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;

// First signed decimal in the token
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-+]?\d*\.?\d+").expect("Failed to compile NUMBER_RE")
});

// Unit suffixes glued to the value ("6.94%", "45.2days")
static UNIT_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:rate|days|years|%)$").expect("Failed to compile UNIT_SUFFIX_RE")
});

/// Turns one raw value token into a number.
///
/// Never fails: anything that is not recognisably a number comes back as
/// `None`, so a misclassified token costs one cell rather than the page.
#[derive(Debug, Clone)]
pub struct ValueNormalizer {
    kind: ValueKind,
    sentinels: HashSet<String>,
}

impl ValueNormalizer {
    pub fn new(kind: ValueKind, sentinels: &[String]) -> Self {
        Self {
            kind,
            sentinels: sentinels.iter().map(|s| s.trim().to_string()).collect(),
        }
    }

    /// True for the profile's "no data" markers (`-`, `N/A`, OCR garbage glyphs).
    pub fn is_sentinel(&self, token: &str) -> bool {
        self.sentinels.contains(token.trim())
    }

    pub fn normalize(&self, token: &str) -> Option<f64> {
        let token = token.trim();
        if token.is_empty() || self.is_sentinel(token) {
            return None;
        }

        if let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            return self.normalize(inner).map(|v| -v);
        }

        let cleaned: Cow<str> = match self.kind {
            ValueKind::Dollar => Cow::Owned(token.replace([',', '$'], "")),
            ValueKind::Ratio => Cow::Borrowed(token),
        };
        let cleaned = UNIT_SUFFIX_RE.replace(&cleaned, "");

        NUMBER_RE.find(&cleaned)?.as_str().parse::<f64>().ok()
    }
}
