// src/extractors/line.rs
use super::values::ValueNormalizer;
use crate::config::{SourceProfile, ValueKind};
use crate::table::Period;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

// Leading token shapes that start the value columns of a row
static VALUE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\(?[-+]?\$?\d|\(?[-+]?\.\d)").expect("Failed to compile VALUE_TOKEN_RE")
});

// Name or value glued to the next value: "Margin6.94%12.47%", "(1.2)(3.4)"
static GLUED_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z%)])(\(?[-$]?\d)").expect("Failed to compile GLUED_VALUE_RE")
});

/// Minimum length of a digit-free line to count as a category header.
const CATEGORY_MIN_LEN: usize = 3;

/// Widest distance from the profile's first period an unmarked header may reach.
const MAX_PERIOD_DISTANCE: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Blank,
    /// Digit-free but too short to be a category header.
    ShortText,
    /// Layout artifact such as a repeated column header.
    Noise,
}

/// One measure line split into name, unit and positional values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub name: String,
    pub unit: Option<String>,
    /// Padded with `None` or truncated to the section width.
    pub values: Vec<Option<f64>>,
    /// Number of value tokens actually present on the line (at most the width).
    pub observed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Skip(SkipReason),
    CategoryHeader(String),
    PeriodHeader(Vec<Period>),
    DataRow(DataRow),
    /// Looked like data but could not be split. Carries the reason.
    Unparseable(&'static str),
}

/// Classifies lines inside one open section.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    normalizer: ValueNormalizer,
    unit_words: Vec<String>,
    noise_markers: Vec<String>,
    period_marker: String,
    first_period: i32,
    split_glued_values: bool,
}

impl LineClassifier {
    pub fn new(profile: &SourceProfile, kind: ValueKind) -> Self {
        Self {
            normalizer: ValueNormalizer::new(kind, &profile.sentinels),
            unit_words: profile.unit_words.iter().map(|u| u.to_lowercase()).collect(),
            noise_markers: profile.noise_markers.clone(),
            period_marker: profile.period_marker.clone(),
            first_period: profile.first_period,
            split_glued_values: profile.split_glued_values,
        }
    }

    /// Classifies `line` for a section whose rows carry `width` value columns.
    pub fn classify(&self, line: &str, width: usize) -> LineKind {
        let line = line.trim();
        if line.is_empty() {
            return LineKind::Skip(SkipReason::Blank);
        }

        if let Some(kind) = self.period_header(line) {
            return kind;
        }

        if !line.chars().any(|c| c.is_ascii_digit()) {
            return if line.chars().count() > CATEGORY_MIN_LEN {
                LineKind::CategoryHeader(line.to_string())
            } else {
                LineKind::Skip(SkipReason::ShortText)
            };
        }

        let line: Cow<str> = if self.split_glued_values {
            GLUED_VALUE_RE.replace_all(line, "$1 $2")
        } else {
            Cow::Borrowed(line)
        };
        self.data_row(&line, width)
    }

    fn period_header(&self, line: &str) -> Option<LineKind> {
        let marked = !self.period_marker.is_empty() && line.starts_with(&self.period_marker);
        let tokens: Vec<&str> = line
            .split_whitespace()
            .filter(|t| !t.eq_ignore_ascii_case(self.period_marker.trim()))
            .collect();
        let periods: Vec<Period> = tokens.iter().filter_map(|t| Period::parse(t)).collect();

        if marked {
            if periods.is_empty() {
                return Some(LineKind::Skip(SkipReason::Noise));
            }
            return Some(LineKind::PeriodHeader(periods));
        }
        // Without the marker only a plausible run of consecutive years counts;
        // a wrapped row of bare values ("1500 1600") falls through to data_row
        if !periods.is_empty() && periods.len() == tokens.len() && self.plausible_run(&periods) {
            return Some(LineKind::PeriodHeader(periods));
        }
        None
    }

    fn plausible_run(&self, periods: &[Period]) -> bool {
        let near = |p: &Period| (p.year() - self.first_period).abs() <= MAX_PERIOD_DISTANCE;
        periods.iter().all(near) && periods.windows(2).all(|w| w[0].next() == Some(w[1]))
    }

    fn is_unit_word(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        self.unit_words.iter().any(|u| *u == lower)
    }

    fn is_value_token(&self, token: &str) -> bool {
        VALUE_TOKEN_RE.is_match(token) || self.normalizer.is_sentinel(token)
    }

    fn data_row(&self, line: &str, width: usize) -> LineKind {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let first_value = match tokens.iter().position(|t| self.is_value_token(t)) {
            Some(0) => return LineKind::Unparseable("no measure name before values"),
            Some(idx) => idx,
            None => return LineKind::Unparseable("no numeric token"),
        };

        let mut name_end = first_value;
        let mut unit = None;
        if first_value >= 2 && self.is_unit_word(tokens[first_value - 1]) {
            name_end -= 1;
            unit = Some(tokens[name_end].to_string());
        }

        let name = tokens[..name_end].join(" ");
        if self.noise_markers.iter().any(|m| name.contains(m.as_str())) {
            return LineKind::Skip(SkipReason::Noise);
        }

        // Unit words repeated between values ("45.2 days 50.1 days") are not columns
        let mut value_tokens = Vec::with_capacity(width);
        for token in &tokens[first_value..] {
            if self.is_unit_word(token) && !token.chars().any(|c| c.is_ascii_digit()) {
                if unit.is_none() {
                    unit = Some(token.to_string());
                }
                continue;
            }
            value_tokens.push(*token);
        }

        let observed = value_tokens.len().min(width);
        let mut values: Vec<Option<f64>> = value_tokens
            .iter()
            .take(width)
            .map(|t| self.normalizer.normalize(t))
            .collect();
        values.resize(width, None);

        LineKind::DataRow(DataRow {
            name,
            unit,
            values,
            observed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratios() -> LineClassifier {
        LineClassifier::new(&SourceProfile::default(), ValueKind::Ratio)
    }

    fn dollars() -> LineClassifier {
        LineClassifier::new(&SourceProfile::default(), ValueKind::Dollar)
    }

    fn row(kind: LineKind) -> DataRow {
        match kind {
            LineKind::DataRow(row) => row,
            other => panic!("expected data row, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_and_short_lines_skip() {
        assert_eq!(ratios().classify("   ", 5), LineKind::Skip(SkipReason::Blank));
        assert_eq!(ratios().classify("Net", 5), LineKind::Skip(SkipReason::ShortText));
    }

    #[test]
    fn test_category_header() {
        assert_eq!(
            ratios().classify("  Profitability Ratios ", 5),
            LineKind::CategoryHeader("Profitability Ratios".to_string())
        );
    }

    #[test]
    fn test_period_headers() {
        assert_eq!(
            ratios().classify("FY 2020 FY 2021 FY 2022", 5),
            LineKind::PeriodHeader(vec![Period(2020), Period(2021), Period(2022)])
        );
        assert_eq!(
            ratios().classify("2023 2024", 5),
            LineKind::PeriodHeader(vec![Period(2023), Period(2024)])
        );
        assert_eq!(
            dollars().classify("FY 2005 2006 2007 2008", 4),
            LineKind::PeriodHeader(vec![Period(2005), Period(2006), Period(2007), Period(2008)])
        );
        assert_eq!(
            ratios().classify("FY Ending September", 5),
            LineKind::Skip(SkipReason::Noise)
        );
    }

    #[test]
    fn test_bare_values_are_not_period_headers() {
        // Continuation of a wrapped row whose name sits on the line above
        assert_eq!(
            dollars().classify("1500 1600", 5),
            LineKind::Unparseable("no measure name before values")
        );
        assert_eq!(
            dollars().classify("2021 2019", 5),
            LineKind::Unparseable("no measure name before values")
        );
        assert_eq!(
            dollars().classify("2091 2092", 5),
            LineKind::Unparseable("no measure name before values")
        );
        // The marker still vouches for the line
        assert_eq!(
            dollars().classify("FY 2005 2007", 5),
            LineKind::PeriodHeader(vec![Period(2005), Period(2007)])
        );
    }

    #[test]
    fn test_ratio_row_with_percentages() {
        let r = row(ratios().classify("Total Margin 6.94% 12.47%", 5));
        assert_eq!(r.name, "Total Margin");
        assert_eq!(r.unit, None);
        assert_eq!(r.observed, 2);
        assert_eq!(r.values, vec![Some(6.94), Some(12.47), None, None, None]);
    }

    #[test]
    fn test_unit_word_split_from_name() {
        let r = row(ratios().classify("Days Cash on Hand, Current days 45.2 50.1 61.0", 3));
        assert_eq!(r.name, "Days Cash on Hand, Current");
        assert_eq!(r.unit.as_deref(), Some("days"));
        assert_eq!(r.values, vec![Some(45.2), Some(50.1), Some(61.0)]);

        let r = row(ratios().classify("Average Age of Plant 10.1 years 11.4 years", 2));
        assert_eq!(r.name, "Average Age of Plant");
        assert_eq!(r.unit.as_deref(), Some("years"));
        assert_eq!(r.values, vec![Some(10.1), Some(11.4)]);
    }

    #[test]
    fn test_dollar_row_with_negatives_and_sentinels() {
        let r = row(dollars().classify("Net Patient Revenue 1,234,567 (12,000) - 45", 5));
        assert_eq!(r.name, "Net Patient Revenue");
        assert_eq!(r.observed, 4);
        assert_eq!(
            r.values,
            vec![Some(1234567.0), Some(-12000.0), None, Some(45.0), None]
        );
    }

    #[test]
    fn test_extra_values_truncated() {
        let r = row(dollars().classify("Cash 1 2 3 4 5 6 7", 5));
        assert_eq!(r.values.len(), 5);
        assert_eq!(r.observed, 5);
        assert_eq!(r.values[4], Some(5.0));
    }

    #[test]
    fn test_noise_rows_discarded() {
        assert_eq!(
            dollars().classify("Units in thousands 1,000", 5),
            LineKind::Skip(SkipReason::Noise)
        );
        assert_eq!(
            dollars().classify("Consolidated totals 12 14", 5),
            LineKind::Skip(SkipReason::Noise)
        );
    }

    #[test]
    fn test_unparseable_rows() {
        assert_eq!(
            dollars().classify("Page4of12", 5),
            LineKind::Unparseable("no numeric token")
        );
        assert_eq!(
            dollars().classify("123 456", 5),
            LineKind::Unparseable("no measure name before values")
        );
    }

    #[test]
    fn test_glued_values_split_when_enabled() {
        let profile = SourceProfile {
            split_glued_values: true,
            ..SourceProfile::default()
        };
        let classifier = LineClassifier::new(&profile, ValueKind::Ratio);
        let r = row(classifier.classify("Total Margin6.94%12.47%16.10%24.09%8.19%", 5));
        assert_eq!(r.name, "Total Margin");
        assert_eq!(
            r.values,
            vec![Some(6.94), Some(12.47), Some(16.10), Some(24.09), Some(8.19)]
        );

        assert_eq!(
            ratios().classify("Total Margin6.94%12.47%", 5),
            LineKind::Unparseable("no numeric token")
        );
    }
}
