//! Period label normalization.
//!
//! Statements label their columns in many ways (`2024`, `FY 2023-24`,
//! `Q2 2023`, `9M FY24`, `31/03/2024`, `Mar-24`). All of them reduce to the
//! fiscal year they close, so labels for the same period land in the same
//! column. Slash and dash dates are resolved from their year component alone;
//! day and month are not validated.

use crate::schema::CanonicalPeriod;
use once_cell::sync::Lazy;
use regex::Regex;

static FY_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^F\.?Y\.?\s*").expect("valid regex"));

static YEAR_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})\s*[-/]\s*(\d{4}|\d{2})$").expect("valid regex"));

static QUARTER_FIRST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Q([1-4])(.*)$").expect("valid regex"));

static QUARTER_LAST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)[\s\-/]*Q[1-4]$").expect("valid regex"));

static MONTH_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})\s*M(?:ONTHS?)?(?:$|[\s\-/,(]+(.*)$)").expect("valid regex"));

static MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\d{1,2}(?:ST|ND|RD|TH)?\s*)?(?:JAN|FEB|MAR|APR|MAY|JUN|JUL|AUG|SEP|OCT|NOV|DEC)[A-Z]*\.?(?:\s+\d{1,2}(?:ST|ND|RD|TH)?\b)?[\s,\-/]*(\d{4}|\d{2})$",
    )
    .expect("valid regex")
});

static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,4})(?:/(\d{1,4})|[-./](\d{1,4})[-./](\d{1,4}))$").expect("valid regex")
});

static LEAD_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:FOR\s+THE\s+)?(?:(?:YEAR|PERIOD|QUARTER)\s+END(?:ED|ING)|AS\s+(?:AT|ON))\s*")
        .expect("valid regex")
});

static PERIOD_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{2}/\d{2}/20\d{2}|20\d{2}|Q[1-4]|\d{1,2}M)\b").expect("valid regex")
});

/// Maps raw period labels to fiscal years within `[min_year, reference_year + 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodNormalizer {
    min_year: i32,
    reference_year: i32,
}

impl PeriodNormalizer {
    pub fn new(min_year: i32, reference_year: i32) -> Self {
        Self {
            min_year,
            reference_year,
        }
    }

    pub fn max_year(&self) -> i32 {
        self.reference_year + 1
    }

    /// Returns `None` when the label has no recognizable form or its year
    /// falls outside the accepted range.
    pub fn normalize(&self, label: &str) -> Option<CanonicalPeriod> {
        let text = tidy(label);
        if text.is_empty() {
            return None;
        }
        let text = LEAD_IN.replace(&text, "");

        let year = year_expression(&text)
            .or_else(|| self.quarter(&text))
            .or_else(|| self.month_span(&text))
            .or_else(|| month_name(&text))
            .or_else(|| numeric_date(&text))?;

        if (self.min_year..=self.max_year()).contains(&year) {
            Some(CanonicalPeriod::new(year))
        } else {
            None
        }
    }

    fn quarter(&self, text: &str) -> Option<i32> {
        if let Some(caps) = QUARTER_FIRST.captures(text) {
            let rest = trim_connectors(caps.get(2).map_or("", |m| m.as_str()));
            return if rest.is_empty() {
                Some(self.reference_year)
            } else {
                year_or_short(rest)
            };
        }
        QUARTER_LAST
            .captures(text)
            .and_then(|caps| year_or_short(caps.get(1)?.as_str().trim()))
    }

    fn month_span(&self, text: &str) -> Option<i32> {
        let caps = MONTH_SPAN.captures(text)?;
        let months: u32 = caps.get(1)?.as_str().parse().ok()?;
        if !(1..=12).contains(&months) {
            return None;
        }
        let rest = caps.get(2).map_or("", |m| m.as_str());
        let rest = trim_connectors(rest.trim_end_matches(')'));
        let rest = rest
            .strip_prefix("ENDED")
            .or_else(|| rest.strip_prefix("ENDING"))
            .map_or(rest, trim_connectors);
        if rest.is_empty() {
            Some(self.reference_year)
        } else {
            year_or_short(rest)
        }
    }
}

/// Upper-cases, unifies dashes and apostrophes, and collapses whitespace.
fn tidy(label: &str) -> String {
    let unified: String = label
        .chars()
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
            '\'' | '\u{2018}' | '\u{2019}' => ' ',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    unified.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trim_connectors(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '/' | ',' | '('))
}

fn two_digit_year(s: &str) -> Option<i32> {
    s.parse::<i32>().ok().map(|yy| 2000 + yy)
}

/// A bare year, a 2-digit year, or a consecutive fiscal range, optionally
/// prefixed by `FY`. Ranges resolve to their ending year.
fn year_expression(text: &str) -> Option<i32> {
    let has_fy = FY_PREFIX.is_match(text);
    let body = FY_PREFIX.replace(text, "");
    let body = body.trim();

    if body.len() == 4 && body.bytes().all(|b| b.is_ascii_digit()) {
        return body.parse().ok();
    }
    if has_fy && body.len() == 2 && body.bytes().all(|b| b.is_ascii_digit()) {
        return two_digit_year(body);
    }

    let caps = YEAR_RANGE.captures(body)?;
    let start: i32 = caps.get(1)?.as_str().parse().ok()?;
    let end_text = caps.get(2)?.as_str();
    let end: i32 = end_text.parse().ok()?;
    let end = if end_text.len() == 2 {
        let candidate = start - start % 100 + end;
        if candidate < start {
            candidate + 100
        } else {
            candidate
        }
    } else {
        end
    };

    if end == start + 1 {
        Some(end)
    } else {
        None
    }
}

/// Inside a quarter or month-span label a bare 2-digit year is unambiguous.
fn year_or_short(text: &str) -> Option<i32> {
    year_expression(text).or_else(|| {
        if text.len() == 2 && text.bytes().all(|b| b.is_ascii_digit()) {
            two_digit_year(text)
        } else {
            None
        }
    })
}

fn month_name(text: &str) -> Option<i32> {
    let caps = MONTH_NAME.captures(text)?;
    let year = caps.get(1)?.as_str();
    if year.len() == 2 {
        two_digit_year(year)
    } else {
        year.parse().ok()
    }
}

/// `DD/MM/YYYY`, `MM/YYYY`, `YYYY-MM-DD` and similar. The rightmost 4-digit
/// component is the year; failing that, a trailing 2-digit component.
fn numeric_date(text: &str) -> Option<i32> {
    let caps = NUMERIC_DATE.captures(text)?;
    let parts: Vec<&str> = (1..=4)
        .filter_map(|i| caps.get(i).map(|m| m.as_str()))
        .collect();

    if let Some(year) = parts.iter().rev().find(|p| p.len() == 4) {
        return year.parse().ok();
    }
    match parts.last() {
        Some(last) if last.len() == 2 => two_digit_year(last),
        _ => None,
    }
}

/// Distinct period-like substrings of `text`, in first-seen order. Sent to the
/// inference service as column hints.
pub fn detect_period_hints(text: &str) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();
    for m in PERIOD_HINT.find_iter(text) {
        let hint = m.as_str();
        if !hints.iter().any(|h| h == hint) {
            hints.push(hint.to_string());
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> PeriodNormalizer {
        PeriodNormalizer::new(2010, 2025)
    }

    fn year(label: &str) -> Option<i32> {
        normalizer().normalize(label).map(CanonicalPeriod::year)
    }

    #[test]
    fn test_bare_years() {
        assert_eq!(year("2024"), Some(2024));
        assert_eq!(year(" 2019 "), Some(2019));
        assert_eq!(year("FY2024"), Some(2024));
        assert_eq!(year("FY 24"), Some(2024));
        assert_eq!(year("fy'23"), Some(2023));
    }

    #[test]
    fn test_fiscal_ranges_resolve_to_ending_year() {
        assert_eq!(year("2023-24"), Some(2024));
        assert_eq!(year("FY 2023-24"), Some(2024));
        assert_eq!(year("2023–2024"), Some(2024));
        assert_eq!(year("2023/24"), Some(2024));
        assert_eq!(year("2021-23"), None);
    }

    #[test]
    fn test_same_period_labels_collide() {
        let n = normalizer();
        assert_eq!(n.normalize("2023-24"), n.normalize("FY2024"));
        assert_eq!(n.normalize("31/03/2024"), n.normalize("2024"));
        assert_eq!(n.normalize("Mar-24"), n.normalize("FY 2023-24"));
    }

    #[test]
    fn test_quarters() {
        assert_eq!(year("Q2 2023"), Some(2023));
        assert_eq!(year("q4-22"), Some(2022));
        assert_eq!(year("Q1FY24"), Some(2024));
        assert_eq!(year("2023 Q3"), Some(2023));
        assert_eq!(year("Q3"), Some(2025));
        assert_eq!(year("Q5 2023"), None);
    }

    #[test]
    fn test_month_spans() {
        assert_eq!(year("9M"), Some(2025));
        assert_eq!(year("9M FY24"), Some(2024));
        assert_eq!(year("12 months ended 2023"), Some(2023));
        assert_eq!(year("6M (2022)"), Some(2022));
        assert_eq!(year("13M"), None);
    }

    #[test]
    fn test_dates_use_year_component() {
        assert_eq!(year("31/03/2024"), Some(2024));
        assert_eq!(year("03/2023"), Some(2023));
        assert_eq!(year("2022-12-31"), Some(2022));
        assert_eq!(year("31.03.23"), Some(2023));
        // Day and month are never checked.
        assert_eq!(year("99/99/2023"), Some(2023));
    }

    #[test]
    fn test_month_names() {
        assert_eq!(year("March 31, 2024"), Some(2024));
        assert_eq!(year("31st March 2023"), Some(2023));
        assert_eq!(year("Year ended 31 March 2022"), Some(2022));
        assert_eq!(year("Dec-21"), Some(2021));
    }

    #[test]
    fn test_out_of_range_years_rejected() {
        assert_eq!(year("2009"), None);
        assert_eq!(year("2026"), Some(2026));
        assert_eq!(year("2027"), None);
        assert_eq!(year("31/12/2030"), None);
    }

    #[test]
    fn test_unrecognized_labels_rejected() {
        assert_eq!(year(""), None);
        assert_eq!(year("Particulars"), None);
        assert_eq!(year("Note 12"), None);
        assert_eq!(year("202"), None);
    }

    #[test]
    fn test_detect_period_hints() {
        let text = "Particulars 31/03/2024 2023 Q1 2023 9M FY";
        assert_eq!(
            detect_period_hints(text),
            vec!["31/03/2024", "2023", "Q1", "9M"]
        );
    }
}
