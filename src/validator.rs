use crate::aggregator::MergedTable;
use crate::audit::AuditEvent;
use crate::schema::{Dataset, DatasetRow, SENTINEL};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid regex"));

const CURRENCY_GLYPHS: &[char] = &['₹', '$', '€', '£', '¥', '%'];

fn is_dash(c: char) -> bool {
    matches!(c, '-' | '\u{2010}'..='\u{2015}' | '\u{2212}')
}

/// Reduces a raw cell to a plain decimal string, or the sentinel when that is
/// not possible.
///
/// Thousands separators, currency glyphs and alphabetic residue (`Rs.`, `cr`,
/// `INR`) are stripped, bracketed amounts become negative, and dash-like
/// placeholders collapse to the sentinel. Whitespace or letters between two
/// runs of digits (`100 200`, `1.5e7`) mean the cell holds more than one
/// number, so it collapses to the sentinel too. The function is idempotent.
pub fn clean_value(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut after_letter = false;
    let mut seen_digit = false;
    let mut broken = false;

    for c in raw.trim().chars() {
        if c.is_alphabetic() || c.is_whitespace() {
            after_letter = c.is_alphabetic();
            broken |= seen_digit;
            continue;
        }
        if c.is_ascii_digit() {
            if broken {
                return SENTINEL.to_string();
            }
            seen_digit = true;
        }
        let dropped_dot = c == '.' && after_letter;
        after_letter = false;
        if dropped_dot || matches!(c, ',' | '\'' | '_' | '+') || CURRENCY_GLYPHS.contains(&c) {
            continue;
        }
        cleaned.push(if is_dash(c) { '-' } else { c });
    }

    let cleaned = match cleaned
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) if inner.starts_with('-') => inner.to_string(),
        Some(inner) => format!("-{}", inner),
        None => cleaned,
    };

    if DECIMAL.is_match(&cleaned) {
        cleaned
    } else {
        SENTINEL.to_string()
    }
}

/// True when `raw` carries no usable number.
pub fn is_placeholder(raw: &str) -> bool {
    clean_value(raw) == SENTINEL
}

/// Produces the final dataset: every value cleaned, rows without a single
/// real value dropped, and every remaining row filled out to one cell per
/// period.
pub fn validate(table: MergedTable, audit: &mut Vec<AuditEvent>) -> Dataset {
    let MergedTable {
        currency,
        unit,
        periods,
        rows,
    } = table;

    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        let cells: Vec<String> = periods
            .iter()
            .map(|period| {
                row.values
                    .get(period)
                    .map(|v| clean_value(v))
                    .unwrap_or_else(|| SENTINEL.to_string())
            })
            .collect();

        if cells.iter().all(|c| c == SENTINEL) {
            debug!("Dropping row '{}': no usable values", row.key);
            audit.push(AuditEvent::RowDropped { key: row.key });
            continue;
        }
        kept.push(DatasetRow::new(row.key, row.label, cells));
    }

    info!(
        "Validated dataset: {} rows across {} periods",
        kept.len(),
        periods.len()
    );
    Dataset::from_parts(currency, unit, periods, kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CanonicalPeriod, CanonicalRow, UNKNOWN};

    #[test]
    fn test_clean_value_examples() {
        assert_eq!(clean_value("1,234"), "1234");
        assert_eq!(clean_value("(500)"), "-500");
        assert_eq!(clean_value("₹2,500.50"), "2500.50");
        assert_eq!(clean_value("-"), SENTINEL);
        assert_eq!(clean_value("—"), SENTINEL);
        assert_eq!(clean_value(""), SENTINEL);
    }

    #[test]
    fn test_clean_value_residue() {
        assert_eq!(clean_value("Rs. 12,34,567"), "1234567");
        assert_eq!(clean_value("Rs.2500"), "2500");
        assert_eq!(clean_value("INR 1.5 cr."), "1.5");
        assert_eq!(clean_value("$ (1,200.75)"), "-1200.75");
        assert_eq!(clean_value("(-300)"), "-300");
        assert_eq!(clean_value("−42"), "-42");
        assert_eq!(clean_value("12.5%"), "12.5");
        assert_eq!(clean_value("  7890  "), "7890");
        assert_eq!(clean_value("Rs 1,200 cr"), "1200");
    }

    #[test]
    fn test_separate_numbers_are_not_joined() {
        for raw in ["2024 1,200", "100 200", "7 890", "1.5e7", "1e+20", "1E5", "FY24 100", "12 .5"] {
            assert_eq!(clean_value(raw), SENTINEL, "raw value {:?}", raw);
        }
    }

    #[test]
    fn test_clean_value_placeholders() {
        for raw in ["MISSING", "n/a", "NA", "nil", "--", "–", "()", "(-)", "1.2.3", "12-34", "."] {
            assert_eq!(clean_value(raw), SENTINEL, "raw value {:?}", raw);
        }
    }

    #[test]
    fn test_clean_value_idempotent() {
        let samples = [
            "1,234", "(500)", "₹2,500.50", "-", "—", "", "Rs. 99", "abc", "(1,000)", "3.14",
            "-0", "MISSING", "12 Cr", "( 45 )", "1.", ".5", "100 200", "1.5e7",
        ];
        for raw in samples {
            let once = clean_value(raw);
            assert_eq!(clean_value(&once), once, "raw value {:?}", raw);
        }
    }

    fn table(rows: Vec<CanonicalRow>) -> MergedTable {
        MergedTable {
            currency: "INR".to_string(),
            unit: UNKNOWN.to_string(),
            periods: vec![
                CanonicalPeriod::new(2022),
                CanonicalPeriod::new(2023),
                CanonicalPeriod::new(2024),
            ],
            rows,
        }
    }

    fn row(key: &str, values: &[(i32, &str)]) -> CanonicalRow {
        let mut row = CanonicalRow::new(key);
        for (year, value) in values {
            row.values.insert(CanonicalPeriod::new(*year), value.to_string());
        }
        row
    }

    #[test]
    fn test_validate_fills_every_period() {
        let mut audit = Vec::new();
        let dataset = validate(
            table(vec![
                row("revenue", &[(2023, "1,000")]).with_label("Revenue from operations")
            ]),
            &mut audit,
        );

        let revenue = dataset.row("revenue").unwrap();
        assert_eq!(revenue.cells(), &[SENTINEL, "1000", SENTINEL]);
        assert_eq!(revenue.label(), "Revenue from operations");
        for row in dataset.rows() {
            assert_eq!(row.cells().len(), dataset.periods().len());
        }
        assert!(audit.is_empty());
    }

    #[test]
    fn test_validate_drops_all_sentinel_rows() {
        let mut audit = Vec::new();
        let dataset = validate(
            table(vec![
                row("revenue", &[(2022, "100")]),
                row("finance costs", &[(2022, "-"), (2023, "n/a")]),
                row("tax expense", &[]),
            ]),
            &mut audit,
        );

        assert_eq!(dataset.rows().len(), 1);
        assert!(dataset.row("finance costs").is_none());
        assert_eq!(
            audit,
            vec![
                AuditEvent::RowDropped {
                    key: "finance costs".to_string()
                },
                AuditEvent::RowDropped {
                    key: "tax expense".to_string()
                },
            ]
        );
    }
}
