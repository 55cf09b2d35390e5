use crate::audit::AuditEvent;
use crate::schema::{CanonicalPeriod, CanonicalRecord, CanonicalRow, UNKNOWN};
use crate::validator::is_placeholder;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Which record keeps a cell when several supply a value for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Later chunks carry more context, so the last usable value wins
    #[default]
    LastWriterWins,
    FirstWriterWins,
}

impl ConflictPolicy {
    /// Offers `value` for one cell. A value with no usable number never
    /// displaces anything and is never stored.
    pub fn offer(
        self,
        cells: &mut BTreeMap<CanonicalPeriod, String>,
        period: CanonicalPeriod,
        value: &str,
    ) {
        if is_placeholder(value) {
            return;
        }
        match self {
            ConflictPolicy::LastWriterWins => {
                cells.insert(period, value.to_string());
            }
            ConflictPolicy::FirstWriterWins => {
                cells
                    .entry(period)
                    .or_insert_with(|| value.to_string());
            }
        }
    }
}

/// All records folded together, before value sanitization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTable {
    pub currency: String,
    pub unit: String,
    /// Ascending, capped to the most recent periods
    pub periods: Vec<CanonicalPeriod>,
    /// First-seen order
    pub rows: Vec<CanonicalRow>,
}

/// Accumulator for the merge. Each [`fold`](MergeState::fold) consumes the
/// state and returns the next one; records must be folded in chunk order for
/// the conflict policy to be meaningful.
#[derive(Debug, Clone, Default)]
pub struct MergeState {
    policy: ConflictPolicy,
    currency: Option<String>,
    unit: Option<String>,
    periods: BTreeSet<CanonicalPeriod>,
    rows: Vec<CanonicalRow>,
    index: HashMap<String, usize>,
    records: usize,
}

fn reported(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(UNKNOWN))
}

impl MergeState {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn fold(mut self, record: CanonicalRecord) -> Self {
        if let Some(currency) = reported(record.currency) {
            self.currency = Some(currency);
        }
        if let Some(unit) = reported(record.unit) {
            self.unit = Some(unit);
        }
        self.periods.extend(record.periods);

        let policy = self.policy;
        for row in record.rows {
            let slot = match self.index.get(&row.key) {
                Some(&slot) => slot,
                None => {
                    self.index.insert(row.key.clone(), self.rows.len());
                    self.rows
                        .push(CanonicalRow::new(row.key.clone()).with_label(row.label.clone()));
                    self.rows.len() - 1
                }
            };
            let cells = &mut self.rows[slot].values;
            for (period, value) in row.values {
                policy.offer(cells, period, &value);
            }
        }

        self.records += 1;
        self
    }

    /// Sorts the period union, keeps the `cap` most recent periods and prunes
    /// every cell keyed to a discarded one.
    pub fn finish(self, cap: usize, audit: &mut Vec<AuditEvent>) -> MergedTable {
        let mut periods: Vec<CanonicalPeriod> = self.periods.into_iter().collect();
        let mut rows = self.rows;

        if periods.len() > cap {
            let dropped: Vec<CanonicalPeriod> = periods.drain(..periods.len() - cap).collect();
            debug!("Pruning {} periods beyond the cap of {}", dropped.len(), cap);
            audit.push(AuditEvent::PeriodsPruned {
                dropped: dropped.iter().map(|p| p.year()).collect(),
            });
            if let Some(&earliest) = periods.first() {
                for row in &mut rows {
                    row.values.retain(|period, _| *period >= earliest);
                }
            } else {
                for row in &mut rows {
                    row.values.clear();
                }
            }
        }

        info!(
            "Merged {} records into {} rows across {} periods",
            self.records,
            rows.len(),
            periods.len()
        );

        MergedTable {
            currency: self.currency.unwrap_or_else(|| UNKNOWN.to_string()),
            unit: self.unit.unwrap_or_else(|| UNKNOWN.to_string()),
            periods,
            rows,
        }
    }
}

/// Folds `records` in iteration order.
pub fn merge_records(
    records: impl IntoIterator<Item = CanonicalRecord>,
    policy: ConflictPolicy,
    cap: usize,
    audit: &mut Vec<AuditEvent>,
) -> MergedTable {
    records
        .into_iter()
        .fold(MergeState::new(policy), MergeState::fold)
        .finish(cap, audit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SENTINEL;

    fn p(year: i32) -> CanonicalPeriod {
        CanonicalPeriod::new(year)
    }

    fn record(periods: &[i32], rows: Vec<(&str, Vec<(i32, &str)>)>) -> CanonicalRecord {
        CanonicalRecord {
            currency: None,
            unit: None,
            periods: periods.iter().map(|y| p(*y)).collect(),
            rows: rows
                .into_iter()
                .map(|(key, values)| CanonicalRow {
                    key: key.to_string(),
                    label: key.to_string(),
                    values: values
                        .into_iter()
                        .map(|(y, v)| (p(y), v.to_string()))
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_later_records_fill_and_override() {
        let a = record(&[2022, 2023], vec![("revenue", vec![(2022, "100"), (2023, SENTINEL)])]);
        let b = record(&[2023, 2024], vec![("revenue", vec![(2023, "150"), (2024, "200")])]);

        let mut audit = Vec::new();
        let merged = merge_records(vec![a, b], ConflictPolicy::LastWriterWins, 7, &mut audit);

        assert_eq!(merged.periods, vec![p(2022), p(2023), p(2024)]);
        let revenue = &merged.rows[0];
        assert_eq!(revenue.values.get(&p(2022)).unwrap(), "100");
        assert_eq!(revenue.values.get(&p(2023)).unwrap(), "150");
        assert_eq!(revenue.values.get(&p(2024)).unwrap(), "200");
    }

    #[test]
    fn test_placeholder_never_overwrites() {
        let a = record(&[2023], vec![("revenue", vec![(2023, "150")])]);
        let b = record(&[2023], vec![("revenue", vec![(2023, "—")])]);

        let mut audit = Vec::new();
        let merged = merge_records(vec![a, b], ConflictPolicy::LastWriterWins, 7, &mut audit);
        assert_eq!(merged.rows[0].values.get(&p(2023)).unwrap(), "150");
    }

    #[test]
    fn test_first_writer_policy() {
        let a = record(&[2023], vec![("revenue", vec![(2023, "150")])]);
        let b = record(&[2023], vec![("revenue", vec![(2023, "175")])]);

        let mut audit = Vec::new();
        let merged = merge_records(vec![a, b], ConflictPolicy::FirstWriterWins, 7, &mut audit);
        assert_eq!(merged.rows[0].values.get(&p(2023)).unwrap(), "150");
    }

    #[test]
    fn test_cap_keeps_most_recent_periods() {
        let years: Vec<i32> = (2012..=2021).collect();
        let values: Vec<(i32, &str)> = years.iter().map(|y| (*y, "1")).collect();
        let old_only = record(&[2012, 2013], vec![("other income", vec![(2012, "5"), (2013, "6")])]);
        let wide = record(&years, vec![("revenue", values)]);

        let mut audit = Vec::new();
        let merged = merge_records(vec![old_only, wide], ConflictPolicy::default(), 7, &mut audit);

        assert_eq!(merged.periods.len(), 7);
        assert_eq!(merged.periods.first(), Some(&p(2015)));
        assert_eq!(merged.periods.last(), Some(&p(2021)));
        assert!(merged.rows[0].values.is_empty());
        assert_eq!(merged.rows[1].values.len(), 7);
        assert_eq!(
            audit,
            vec![AuditEvent::PeriodsPruned {
                dropped: vec![2012, 2013, 2014]
            }]
        );
    }

    #[test]
    fn test_rows_keep_first_seen_order() {
        let a = record(&[2023], vec![("tax expense", vec![(2023, "1")]), ("revenue", vec![(2023, "2")])]);
        let b = record(&[2023], vec![("net profit", vec![(2023, "3")]), ("tax expense", vec![(2023, "4")])]);

        let mut audit = Vec::new();
        let merged = merge_records(vec![a, b], ConflictPolicy::default(), 7, &mut audit);
        let keys: Vec<&str> = merged.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["tax expense", "revenue", "net profit"]);
    }

    #[test]
    fn test_first_seen_label_is_kept() {
        let mut a = record(&[2023], vec![("revenue", vec![(2023, "1")])]);
        a.rows[0].label = "Revenue from operations".to_string();
        let mut b = record(&[2023], vec![("revenue", vec![(2023, "2")])]);
        b.rows[0].label = "Sales".to_string();

        let mut audit = Vec::new();
        let merged = merge_records(vec![a, b], ConflictPolicy::default(), 7, &mut audit);
        assert_eq!(merged.rows[0].label, "Revenue from operations");
        assert_eq!(merged.rows[0].values.get(&p(2023)).unwrap(), "2");
    }

    #[test]
    fn test_currency_and_unit_last_reported_wins() {
        let mut a = record(&[], vec![]);
        a.currency = Some("INR".to_string());
        a.unit = Some("lakhs".to_string());
        let mut b = record(&[], vec![]);
        b.currency = Some("UNKNOWN".to_string());
        b.unit = Some("crore".to_string());
        let c = record(&[], vec![]);

        let mut audit = Vec::new();
        let merged = merge_records(vec![a, b, c], ConflictPolicy::default(), 7, &mut audit);
        assert_eq!(merged.currency, "INR");
        assert_eq!(merged.unit, "crore");

        let empty = merge_records(Vec::new(), ConflictPolicy::default(), 7, &mut audit);
        assert_eq!(empty.currency, UNKNOWN);
        assert_eq!(empty.unit, UNKNOWN);
    }

    #[test]
    fn test_fold_is_deterministic() {
        let records = vec![
            record(&[2022, 2023], vec![("revenue", vec![(2022, "10"), (2023, "20")])]),
            record(&[2023], vec![("revenue", vec![(2023, "25")]), ("ebitda", vec![(2023, "5")])]),
            record(&[2024], vec![("ebitda", vec![(2024, "7")])]),
        ];

        let mut audit = Vec::new();
        let first = merge_records(records.clone(), ConflictPolicy::default(), 7, &mut audit);
        let second = merge_records(records, ConflictPolicy::default(), 7, &mut audit);
        assert_eq!(first, second);
    }
}
