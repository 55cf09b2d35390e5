//! Maps raw partial records onto the canonical taxonomy.
//!
//! Row names are screened against the taxonomy tables (length, income
//! keywords, junk tokens, cash flow vocabulary) and folded through the alias
//! table; period labels go through the [`PeriodNormalizer`]. Alias resolution
//! is an exact table lookup.

use crate::aggregator::ConflictPolicy;
use crate::audit::{AuditEvent, RowRejection};
use crate::config::{PipelineConfig, Taxonomy};
use crate::periods::PeriodNormalizer;
use crate::schema::{CanonicalPeriod, CanonicalRecord, CanonicalRow, PartialRecord};
use log::debug;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct Canonicalizer {
    taxonomy: Taxonomy,
    periods: PeriodNormalizer,
    min_row_name_len: usize,
    policy: ConflictPolicy,
}

/// True when `phrase` occurs in `text` with no letter or digit directly on
/// either side.
pub(crate) fn contains_word(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    text.match_indices(phrase).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn display_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(':').trim_end().to_string()
}

fn normalize_name(name: &str) -> String {
    display_name(name).to_lowercase()
}

impl Canonicalizer {
    pub fn new(
        taxonomy: Taxonomy,
        periods: PeriodNormalizer,
        min_row_name_len: usize,
        policy: ConflictPolicy,
    ) -> Self {
        Self {
            taxonomy,
            periods,
            min_row_name_len,
            policy,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.taxonomy.clone(),
            PeriodNormalizer::new(config.min_year, config.reference_year()),
            config.min_row_name_len,
            config.conflict_policy,
        )
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn normalize_period(&self, label: &str) -> Option<CanonicalPeriod> {
        self.periods.normalize(label)
    }

    /// The canonical key for a row name, or the reason it does not belong in
    /// an income statement.
    ///
    /// A name that is an exact alias variant (`PAT`, `EPS`) skips the length
    /// and keyword screens. Junk and cash flow tokens still apply to it.
    pub fn row_key(&self, name: &str) -> Result<String, RowRejection> {
        let key = normalize_name(name);
        let alias = self.alias_for(&key);

        if alias.is_none() {
            if key.chars().count() < self.min_row_name_len {
                return Err(RowRejection::TooShort);
            }
            if !self
                .taxonomy
                .income_keywords
                .iter()
                .any(|k| key.contains(k.as_str()))
            {
                return Err(RowRejection::NoIncomeKeyword);
            }
        }
        if let Some(token) = self
            .taxonomy
            .junk_tokens
            .iter()
            .find(|t| contains_word(&key, t))
        {
            return Err(RowRejection::Junk(token.clone()));
        }
        if let Some(token) = self
            .taxonomy
            .cash_flow_tokens
            .iter()
            .find(|t| key.contains(t.as_str()))
        {
            return Err(RowRejection::CashFlow(token.clone()));
        }

        Ok(alias.map(str::to_string).unwrap_or(key))
    }

    fn alias_for(&self, key: &str) -> Option<&str> {
        self.taxonomy
            .aliases
            .iter()
            .find(|entry| entry.variants.iter().any(|v| v == key))
            .map(|entry| entry.canonical.as_str())
    }

    /// Reduces one partial record to canonical keys and periods. Rejected rows
    /// and period labels are reported to `audit` and otherwise dropped.
    pub fn canonicalize(
        &self,
        record: PartialRecord,
        audit: &mut Vec<AuditEvent>,
    ) -> CanonicalRecord {
        let mut periods: Vec<CanonicalPeriod> = Vec::new();
        let mut rejected_labels: BTreeSet<String> = BTreeSet::new();

        let mut resolve = |label: &str, periods: &mut Vec<CanonicalPeriod>| {
            match self.periods.normalize(label) {
                Some(period) => {
                    if !periods.contains(&period) {
                        periods.push(period);
                    }
                    Some(period)
                }
                None => {
                    if rejected_labels.insert(label.to_string()) {
                        debug!("Rejected period label '{}'", label);
                        audit.push(AuditEvent::PeriodRejected {
                            label: label.to_string(),
                        });
                    }
                    None
                }
            }
        };

        for label in &record.years {
            resolve(label.as_str(), &mut periods);
        }

        let mut rows: Vec<CanonicalRow> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut row_rejections = Vec::new();

        for raw in record.rows {
            let key = match self.row_key(&raw.name) {
                Ok(key) => key,
                Err(reason) => {
                    debug!("Rejected row '{}': {:?}", raw.name.trim(), reason);
                    row_rejections.push(AuditEvent::RowRejected {
                        name: raw.name.trim().to_string(),
                        reason,
                    });
                    continue;
                }
            };

            let slot = *index.entry(key.clone()).or_insert_with(|| {
                rows.push(CanonicalRow::new(key).with_label(display_name(&raw.name)));
                rows.len() - 1
            });

            for (label, value) in raw.values {
                if let Some(period) = resolve(label.as_str(), &mut periods) {
                    self.policy.offer(&mut rows[slot].values, period, &value);
                }
            }
        }

        audit.extend(row_rejections);

        CanonicalRecord {
            currency: record.currency,
            unit: record.unit,
            periods,
            rows,
        }
    }
}
