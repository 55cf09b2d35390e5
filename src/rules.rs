//! A local [`InferenceService`] that reads income statement lines with fixed
//! rules instead of a model.
//!
//! A line is kept when its label mentions one of the taxonomy's alias
//! variants. The numbers at the end of the line are paired, left to right,
//! with the fiscal-year columns detected in the chunk.

use crate::canonical::contains_word;
use crate::config::{PipelineConfig, Taxonomy};
use crate::error::Result;
use crate::extractor::{InferenceRequest, InferenceService};
use crate::schema::{PartialRecord, RawRow};
use async_trait::async_trait;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

static AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(?-?\d[\d,]*(?:\.\d+)?\)?").expect("valid regex"));

static YEAR_COLUMN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^20\d{2}$").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct RuleBasedService {
    variants: Vec<String>,
}

impl RuleBasedService {
    pub fn new(taxonomy: &Taxonomy) -> Self {
        let mut variants: Vec<String> = taxonomy
            .aliases
            .iter()
            .flat_map(|entry| entry.variants.iter().cloned())
            .collect();
        // Longest first, so "profit before tax" is tried before "tax".
        variants.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        variants.dedup();
        Self { variants }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.taxonomy)
    }

    fn matched_variant(&self, label: &str) -> Option<&str> {
        let lowered = label.to_lowercase();
        self.variants
            .iter()
            .find(|v| contains_word(&lowered, v))
            .map(String::as_str)
    }

    /// The record for one request. Never fails; a chunk with no recognisable
    /// line or no year columns yields an empty record.
    pub fn extract(&self, request: &InferenceRequest) -> PartialRecord {
        let years: Vec<String> = request
            .period_hints
            .iter()
            .filter(|h| YEAR_COLUMN.is_match(h))
            .cloned()
            .collect();
        if years.is_empty() {
            debug!("No year columns among {:?}", request.period_hints);
            return PartialRecord::empty();
        }

        let mut rows = Vec::new();
        for line in request.text.lines() {
            let Some(first) = AMOUNT.find(line) else {
                continue;
            };
            let label = line[..first.start()]
                .trim()
                .trim_end_matches(|c: char| matches!(c, ':' | '-' | '.'))
                .trim();
            if label.is_empty() {
                continue;
            }
            let Some(variant) = self.matched_variant(label) else {
                continue;
            };

            let amounts: Vec<&str> = AMOUNT
                .find_iter(&line[first.start()..])
                .map(|m| m.as_str())
                .filter(|a| !years.iter().any(|y| y.as_str() == *a))
                .collect();
            if amounts.is_empty() {
                continue;
            }

            // Statement values sit at the right end of the line.
            let tail = &amounts[amounts.len().saturating_sub(years.len())..];
            let values: Vec<(&str, &str)> = years
                .iter()
                .map(String::as_str)
                .zip(tail.iter().copied())
                .collect();
            debug!("Rule hit: '{}' via '{}' -> {:?}", label, variant, values);
            rows.push(RawRow::new(label, &values));
        }

        info!("Rule extraction found {} rows", rows.len());
        PartialRecord {
            years,
            rows,
            ..PartialRecord::default()
        }
    }
}

#[async_trait]
impl InferenceService for RuleBasedService {
    async fn complete(&self, request: &InferenceRequest) -> Result<String> {
        Ok(serde_json::to_string(&self.extract(request))?)
    }
}
