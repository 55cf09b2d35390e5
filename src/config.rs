use crate::aggregator::ConflictPolicy;
use crate::error::{ReconcileError, Result};
use crate::retry::RetryPolicy;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Every tunable of a run. Unspecified fields take their defaults, so a JSON
/// file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum chunk length, in characters
    pub max_chunk_len: usize,
    /// Chunks whose trimmed length falls below this are never parsed
    pub min_chunk_len: usize,
    /// Number of most recent periods kept in the final dataset
    pub period_cap: usize,
    pub min_row_name_len: usize,
    /// Earliest fiscal year accepted as a period
    pub min_year: i32,
    /// Year used to resolve bare quarter/month-span labels and to bound
    /// accepted periods. Defaults to the current calendar year.
    pub reference_year: Option<i32>,
    pub max_concurrency: usize,
    /// Characters of filtered chunk text sent to the inference service
    pub max_text_len: usize,
    pub retry: RetryPolicy,
    pub per_call_timeout_secs: u64,
    /// Upper bound on the whole parsing stage
    pub run_timeout_secs: Option<u64>,
    pub conflict_policy: ConflictPolicy,
    pub taxonomy: Taxonomy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_len: 3500,
            min_chunk_len: 200,
            period_cap: 7,
            min_row_name_len: 4,
            min_year: 2010,
            reference_year: None,
            max_concurrency: 4,
            max_text_len: 50_000,
            retry: RetryPolicy::default(),
            per_call_timeout_secs: 60,
            run_timeout_secs: None,
            conflict_policy: ConflictPolicy::default(),
            taxonomy: Taxonomy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }

    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_secs(self.per_call_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_chunk_len", self.max_chunk_len),
            ("period_cap", self.period_cap),
            ("max_concurrency", self.max_concurrency),
            ("max_text_len", self.max_text_len),
            ("retry.max_attempts", self.retry.max_attempts as usize),
            ("per_call_timeout_secs", self.per_call_timeout_secs as usize),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ReconcileError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    field
                )));
            }
        }

        if self.min_chunk_len > self.max_chunk_len {
            return Err(ReconcileError::InvalidConfig(format!(
                "min_chunk_len ({}) exceeds max_chunk_len ({})",
                self.min_chunk_len, self.max_chunk_len
            )));
        }

        if self.min_year > self.reference_year() + 1 {
            return Err(ReconcileError::InvalidConfig(format!(
                "min_year {} lies after the latest accepted year {}",
                self.min_year,
                self.reference_year() + 1
            )));
        }

        if self.taxonomy.income_keywords.is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "taxonomy.income_keywords must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// One canonical line item and the exact labels that fold into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub canonical: String,
    pub variants: Vec<String>,
}

impl AliasEntry {
    fn new(canonical: &str, variants: &[&str]) -> Self {
        Self {
            canonical: canonical.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// The vocabulary that decides which rows belong to an income statement and
/// what they are called. Versioned so a dataset can be traced to the tables
/// that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Taxonomy {
    pub version: String,
    /// A row name must contain at least one of these
    pub income_keywords: Vec<String>,
    /// Whole-word matches reject a row outright
    pub junk_tokens: Vec<String>,
    /// Substring matches reject a row as belonging to the cash flow statement
    pub cash_flow_tokens: Vec<String>,
    /// Looked up in order; the first entry with an exact variant match wins
    pub aliases: Vec<AliasEntry>,
    pub section_start_markers: Vec<String>,
    pub section_end_markers: Vec<String>,
    /// Lines without a digit survive the noise filter only if they contain one
    /// of these
    pub line_keywords: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            version: "2024.1".to_string(),
            income_keywords: strings(&[
                "revenue",
                "income",
                "expense",
                "expenditure",
                "cost",
                "depreciation",
                "amortisation",
                "amortization",
                "finance",
                "interest",
                "ebitda",
                "profit",
                "loss",
                "tax",
                "eps",
                "earning",
                "margin",
                "turnover",
                "sales",
                "charges",
                "employee",
                "salary",
                "salaries",
                "wages",
                "materials",
                "purchases",
                "inventories",
                "exceptional",
                "dividend",
            ]),
            junk_tokens: strings(&[
                "gate",
                "page",
                "particulars",
                "note no",
                "schedule",
                "sr no",
                "s no",
                "www",
                "http",
                "registered office",
                "cin",
                "din",
                "signature",
                "chartered accountants",
                "firm registration",
                "membership no",
                "for and on behalf",
            ]),
            cash_flow_tokens: strings(&[
                "repayment",
                "lease liabilit",
                "operating activities",
                "investing activities",
                "financing activities",
                "cash flow",
                "cash generated",
                "net cash",
                "cash and cash equivalents",
                "proceeds from",
                "purchase of property",
                "interest paid",
                "dividend paid",
                "dividends paid",
                "taxes paid",
                "tax paid",
                "working capital",
            ]),
            aliases: vec![
                AliasEntry::new(
                    "revenue",
                    &[
                        "revenue",
                        "revenue from operations",
                        "income from operations",
                        "sales",
                        "net sales",
                        "operating revenue",
                    ],
                ),
                AliasEntry::new(
                    "other income",
                    &["other income", "non operating income", "miscellaneous income"],
                ),
                AliasEntry::new(
                    "total income",
                    &["total income", "total revenue", "gross income"],
                ),
                AliasEntry::new(
                    "cost of materials consumed",
                    &[
                        "cost of materials",
                        "cost of materials consumed",
                        "raw material",
                        "materials consumed",
                        "cost of goods sold",
                        "cogs",
                    ],
                ),
                AliasEntry::new(
                    "employee benefits expense",
                    &[
                        "employee benefits",
                        "employee benefits expense",
                        "employee benefit expense",
                        "employee cost",
                        "salary",
                        "wages",
                        "staff cost",
                        "personnel expense",
                    ],
                ),
                AliasEntry::new(
                    "depreciation and amortisation",
                    &[
                        "depreciation",
                        "amortisation",
                        "depreciation and amortisation",
                        "depreciation and amortization",
                        "depreciation and amortisation expense",
                        "depreciation and amortization expense",
                    ],
                ),
                AliasEntry::new(
                    "finance costs",
                    &[
                        "finance cost",
                        "finance costs",
                        "interest expense",
                        "borrowing cost",
                        "interest cost",
                    ],
                ),
                AliasEntry::new(
                    "other expenses",
                    &[
                        "other expenses",
                        "administrative expenses",
                        "selling expenses",
                        "distribution expenses",
                        "operating expenses",
                    ],
                ),
                AliasEntry::new(
                    "total expenses",
                    &["total expenses", "total cost", "total expenditure"],
                ),
                AliasEntry::new(
                    "ebitda",
                    &[
                        "ebitda",
                        "operating profit",
                        "operating income",
                        "earnings before interest",
                    ],
                ),
                AliasEntry::new(
                    "profit before tax",
                    &["profit before tax", "pbt", "profit before taxation"],
                ),
                AliasEntry::new(
                    "tax expense",
                    &["tax", "tax expense", "provision for tax", "income tax"],
                ),
                AliasEntry::new(
                    "net profit",
                    &[
                        "net profit",
                        "profit after tax",
                        "pat",
                        "net income",
                        "profit for the year",
                        "profit for the period",
                    ],
                ),
                AliasEntry::new(
                    "eps",
                    &["earnings per share", "eps", "basic eps", "diluted eps"],
                ),
            ],
            section_start_markers: strings(&[
                "consolidated statement of profit and loss",
                "statement of profit and loss",
                "statement of profit & loss",
                "consolidated statement of profit",
                "income statement",
                "profit and loss",
                "consolidated income",
            ]),
            section_end_markers: strings(&[
                "balance sheet",
                "statement of financial position",
                "statement of cash flows",
                "cash flow statement",
                "notes to accounts",
                "notes to the financial statements",
            ]),
            line_keywords: strings(&[
                "revenue",
                "income",
                "profit",
                "loss",
                "tax",
                "expense",
                "cost",
                "ebitda",
                "depreciation",
                "interest",
                "finance",
                "employee",
                "salary",
                "wages",
                "eps",
                "earning",
                "dividend",
            ]),
        }
    }
}
