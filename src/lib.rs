//! # Income Statement Reconciler
//!
//! A library for turning the noisy, chunk-by-chunk extractions of a financial
//! statement into one canonical, period-aligned income statement.
//!
//! ## Core Concepts
//!
//! - **Chunks**: The document text is cut into bounded slices, each parsed on its own
//! - **Partial Records**: What the inference service made of one chunk; incomplete and often inconsistent
//! - **Canonical Taxonomy**: Row names and period labels are folded onto one vocabulary
//!   (`Revenue from operations` and `Sales` both become `revenue`, `FY 2023-24` becomes `2024`)
//! - **Reconciliation**: Partial records are merged in chunk order with a deterministic conflict policy
//! - **Dataset**: The validated result; every value is a plain decimal string or `MISSING`
//!
//! ## Example
//!
//! ```rust,ignore
//! use income_statement_reconciler::*;
//! use income_statement_reconciler::llm::GroqClient;
//!
//! let client = GroqClient::from_env()?;
//! let pipeline = IncomeStatementPipeline::new(PipelineConfig::default(), client)?;
//!
//! let outcome = pipeline
//!     .run_from_producer(&TextFileProducer::new("annual_report.txt"))
//!     .await?;
//!
//! println!("{}", outcome.dataset.to_markdown());
//! ```
//!
//! Without a model, [`RuleBasedService`] reads the same chunks with fixed
//! line rules:
//!
//! ```rust,ignore
//! let config = PipelineConfig::default();
//! let service = RuleBasedService::from_config(&config);
//! let pipeline = IncomeStatementPipeline::new(config, service)?;
//! ```

pub mod aggregator;
pub mod audit;
pub mod canonical;
pub mod chunker;
pub mod config;
pub mod error;
pub mod export;
pub mod extractor;
pub mod ingestion;
pub mod llm;
pub mod periods;
pub mod retry;
pub mod rules;
pub mod schema;
pub mod validator;

pub use aggregator::{merge_records, ConflictPolicy, MergeState, MergedTable};
pub use audit::{AuditEvent, RowRejection, RunState};
pub use canonical::Canonicalizer;
pub use chunker::{join_segments, split_into_chunks, ChunkSplitter};
pub use config::{AliasEntry, PipelineConfig, Taxonomy};
pub use error::{ReconcileError, Result};
pub use extractor::{ChunkOutcome, InferenceRequest, InferenceService, PartialExtractor};
pub use ingestion::*;
pub use periods::{detect_period_hints, PeriodNormalizer};
pub use retry::RetryPolicy;
pub use rules::RuleBasedService;
pub use schema::*;
pub use validator::{clean_value, validate};

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;

/// The dataset of one run and everything that was absorbed to produce it.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub dataset: Dataset,
    pub audit: Vec<AuditEvent>,
}

struct RunTrace {
    state: RunState,
    audit: Vec<AuditEvent>,
}

impl RunTrace {
    fn new(initial: RunState) -> Self {
        info!("Run state: {:?}", initial);
        Self {
            state: initial,
            audit: vec![AuditEvent::StateEntered { state: initial }],
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            info!("Run state: {:?} -> {:?}", self.state, next);
            self.state = next;
            self.audit.push(AuditEvent::StateEntered { state: next });
        }
    }

    fn finish(self, dataset: Dataset) -> RunOutcome {
        debug_assert!(self.state.is_terminal());
        RunOutcome {
            dataset,
            audit: self.audit,
        }
    }
}

pub struct IncomeStatementPipeline<S> {
    config: PipelineConfig,
    extractor: PartialExtractor<S>,
    canonicalizer: Canonicalizer,
}

impl<S: InferenceService> IncomeStatementPipeline<S> {
    pub fn new(config: PipelineConfig, service: S) -> Result<Self> {
        config.validate()?;
        let extractor = PartialExtractor::new(service, &config);
        let canonicalizer = Canonicalizer::from_config(&config);
        Ok(Self {
            config,
            extractor,
            canonicalizer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn service(&self) -> &S {
        self.extractor.service()
    }

    pub async fn run_from_producer(&self, producer: &dyn SegmentProducer) -> Result<RunOutcome> {
        let segments = producer.extract()?;
        self.run(&segments).await
    }

    /// Runs the whole pipeline over `segments`. Fails only when the segments
    /// hold no text at all; every chunk-level failure is absorbed and shows up
    /// in the audit trail instead.
    pub async fn run(&self, segments: &[TextSegment]) -> Result<RunOutcome> {
        let mut trace = RunTrace::new(RunState::Collecting);
        if segments.iter().all(|s| s.trim().is_empty()) {
            warn!("No usable text in {} segments", segments.len());
            return Err(ReconcileError::NoContent);
        }

        trace.advance();
        let text = join_segments(segments);
        let chunks =
            split_into_chunks(&text, self.config.max_chunk_len, self.config.min_chunk_len);
        info!(
            "Split {} characters into {} chunks ({} skipped)",
            text.chars().count(),
            chunks.len(),
            chunks.iter().filter(|c| c.skip).count()
        );

        trace.advance();
        let outcomes = self.parse_all(&chunks, &mut trace.audit).await;

        let mut records = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes {
            trace.audit.push(match &outcome {
                ChunkOutcome::Skipped => AuditEvent::ChunkSkipped { index },
                ChunkOutcome::NoSignal => AuditEvent::ChunkEmpty { index },
                ChunkOutcome::Parsed(record) if record.is_empty() => {
                    AuditEvent::ChunkEmpty { index }
                }
                ChunkOutcome::Parsed(record) => AuditEvent::ChunkParsed {
                    index,
                    rows: record.rows.len(),
                },
                ChunkOutcome::Failed { attempts, reason } => AuditEvent::ChunkFailed {
                    index,
                    attempts: *attempts,
                    reason: reason.clone(),
                },
            });
            if let Some(record) = outcome.into_record() {
                records.push(record);
            }
        }

        let dataset = reconcile(&self.canonicalizer, &self.config, records, &mut trace);
        Ok(trace.finish(dataset))
    }

    /// Parses every chunk with bounded concurrency and returns the outcomes in
    /// chunk order, whatever order they completed in.
    async fn parse_all(
        &self,
        chunks: &[Chunk],
        audit: &mut Vec<AuditEvent>,
    ) -> Vec<(usize, ChunkOutcome)> {
        let mut parses = std::pin::pin!(stream::iter(chunks)
            .map(|chunk| async move { (chunk.index, self.extractor.parse_chunk(chunk).await) })
            .buffer_unordered(self.config.max_concurrency));

        let mut outcomes: Vec<(usize, ChunkOutcome)> = Vec::with_capacity(chunks.len());
        let drain = async {
            while let Some(outcome) = parses.next().await {
                debug!("Chunk {} finished", outcome.0);
                outcomes.push(outcome);
            }
        };

        match self.config.run_timeout() {
            Some(limit) => {
                if tokio::time::timeout(limit, drain).await.is_err() {
                    warn!(
                        "Parsing stage hit the run timeout of {:?} with {}/{} chunks done",
                        limit,
                        outcomes.len(),
                        chunks.len()
                    );
                }
            }
            None => drain.await,
        }

        let mut done = vec![false; chunks.len()];
        for (index, _) in &outcomes {
            done[*index] = true;
        }
        for chunk in chunks.iter().filter(|c| !done[c.index]) {
            audit.push(AuditEvent::ChunkFailed {
                index: chunk.index,
                attempts: 0,
                reason: "run timed out before the chunk was parsed".to_string(),
            });
        }

        outcomes.sort_by_key(|(index, _)| *index);
        outcomes
    }
}

fn reconcile(
    canonicalizer: &Canonicalizer,
    config: &PipelineConfig,
    records: Vec<PartialRecord>,
    trace: &mut RunTrace,
) -> Dataset {
    trace.advance();
    let canonical: Vec<CanonicalRecord> = records
        .into_iter()
        .map(|record| canonicalizer.canonicalize(record, &mut trace.audit))
        .collect();

    trace.advance();
    let table = merge_records(
        canonical,
        config.conflict_policy,
        config.period_cap,
        &mut trace.audit,
    );

    trace.advance();
    let dataset = validate(table, &mut trace.audit);

    trace.advance();
    dataset
}

/// Reconciles records that are already in hand, in the order given, without
/// any inference calls.
pub fn reconcile_records(
    records: Vec<PartialRecord>,
    config: &PipelineConfig,
) -> Result<RunOutcome> {
    config.validate()?;
    let canonicalizer = Canonicalizer::from_config(config);
    let mut trace = RunTrace::new(RunState::Parsing);
    let dataset = reconcile(&canonicalizer, config, records, &mut trace);
    Ok(trace.finish(dataset))
}
