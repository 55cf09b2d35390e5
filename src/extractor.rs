//! The boundary between the pipeline and the inference service.
//!
//! [`PartialExtractor`] narrows a chunk down to its income statement lines,
//! asks the service for a [`PartialRecord`], and absorbs every failure along
//! the way: malformed output, transport errors and timeouts all end in an
//! empty record, never in an error.

use crate::config::{PipelineConfig, Taxonomy};
use crate::error::{ReconcileError, Result};
use crate::periods::detect_period_hints;
use crate::retry::RetryPolicy;
use crate::schema::{Chunk, PartialRecord};
use async_trait::async_trait;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;

static PAGE_FURNITURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?:page|pg)\.?\s*\d+(?:\s*(?:of|/)\s*\d+)?$|www\.|\d{1,3}$)")
        .expect("valid regex")
});

/// What the service is asked to structure for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferenceRequest {
    /// Filtered chunk text
    pub text: String,
    /// Period-like substrings found in the chunk, in first-seen order
    pub period_hints: Vec<String>,
}

/// Turns one chunk of statement text into a JSON document describing a
/// [`PartialRecord`]. Responses may carry commentary around the JSON.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> Result<String>;
}

#[async_trait]
impl<S: InferenceService + ?Sized> InferenceService for std::sync::Arc<S> {
    async fn complete(&self, request: &InferenceRequest) -> Result<String> {
        (**self).complete(request).await
    }
}

/// How a single chunk fared.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// Below the minimum signal length; never sent
    Skipped,
    /// Nothing survived line filtering; never sent
    NoSignal,
    Parsed(PartialRecord),
    /// Every attempt failed; the chunk contributes an empty record
    Failed { attempts: u32, reason: String },
}

impl ChunkOutcome {
    pub fn into_record(self) -> Option<PartialRecord> {
        match self {
            ChunkOutcome::Skipped | ChunkOutcome::NoSignal => None,
            ChunkOutcome::Parsed(record) => Some(record),
            ChunkOutcome::Failed { .. } => Some(PartialRecord::empty()),
        }
    }
}

pub struct PartialExtractor<S> {
    service: S,
    retry: RetryPolicy,
    per_call_timeout: Duration,
    max_text_len: usize,
    start_markers: Vec<String>,
    end_markers: Vec<String>,
    line_keywords: Vec<String>,
}

impl<S: InferenceService> PartialExtractor<S> {
    pub fn new(service: S, config: &PipelineConfig) -> Self {
        let Taxonomy {
            section_start_markers,
            section_end_markers,
            line_keywords,
            ..
        } = config.taxonomy.clone();

        Self {
            service,
            retry: config.retry.clone(),
            per_call_timeout: config.per_call_timeout(),
            max_text_len: config.max_text_len,
            start_markers: lowercased(section_start_markers),
            end_markers: lowercased(section_end_markers),
            line_keywords: lowercased(line_keywords),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// `None` when the chunk is skipped or holds no candidate lines. Failed
    /// calls yield [`PartialRecord::empty`].
    pub async fn parse(&self, chunk: &Chunk) -> Option<PartialRecord> {
        self.parse_chunk(chunk).await.into_record()
    }

    pub async fn parse_chunk(&self, chunk: &Chunk) -> ChunkOutcome {
        if chunk.skip {
            return ChunkOutcome::Skipped;
        }

        let Some(request) = self.prepare(&chunk.text) else {
            debug!("Chunk {} has no candidate lines after filtering", chunk.index);
            return ChunkOutcome::NoSignal;
        };

        let result = self
            .retry
            .run(|attempt| {
                let request = &request;
                async move {
                    debug!("Chunk {}: inference attempt {}", chunk.index, attempt);
                    self.attempt(request).await
                }
            })
            .await;

        match result {
            Ok(record) => ChunkOutcome::Parsed(record),
            Err(e) => {
                warn!("Chunk {} contributes nothing: {}", chunk.index, e);
                ChunkOutcome::Failed {
                    attempts: self.retry.max_attempts.max(1),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn attempt(&self, request: &InferenceRequest) -> Result<PartialRecord> {
        let response = tokio::time::timeout(self.per_call_timeout, self.service.complete(request))
            .await
            .map_err(|_| ReconcileError::Timeout(self.per_call_timeout))??;
        parse_response(&response)
    }

    /// Builds the request for `text`, or `None` when nothing worth sending
    /// remains.
    pub fn prepare(&self, text: &str) -> Option<InferenceRequest> {
        let window = self.section_window(text);
        let filtered = self.filter_lines(window);
        if filtered.trim().is_empty() {
            return None;
        }

        Some(InferenceRequest {
            text: truncate_chars(&filtered, self.max_text_len).to_string(),
            period_hints: detect_period_hints(window),
        })
    }

    /// The slice from the first start marker up to the first end marker after
    /// it. Without a start marker the whole text is kept.
    pub fn section_window<'a>(&self, text: &'a str) -> &'a str {
        // ASCII lowering keeps byte offsets aligned with `text`.
        let lowered = text.to_ascii_lowercase();

        let Some(start) = self
            .start_markers
            .iter()
            .filter_map(|m| lowered.find(m.as_str()))
            .min()
        else {
            return text;
        };

        let end = self
            .end_markers
            .iter()
            .filter_map(|m| lowered[start..].find(m.as_str()).map(|i| start + i))
            .filter(|i| *i > start)
            .min()
            .unwrap_or(text.len());

        &text[start..end]
    }

    /// Drops blank lines, page furniture, and lines with neither a digit nor
    /// a finance keyword. Surviving lines have their whitespace collapsed.
    pub fn filter_lines(&self, text: &str) -> String {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !PAGE_FURNITURE.is_match(line))
            .filter(|line| {
                if line.chars().any(|c| c.is_ascii_digit()) {
                    return true;
                }
                let lowered = line.to_lowercase();
                self.line_keywords.iter().any(|k| lowered.contains(k.as_str()))
            })
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn lowercased(items: Vec<String>) -> Vec<String> {
    items.into_iter().map(|s| s.to_lowercase()).collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Parses a service response, falling back to the outermost balanced JSON
/// object when the response carries surrounding commentary.
pub fn parse_response(response: &str) -> Result<PartialRecord> {
    match serde_json::from_str::<PartialRecord>(response.trim()) {
        Ok(record) => Ok(record),
        Err(first) => match extract_json_object(response) {
            Some(candidate) => {
                debug!("Direct JSON parse failed ({}); retrying on braces", first);
                Ok(serde_json::from_str::<PartialRecord>(candidate)?)
            }
            None => Err(first.into()),
        },
    }
}

/// The substring from the first `{` to its matching `}`. Braces inside string
/// literals do not count. `None` when the braces never balance.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
