// Prompts for per-chunk income statement extraction

use crate::error::Result;
use crate::extractor::InferenceRequest;
use crate::schema::PartialRecord;

pub const SYSTEM_PROMPT: &str = "You must output valid JSON only.";

pub const EXTRACTION_RULES: &str = r#"
You are a conservative financial analytics assistant. Extract an income-statement-like table from the text below.
Return STRICT JSON only (no explanation, no markdown fences), matching the OUTPUT SCHEMA below.

## RULES (BE STRICT)
- Do NOT invent numbers. Only return numbers exactly as they appear in the provided text.
- `years` lists the column period labels exactly as written ("2024", "FY 2023-24", "Q2 2023"). Always strings.
- Every key of a row's `values` must be one of the labels in `years`.
- Values must be strings, copied as printed (keep brackets, commas and signs).
- If a value cannot be located exactly, use "MISSING".
- Leave `currency` and `unit` empty if the text does not state them.
- Limit rows to income statement lines: revenue, other income, cost of materials, employee costs,
  other expenses, finance costs, depreciation, EBITDA, profit before tax, tax, profit after tax, EPS.
- Do NOT include balance sheet or cash flow lines.
- Use the DetectedPeriods list if helpful.
"#;

/// Rules, then the JSON schema of [`PartialRecord`], then the hints and text.
pub fn build_user_prompt(request: &InferenceRequest) -> Result<String> {
    let schema = PartialRecord::schema_as_json()?;
    let hints = if request.period_hints.is_empty() {
        "[]".to_string()
    } else {
        format!(
            "[{}]",
            request
                .period_hints
                .iter()
                .map(|h| format!("\"{}\"", h))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    Ok(format!(
        "{}\n## OUTPUT SCHEMA\n{}\n\nDetectedPeriods: {}\n\nTEXT:\n{}\n",
        EXTRACTION_RULES.trim_start(),
        schema,
        hints,
        request.text
    ))
}
