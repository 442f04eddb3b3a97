//! Result parsing: model free text → [`AnalysisResult`].
//!
//! ## Known fragility
//!
//! The JSON block is located with a greedy span: from the first `{` or `[` to
//! the last `}` or `]` in the answer. This is not brace balancing. Prose with
//! stray braces before or after the JSON makes the span unparseable, and the
//! document is then reported as unverifiable. Models instructed to return
//! strict JSON rarely do this, so the simple rule is kept.

use crate::error::AnalysisError;
use crate::output::AnalysisResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

static RE_JSON_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\{.*\}|\[.*\])").unwrap());

/// Extract and parse the JSON value embedded in `text`.
///
/// Falls back to parsing the whole text when no brace span is found.
pub fn extract_json(text: &str) -> Result<Value, AnalysisError> {
    let candidate = RE_JSON_SPAN
        .find(text)
        .map(|m| m.as_str())
        .unwrap_or(text);

    serde_json::from_str(candidate).map_err(|e| {
        AnalysisError::MalformedOutput(format!("{} (answer was {} chars)", e, text.len()))
    })
}

/// Parse the model's answer into an [`AnalysisResult`].
///
/// The model's self-reported checklist is taken as is. An empty failure
/// reason is rebuilt from the checklist, and a FAILED verdict with every item
/// Found is logged as inconsistent.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let value = extract_json(text)?;
    let mut result: AnalysisResult = serde_json::from_value(value)
        .map_err(|e| AnalysisError::MalformedOutput(format!("unexpected shape: {}", e)))?;

    if let AnalysisResult::Failed {
        compliance_summary: Some(summary),
        failure_reason,
    } = &mut result
    {
        if summary.is_complete() {
            warn!("Model reported FAILED although every checklist item is Found");
        }
        if failure_reason.trim().is_empty() && !summary.missing().is_empty() {
            *failure_reason = summary.failure_reason();
        }
        debug!("Missing checklist items: {:?}", summary.missing());
    }

    Ok(result)
}
