//! Output types: the analysis verdict for one document and its batch envelope.
//!
//! The shapes mirror the JSON contract the vision model is instructed to
//! answer with, so a parsed model response deserialises straight into
//! [`AnalysisResult`] and serialises back to the same wire form for API
//! consumers.

use crate::error::AnalysisError;
use crate::pipeline::validate::DocumentKind;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;

/// Failure reason used when the model answer cannot be parsed.
pub const UNVERIFIABLE_REASON: &str =
    "Model output parsing failed. The document structure could not be verified.";

// ── Checklist ────────────────────────────────────────────────────────────

/// Presence of one compliance element, as reported by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CheckStatus {
    Found,
    /// Anything the model did not clearly mark as found.
    #[default]
    Missing,
}

impl CheckStatus {
    /// Read a loosely typed checklist value. Only an unambiguous "found"
    /// (or `true`) counts as found.
    fn from_value(value: &Value) -> Self {
        let found = match value {
            Value::Bool(b) => *b,
            Value::String(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "found" | "present" | "yes" | "true"
            ),
            _ => false,
        };
        if found {
            CheckStatus::Found
        } else {
            CheckStatus::Missing
        }
    }
}

impl<'de> Deserialize<'de> for CheckStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(CheckStatus::from_value(&Value::deserialize(deserializer)?))
    }
}

/// The four fixed compliance checks, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecklistItem {
    PatientName,
    Date,
    Medication,
    PhysicianSignature,
}

impl ChecklistItem {
    pub const ALL: [ChecklistItem; 4] = [
        ChecklistItem::PatientName,
        ChecklistItem::Date,
        ChecklistItem::Medication,
        ChecklistItem::PhysicianSignature,
    ];

    /// JSON key inside `compliance_summary`.
    pub fn key(self) -> &'static str {
        match self {
            ChecklistItem::PatientName => "patient_name",
            ChecklistItem::Date => "date",
            ChecklistItem::Medication => "medication",
            ChecklistItem::PhysicianSignature => "physician_signature",
        }
    }

    /// Human label used in failure reasons.
    pub fn label(self) -> &'static str {
        match self {
            ChecklistItem::PatientName => "Patient Name",
            ChecklistItem::Date => "Date",
            ChecklistItem::Medication => "Medication",
            ChecklistItem::PhysicianSignature => "Physician Signature",
        }
    }

    /// Compact label for the validation-details grid.
    pub fn short_label(self) -> &'static str {
        match self {
            ChecklistItem::PatientName => "Name",
            ChecklistItem::Date => "Date",
            ChecklistItem::Medication => "Meds",
            ChecklistItem::PhysicianSignature => "Signature",
        }
    }

    /// One-sentence explanation shown when this element is missing.
    pub fn missing_explanation(self) -> &'static str {
        match self {
            ChecklistItem::PatientName => {
                "Patient name is missing. A valid medical report must clearly identify the patient."
            }
            ChecklistItem::Date => {
                "Report date is missing. The document must clearly specify when it was issued."
            }
            ChecklistItem::Medication => {
                "No medications identified. This system requires a prescription list for analysis."
            }
            ChecklistItem::PhysicianSignature => {
                "Doctor signature or authentication details are missing."
            }
        }
    }
}

/// The model's self-reported compliance checklist.
///
/// Always carries all four keys; a key absent from the model answer
/// deserialises as [`CheckStatus::Missing`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComplianceSummary {
    #[serde(default)]
    pub patient_name: CheckStatus,
    #[serde(default)]
    pub date: CheckStatus,
    #[serde(default)]
    pub medication: CheckStatus,
    #[serde(default)]
    pub physician_signature: CheckStatus,
}

impl ComplianceSummary {
    pub fn status(&self, item: ChecklistItem) -> CheckStatus {
        match item {
            ChecklistItem::PatientName => self.patient_name,
            ChecklistItem::Date => self.date,
            ChecklistItem::Medication => self.medication,
            ChecklistItem::PhysicianSignature => self.physician_signature,
        }
    }

    /// Missing elements in checklist order. Found elements never appear.
    pub fn missing(&self) -> Vec<ChecklistItem> {
        ChecklistItem::ALL
            .into_iter()
            .filter(|item| self.status(*item) == CheckStatus::Missing)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Failure reason naming only the missing elements.
    pub fn failure_reason(&self) -> String {
        let labels: Vec<&str> = self.missing().into_iter().map(ChecklistItem::label).collect();
        format!(
            "The document failed validation because the following specific item(s) are missing: {}",
            labels.join(", ")
        )
    }
}

// ── Verdict ──────────────────────────────────────────────────────────────

/// Demographics and clinical synopsis extracted from a valid document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatientData {
    #[serde(rename = "patient_name", default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "patient_age", default, deserialize_with = "lenient_string")]
    pub age: String,
    #[serde(rename = "patient_sex", default, deserialize_with = "lenient_string")]
    pub sex: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub clinical_info: String,
}

/// Verdict for one document. Exactly one shape is present, discriminated by
/// `document_status` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "document_status")]
pub enum AnalysisResult {
    #[serde(rename = "FAILED", alias = "Failed", alias = "failed")]
    Failed {
        /// Present when the model ran the checklist; absent for system and
        /// parse failures.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        compliance_summary: Option<ComplianceSummary>,
        #[serde(default, deserialize_with = "lenient_string")]
        failure_reason: String,
    },

    #[serde(rename = "VALID", alias = "Valid", alias = "valid")]
    Valid {
        #[serde(default)]
        patient_data: PatientData,
        #[serde(default, deserialize_with = "lenient_string")]
        summary_for_human: String,
        #[serde(default, deserialize_with = "lenient_string")]
        disease_explanation: String,
        #[serde(default, deserialize_with = "lenient_list")]
        medication_info: Vec<String>,
        #[serde(default, deserialize_with = "lenient_string")]
        hospital_guide: String,
    },
}

impl AnalysisResult {
    /// A `Failed` result describing an error that stopped the pipeline.
    pub fn system_error(err: &AnalysisError) -> Self {
        AnalysisResult::Failed {
            compliance_summary: None,
            failure_reason: format!("System Error: {err}"),
        }
    }

    /// The fixed `Failed` result used when the model answer is not valid JSON.
    pub fn unverifiable() -> Self {
        AnalysisResult::Failed {
            compliance_summary: None,
            failure_reason: UNVERIFIABLE_REASON.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, AnalysisResult::Valid { .. })
    }

    /// Wire value of `document_status`.
    pub fn status_label(&self) -> &'static str {
        match self {
            AnalysisResult::Failed { .. } => "FAILED",
            AnalysisResult::Valid { .. } => "VALID",
        }
    }

    pub fn compliance_summary(&self) -> Option<&ComplianceSummary> {
        match self {
            AnalysisResult::Failed {
                compliance_summary, ..
            } => compliance_summary.as_ref(),
            AnalysisResult::Valid { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            AnalysisResult::Failed { failure_reason, .. } => Some(failure_reason),
            AnalysisResult::Valid { .. } => None,
        }
    }
}

/// One entry of a batch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    /// Original file name as uploaded.
    pub file: String,
    pub analysis: AnalysisResult,
}

// ── Input ────────────────────────────────────────────────────────────────

/// A file received from an upload, before it is staged on disk.
#[derive(Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub content: Vec<u8>,
    /// MIME type declared by the client, if any. Informational only; the
    /// extension decides how the document is processed.
    pub content_type: Option<String>,
}

impl UploadedDocument {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn kind(&self) -> DocumentKind {
        DocumentKind::from_path(Path::new(&self.filename))
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

impl std::fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("filename", &self.filename)
            .field("content", &format_args!("<{} bytes>", self.content.len()))
            .field("content_type", &self.content_type)
            .finish()
    }
}

// ── Lenient field decoding ───────────────────────────────────────────────
//
// Models do not always honour the requested types: ages come back as
// numbers, empty fields as null, a single medication as a bare string.

fn value_to_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(Value::deserialize(deserializer)?))
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .map(value_to_text)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        other => {
            let text = value_to_text(other);
            if text.trim().is_empty() {
                Vec::new()
            } else {
                vec![text]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_lists_only_missing_items_in_order() {
        let summary = ComplianceSummary {
            patient_name: CheckStatus::Missing,
            date: CheckStatus::Found,
            medication: CheckStatus::Found,
            physician_signature: CheckStatus::Missing,
        };
        assert_eq!(
            summary.missing(),
            vec![ChecklistItem::PatientName, ChecklistItem::PhysicianSignature]
        );
        let reason = summary.failure_reason();
        assert!(reason.contains("Patient Name"));
        assert!(reason.contains("Physician Signature"));
        assert!(!reason.contains("Date"));
        assert!(!reason.contains("Medication"));
    }

    #[test]
    fn absent_checklist_keys_default_to_missing() {
        let summary: ComplianceSummary =
            serde_json::from_value(json!({ "patient_name": "Found" })).unwrap();
        assert_eq!(summary.patient_name, CheckStatus::Found);
        assert_eq!(summary.date, CheckStatus::Missing);
        assert_eq!(summary.missing().len(), 3);
    }

    #[test]
    fn loose_checklist_values_do_not_break_the_verdict() {
        let summary: ComplianceSummary = serde_json::from_value(json!({
            "patient_name": "FOUND",
            "date": "Not Found",
            "medication": "Found/Missing",
            "physician_signature": true
        }))
        .unwrap();
        assert_eq!(summary.patient_name, CheckStatus::Found);
        assert_eq!(summary.date, CheckStatus::Missing);
        assert_eq!(summary.medication, CheckStatus::Missing);
        assert_eq!(summary.physician_signature, CheckStatus::Found);

        let result: AnalysisResult = serde_json::from_value(json!({
            "document_status": "FAILED",
            "compliance_summary": { "patient_name": "Present", "date": null },
            "failure_reason": "Date is missing."
        }))
        .unwrap();
        let summary = result.compliance_summary().unwrap();
        assert_eq!(summary.patient_name, CheckStatus::Found);
        assert_eq!(summary.date, CheckStatus::Missing);
    }

    #[test]
    fn failed_serialises_with_status_tag() {
        let result = AnalysisResult::Failed {
            compliance_summary: Some(ComplianceSummary::default()),
            failure_reason: "x".into(),
        };
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["document_status"], "FAILED");
        assert_eq!(v["compliance_summary"]["date"], "Missing");
        assert_eq!(v["failure_reason"], "x");
    }

    #[test]
    fn system_error_omits_compliance_summary() {
        let err = AnalysisError::Configuration("OPENROUTER_API_KEY is not set".into());
        let v = serde_json::to_value(AnalysisResult::system_error(&err)).unwrap();
        assert!(v.get("compliance_summary").is_none());
        assert!(v["failure_reason"]
            .as_str()
            .unwrap()
            .starts_with("System Error: Configuration error"));
    }

    #[test]
    fn valid_accepts_loosely_typed_fields() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "document_status": "VALID",
            "patient_data": {
                "patient_name": "Jane Roe",
                "patient_age": 45,
                "patient_sex": null,
                "clinical_info": "Fever."
            },
            "summary_for_human": "The patient, Jane Roe, aged 45...",
            "disease_explanation": "A viral infection.",
            "medication_info": "Paracetamol 500mg: twice daily",
            "hospital_guide": "Rest."
        }))
        .unwrap();

        match result {
            AnalysisResult::Valid {
                patient_data,
                medication_info,
                ..
            } => {
                assert_eq!(patient_data.age, "45");
                assert_eq!(patient_data.sex, "");
                assert_eq!(medication_info, vec!["Paracetamol 500mg: twice daily"]);
            }
            other => panic!("expected Valid, got {other:?}"),
        }
    }

    #[test]
    fn upload_debug_hides_content() {
        let doc = UploadedDocument::new("scan.png", vec![0u8; 2048]).with_content_type("image/png");
        let dbg = format!("{doc:?}");
        assert!(dbg.contains("<2048 bytes>"));
        assert_eq!(doc.kind(), DocumentKind::Image);
    }
}
