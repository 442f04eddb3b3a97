//! Human-readable Markdown report for one analysed document.
//!
//! A failed audit explains itself with one sentence per missing checklist
//! item, never mentioning the items that were found. A valid document is laid
//! out as four steps: patient summary, diagnosis, medication, next steps.

use crate::output::{AnalysisResult, CheckStatus, ChecklistItem, FileReport};
use std::fmt::Write as _;

/// Render a [`FileReport`] as Markdown.
pub fn render_report(report: &FileReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## 📄 File: {}\n", report.file);
    match &report.analysis {
        AnalysisResult::Failed {
            compliance_summary,
            failure_reason,
        } => {
            out.push_str("**❌ Document Validation Failed**\n\n");
            match compliance_summary {
                Some(summary) => {
                    out.push_str("### Why it failed\n\n");
                    let missing = summary.missing();
                    if missing.is_empty() {
                        let _ = writeln!(out, "{}\n", fallback(failure_reason, "No reason given."));
                    }
                    for (n, item) in missing.iter().enumerate() {
                        let _ = writeln!(out, "{}. {}", n + 1, item.missing_explanation());
                    }
                    if !missing.is_empty() {
                        out.push('\n');
                    }

                    out.push_str("### Validation Details\n\n");
                    let details: Vec<String> = ChecklistItem::ALL
                        .iter()
                        .map(|item| {
                            let mark = match summary.status(*item) {
                                CheckStatus::Found => "✅",
                                CheckStatus::Missing => "❌",
                            };
                            format!("{} {}", mark, item.short_label())
                        })
                        .collect();
                    let _ = writeln!(out, "{}", details.join(" | "));
                }
                None => {
                    let _ = writeln!(out, "{}", fallback(failure_reason, "No reason given."));
                }
            }
        }
        AnalysisResult::Valid {
            patient_data,
            summary_for_human,
            disease_explanation,
            medication_info,
            hospital_guide,
        } => {
            out.push_str("**✅ Document Verified & Analyzed Successfully**\n\n");

            out.push_str("### 🧑 Step 1: Patient Summary\n\n");
            let _ = writeln!(
                out,
                "**Patient:** {} | **Age:** {} | **Sex:** {}\n",
                fallback(&patient_data.name, "Unknown"),
                fallback(&patient_data.age, "Unknown"),
                fallback(&patient_data.sex, "Unknown"),
            );
            let _ = writeln!(out, "{}\n", fallback(summary_for_human, "No summary available."));

            out.push_str("### 🩺 Step 2: Diagnosis Explanation\n\n");
            let _ = writeln!(
                out,
                "{}\n",
                fallback(disease_explanation, "No explanation available.")
            );

            out.push_str("### 💊 Step 3: Medication Info\n\n");
            if medication_info.is_empty() {
                out.push_str("No medications found.\n\n");
            } else {
                for med in medication_info {
                    let _ = writeln!(out, "- {}", med);
                }
                out.push('\n');
            }

            out.push_str("### 🏥 Step 4: Hospital Guide & Next Steps\n\n");
            let _ = writeln!(out, "{}", fallback(hospital_guide, "Next steps not provided."));
        }
    }
    out
}

fn fallback<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}
