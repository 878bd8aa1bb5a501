// AUDIT REPORT
// Structured result of a run plus its text and JSON renderings.
// Formatting lives here only; validators never print.

use crate::address::Address;
use crate::auditor::{Summary, TransactionVerdict};
use crate::phase::MigrationPhase;
use crate::source::TransactionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;

/// One audited transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// 1-based position in the input list
    pub index: usize,
    pub transaction_id: TransactionId,
    pub executed: bool,
    pub verdict: TransactionVerdict,
}

/// A transaction whose fetch failed and that was skipped by policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTransaction {
    pub index: usize,
    pub transaction_id: TransactionId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub phase: MigrationPhase,
    pub generation1_active: BTreeSet<Address>,
    pub generation2_target: BTreeSet<Address>,
    pub entries: Vec<AuditEntry>,
    pub skipped: Vec<SkippedTransaction>,

    /// Skipped transactions count towards `total` and never towards `passed`
    pub summary: Summary,
}

impl AuditReport {
    pub fn all_verified(&self) -> bool {
        self.summary.all_passed()
    }
}

pub fn summary_line(summary: &Summary) -> String {
    format!(
        "successfully verified {} from {} transactions",
        summary.passed, summary.total
    )
}

/// Human-readable report, one line per check
pub fn render_text(report: &AuditReport) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Phase: {} (generation-1 active: {}, generation-2 target: {})",
        report.phase,
        report.generation1_active.len(),
        report.generation2_target.len()
    );

    // Entries and skips interleave by input position.
    let mut lines: Vec<(usize, String)> = Vec::new();

    for entry in &report.entries {
        let executed = if entry.executed { " (executed)" } else { "" };
        let prefix = format!(
            "Transaction #{}: {}{} - {}",
            entry.index, entry.transaction_id, executed, entry.verdict.kind
        );

        if entry.verdict.checks.is_empty() {
            let note = entry.verdict.note.as_deref().unwrap_or("unrecognized instruction");
            lines.push((entry.index, format!("{} - {} [BAD]", prefix, note)));
        }
        for check in &entry.verdict.checks {
            lines.push((entry.index, format!("{} - {}", prefix, check)));
        }
    }

    for skipped in &report.skipped {
        lines.push((
            skipped.index,
            format!(
                "Transaction #{}: {} - skipped - {} [BAD]",
                skipped.index, skipped.transaction_id, skipped.error
            ),
        ));
    }

    // Stable sort keeps each transaction's checks in audit order.
    lines.sort_by_key(|(index, _)| *index);

    let mut previous = None;
    for (index, line) in lines {
        if previous != Some(index) {
            out.push('\n');
            previous = Some(index);
        }
        out.push_str(&line);
        out.push('\n');
    }

    out.push('\n');
    out.push_str(&summary_line(&report.summary));
    out.push('\n');
    out
}

pub fn render_json(report: &AuditReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
