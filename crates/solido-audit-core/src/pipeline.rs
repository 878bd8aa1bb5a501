// AUDIT PIPELINE
// Drives one audit run over the external collaborators
//
// SAFETY INVARIANTS:
// 1. The instance snapshot is fetched once, before any transaction
// 2. Fetches may overlap (prefetch) but records reach the auditor in input order
// 3. summary.total always equals the number of transaction ids supplied
// 4. A skipped transaction is never counted as verified

use crate::address::Address;
use crate::auditor::Auditor;
use crate::baseline::{BaselineConfig, BaselineError};
use crate::instruction::classify;
use crate::phase::{infer_phase, MigrationPhase};
use crate::report::{AuditEntry, AuditReport, SkippedTransaction};
use crate::source::{FetchError, InstanceStateSource, TransactionId, TransactionSource};
use futures::stream::{self, StreamExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("baseline rejected: {0}")]
    Baseline(#[from] BaselineError),

    #[error("failed to fetch instance state: {0}")]
    InstanceFetch(#[source] FetchError),

    #[error("failed to fetch transaction #{index} ({id}): {source}")]
    TransactionFetch {
        index: usize,
        id: TransactionId,
        #[source]
        source: FetchError,
    },
}

/// What to do when one transaction cannot be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchErrorPolicy {
    /// Stop the run and return the error
    Abort,
    /// Record the transaction as skipped (not verified) and continue
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditOptions {
    /// Maximum number of transaction fetches in flight; values below 1 act as 1
    pub prefetch: usize,
    pub on_fetch_error: FetchErrorPolicy,
}

impl Default for AuditOptions {
    fn default() -> Self {
        AuditOptions {
            prefetch: 1,
            on_fetch_error: FetchErrorPolicy::Abort,
        }
    }
}

/// Fetch instance state, infer the phase, then audit `ids` in order.
pub async fn run_audit(
    baseline: Arc<BaselineConfig>,
    instance_source: &dyn InstanceStateSource,
    transaction_source: &dyn TransactionSource,
    ids: &[TransactionId],
    generation2_target: BTreeSet<Address>,
    options: &AuditOptions,
) -> Result<AuditReport, AuditError> {
    baseline.validate()?;

    let snapshot = instance_source
        .fetch_instance()
        .await
        .map_err(AuditError::InstanceFetch)?;

    let threshold = baseline.full_population_threshold();
    let (phase, validators) = infer_phase(&snapshot, threshold);
    let validators = validators.with_generation2_target(generation2_target);

    info!(
        "Inferred migration phase {} (schema version {}, {} active of {} expected)",
        phase,
        snapshot.schema_version,
        validators.generation1_active.len(),
        threshold
    );
    if let MigrationPhase::Unknown(reason) = &phase {
        warn!(
            "Instance state matches no migration phase ({}); every phase check will fail",
            reason
        );
    }
    if phase == MigrationPhase::AddValidators && validators.generation2_target.is_empty() {
        warn!("No generation-2 target validators supplied; every AddValidator will fail");
    }

    let mut auditor = Auditor::new(baseline, phase.clone(), validators.clone());
    let mut entries = Vec::with_capacity(ids.len());
    let mut skipped = Vec::new();

    // `buffered` yields results in input order regardless of completion order.
    let mut fetches = stream::iter(ids.iter().enumerate())
        .map(|(position, id)| async move {
            (position, id, transaction_source.fetch_transaction(id).await)
        })
        .buffered(options.prefetch.max(1));

    while let Some((position, id, fetched)) = fetches.next().await {
        let index = position + 1;

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(source) => match options.on_fetch_error {
                FetchErrorPolicy::Abort => {
                    return Err(AuditError::TransactionFetch {
                        index,
                        id: id.clone(),
                        source,
                    });
                }
                FetchErrorPolicy::Skip => {
                    warn!("Skipping transaction #{} ({}): {}", index, id, source);
                    auditor.record_skipped();
                    skipped.push(SkippedTransaction {
                        index,
                        transaction_id: id.clone(),
                        error: source.to_string(),
                    });
                    continue;
                }
            },
        };

        let record = classify(&fetched.parsed_instruction);
        let verdict = auditor.audit_one(&record);
        if !verdict.passed {
            info!("Transaction #{} ({}) failed verification as {}", index, id, verdict.kind);
        }

        entries.push(AuditEntry {
            index,
            transaction_id: id.clone(),
            executed: fetched.executed,
            verdict,
        });
    }

    let summary = auditor.summary();
    info!("successfully verified {} from {} transactions", summary.passed, summary.total);

    Ok(AuditReport {
        phase,
        generation1_active: validators.generation1_active,
        generation2_target: validators.generation2_target,
        entries,
        skipped,
        summary,
    })
}
