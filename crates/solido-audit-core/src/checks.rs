// FIELD VALIDATORS
// Per-field checks composed by the auditor
//
// SAFETY INVARIANTS:
// 1. A missing field is always a failure, reported distinctly from a mismatch
// 2. unique_member is the only check with a side effect: it grows the seen set
// 3. Phase-order checks look only at kinds already processed in this run

use crate::address::Address;
use crate::baseline::{BaselineConfig, BaselineField, FieldValue, RewardField};
use crate::instruction::InstructionKind;
use crate::phase::MigrationPhase;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Result of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Ok,
    /// Field absent from the instruction
    Missing,
    /// Present but different from the baseline
    Mismatch,
    /// Vote account already seen earlier in the run
    Duplicate,
    /// Vote account not in the phase's validator set
    NotInTargetSet,
    /// Instruction kind appears at the wrong position in the stream
    OutOfOrder,
    /// Instruction kind not allowed in the current phase
    WrongPhase,
}

impl CheckStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, CheckStatus::Ok)
    }
}

/// Structured outcome of one check, rendered by the report formatters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub field: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub status: CheckStatus,
}

impl CheckOutcome {
    pub fn ok(&self) -> bool {
        self.status.is_ok()
    }

    fn new(
        field: impl Into<String>,
        expected: Option<String>,
        actual: Option<String>,
        status: CheckStatus,
    ) -> Self {
        CheckOutcome {
            field: field.into(),
            expected,
            actual,
            status,
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actual = self.actual.as_deref().unwrap_or("<missing>");
        if self.ok() {
            write!(f, "{}: {} [OK]", self.field, actual)
        } else {
            write!(f, "{}: {} [BAD]", self.field, actual)?;
            match &self.expected {
                Some(expected) => write!(f, " ({:?}, expected {})", self.status, expected),
                None => write!(f, " ({:?})", self.status),
            }
        }
    }
}

/// Compare a field against the top-level baseline value
pub fn exact_match(
    baseline: &BaselineConfig,
    field: BaselineField,
    actual: Option<FieldValue>,
) -> CheckOutcome {
    let expected = baseline.expected(field);
    let status = match &actual {
        None => CheckStatus::Missing,
        Some(value) if *value == expected => CheckStatus::Ok,
        Some(_) => CheckStatus::Mismatch,
    };

    CheckOutcome::new(
        field.name(),
        Some(expected.to_string()),
        actual.map(|value| value.to_string()),
        status,
    )
}

/// Compare a field against `baseline.reward_distribution`
pub fn reward_match(
    baseline: &BaselineConfig,
    field: RewardField,
    actual: Option<u64>,
) -> CheckOutcome {
    let expected = baseline.reward_distribution.expected(field);
    let status = match actual {
        None => CheckStatus::Missing,
        Some(value) if value == expected => CheckStatus::Ok,
        Some(_) => CheckStatus::Mismatch,
    };

    CheckOutcome::new(
        format!("reward_distribution.{}", field),
        Some(expected.to_string()),
        actual.map(|value| value.to_string()),
        status,
    )
}

/// First-seen uniqueness across the run plus membership in `target`.
///
/// The address enters `seen` the first time it is encountered, whether or
/// not the membership part passes, so any later occurrence is a duplicate.
pub fn unique_member(
    field: &str,
    actual: Option<&Address>,
    target: &BTreeSet<Address>,
    target_name: &str,
    seen: &mut HashSet<Address>,
) -> CheckOutcome {
    let Some(address) = actual else {
        return CheckOutcome::new(
            field,
            Some(format!("member of {}", target_name)),
            None,
            CheckStatus::Missing,
        );
    };

    let status = if !seen.insert(address.clone()) {
        CheckStatus::Duplicate
    } else if !target.contains(address) {
        CheckStatus::NotInTargetSet
    } else {
        CheckStatus::Ok
    };

    CheckOutcome::new(
        field,
        Some(format!("unseen member of {}", target_name)),
        Some(address.to_string()),
        status,
    )
}

/// Position of `kind` relative to the kinds processed before it.
///
/// ProgramUpgrade must be the first transaction of the run.
/// MigrateStateToV2 must be the second, directly after a ProgramUpgrade.
/// Other kinds carry no ordering constraint.
pub fn phase_order(kind: InstructionKind, observed: &[InstructionKind]) -> CheckOutcome {
    let (expected, ok) = match kind {
        InstructionKind::ProgramUpgrade => ("first transaction", observed.is_empty()),
        InstructionKind::MigrateStateToV2 => (
            "directly after the only ProgramUpgrade",
            matches!(observed, [InstructionKind::ProgramUpgrade]),
        ),
        _ => ("any position", true),
    };

    let actual = if observed.is_empty() {
        "first transaction".to_string()
    } else {
        let previous: Vec<String> = observed.iter().map(|k| k.to_string()).collect();
        format!("after [{}]", previous.join(", "))
    };

    CheckOutcome::new(
        "order",
        Some(expected.to_string()),
        Some(actual),
        if ok { CheckStatus::Ok } else { CheckStatus::OutOfOrder },
    )
}

/// The current phase must be the one this instruction kind belongs to
pub fn required_phase(required: &MigrationPhase, current: &MigrationPhase) -> CheckOutcome {
    let status = if required == current {
        CheckStatus::Ok
    } else {
        CheckStatus::WrongPhase
    };

    CheckOutcome::new(
        "phase",
        Some(required.to_string()),
        Some(current.to_string()),
        status,
    )
}
