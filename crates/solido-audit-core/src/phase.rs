// MIGRATION PHASE INFERENCE
// Derives the current migration phase from observable instance state
//
// SAFETY INVARIANTS:
// 1. Inference is a pure function of (schema version, active count, threshold)
// 2. Unrecognized combinations degrade to Unknown, never to an error
// 3. The generation-1 set is recomputed from live state on every run
// 4. The generation-2 set is never derived, only supplied by the caller

use crate::address::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stage of the v1 → v2 migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationPhase {
    /// Old schema, all validators still active
    DeactivateValidators,

    /// Old schema, every validator deactivated; program upgrade and state migration pending
    UpgradeProgram,

    /// New schema, no validators yet
    AddValidators,

    /// State matches none of the above
    Unknown(String),
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::DeactivateValidators => f.write_str("DeactivateValidators"),
            MigrationPhase::UpgradeProgram => f.write_str("UpgradeProgram"),
            MigrationPhase::AddValidators => f.write_str("AddValidators"),
            MigrationPhase::Unknown(reason) => write!(f, "Unknown({})", reason),
        }
    }
}

/// One validator as reported by the instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorEntry {
    /// Vote account address
    pub identity: Address,
    pub active: bool,
}

/// Read-only view of the instance needed for inference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub schema_version: u8,
    pub validators: Vec<ValidatorEntry>,
}

/// Validator sets the membership checks run against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSetSnapshot {
    /// Validators currently active under the old schema
    pub generation1_active: BTreeSet<Address>,

    /// Validators expected under the new schema
    pub generation2_target: BTreeSet<Address>,
}

impl ValidatorSetSnapshot {
    pub fn with_generation2_target(mut self, target: BTreeSet<Address>) -> Self {
        self.generation2_target = target;
        self
    }
}

/// Decision table over (schema version, active count). First match wins.
pub fn classify_phase(
    schema_version: u8,
    active_count: usize,
    full_population: usize,
) -> MigrationPhase {
    match (schema_version, active_count) {
        (0, n) if n == full_population => MigrationPhase::DeactivateValidators,
        (0, 0) => MigrationPhase::UpgradeProgram,
        (1, 0) => MigrationPhase::AddValidators,
        (v, n) => MigrationPhase::Unknown(format!("version={} active_count={}", v, n)),
    }
}

/// Infer the phase and the generation-1 set from a snapshot.
///
/// The returned snapshot has an empty `generation2_target`; attach the
/// caller's target set with [`ValidatorSetSnapshot::with_generation2_target`].
pub fn infer_phase(
    snapshot: &InstanceSnapshot,
    full_population: usize,
) -> (MigrationPhase, ValidatorSetSnapshot) {
    let generation1_active: BTreeSet<Address> = snapshot
        .validators
        .iter()
        .filter(|entry| entry.active)
        .map(|entry| entry.identity.clone())
        .collect();

    let phase = classify_phase(snapshot.schema_version, generation1_active.len(), full_population);

    (
        phase,
        ValidatorSetSnapshot {
            generation1_active,
            generation2_target: BTreeSet::new(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(identity: &str, active: bool) -> ValidatorEntry {
        ValidatorEntry {
            identity: identity.parse().unwrap(),
            active,
        }
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(classify_phase(0, 21, 21), MigrationPhase::DeactivateValidators);
        assert_eq!(classify_phase(0, 0, 21), MigrationPhase::UpgradeProgram);
        assert_eq!(classify_phase(1, 0, 21), MigrationPhase::AddValidators);
        assert_eq!(
            classify_phase(0, 7, 21),
            MigrationPhase::Unknown("version=0 active_count=7".to_string())
        );
        assert_eq!(
            classify_phase(1, 3, 21),
            MigrationPhase::Unknown("version=1 active_count=3".to_string())
        );
        assert_eq!(
            classify_phase(2, 0, 21),
            MigrationPhase::Unknown("version=2 active_count=0".to_string())
        );
    }

    #[test]
    fn test_threshold_is_configurable() {
        assert_eq!(classify_phase(0, 9, 9), MigrationPhase::DeactivateValidators);
        assert!(matches!(classify_phase(0, 21, 9), MigrationPhase::Unknown(_)));
    }

    #[test]
    fn test_infer_phase_counts_only_active_entries() {
        let snapshot = InstanceSnapshot {
            schema_version: 0,
            validators: vec![entry("VoteA", true), entry("VoteB", false), entry("VoteC", true)],
        };

        let (phase, sets) = infer_phase(&snapshot, 2);
        assert_eq!(phase, MigrationPhase::DeactivateValidators);
        assert_eq!(sets.generation1_active.len(), 2);
        assert!(sets.generation1_active.contains(&"VoteC".parse().unwrap()));
        assert!(!sets.generation1_active.contains(&"VoteB".parse().unwrap()));
        assert!(sets.generation2_target.is_empty());
    }

    #[test]
    fn test_infer_phase_after_deactivation() {
        let snapshot = InstanceSnapshot {
            schema_version: 0,
            validators: vec![entry("VoteA", false), entry("VoteB", false)],
        };
        let (phase, sets) = infer_phase(&snapshot, 21);
        assert_eq!(phase, MigrationPhase::UpgradeProgram);
        assert!(sets.generation1_active.is_empty());
    }

    #[test]
    fn test_unknown_display_carries_reason() {
        let phase = classify_phase(3, 1, 21);
        assert_eq!(phase.to_string(), "Unknown(version=3 active_count=1)");
    }

    proptest! {
        #[test]
        fn prop_phase_depends_only_on_version_and_count(
            version in 0u8..4,
            count in 0usize..64,
            threshold in 1usize..64,
        ) {
            let phase = classify_phase(version, count, threshold);
            let expected = if version == 0 && count == threshold {
                MigrationPhase::DeactivateValidators
            } else if version == 0 && count == 0 {
                MigrationPhase::UpgradeProgram
            } else if version == 1 && count == 0 {
                MigrationPhase::AddValidators
            } else {
                MigrationPhase::Unknown(format!("version={} active_count={}", version, count))
            };
            prop_assert_eq!(phase, expected);
        }
    }
}
