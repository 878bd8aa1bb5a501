// MIGRATION TRANSACTION AUDITOR
// Verifies a stream of classified transactions against the baseline and the inferred phase
//
// SAFETY INVARIANTS:
// 1. Records are audited strictly in the order they are given
// 2. seen_vote_accounts only grows; observed_kind_order is append-only
// 3. A transaction passes iff every applicable check passes; Unknown never passes
// 4. A failing transaction never stops the audit of later ones
// 5. Each Auditor owns its AuditState; nothing is shared between runs

use crate::address::Address;
use crate::baseline::{BaselineConfig, BaselineField, FieldValue, RewardField};
use crate::checks::{self, CheckOutcome};
use crate::instruction::{
    InstructionKind, MigrateStateToV2, ProgramUpgrade, TransactionRecord, ValidatorChange,
};
use crate::phase::{MigrationPhase, ValidatorSetSnapshot};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

const VOTE_ACCOUNT_FIELD: &str = "validator_vote_account";

/// Running state of one audit run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditState {
    /// Every vote account encountered so far
    pub seen_vote_accounts: HashSet<Address>,

    /// Kinds processed so far, in processing order
    pub observed_kind_order: Vec<InstructionKind>,

    /// (0-based stream position, passed) per record, skipped ones included
    pub verdicts: Vec<(usize, bool)>,

    pub total: usize,
    pub passed: usize,
}

/// Aggregate result of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
}

impl Summary {
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Outcome of auditing one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionVerdict {
    pub kind: InstructionKind,
    pub checks: Vec<CheckOutcome>,
    pub passed: bool,

    /// Why the record could not be classified, for Unknown records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TransactionVerdict {
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|check| !check.ok())
    }
}

/// Auditor for one run
pub struct Auditor {
    baseline: Arc<BaselineConfig>,
    phase: MigrationPhase,
    validators: ValidatorSetSnapshot,
    state: AuditState,
}

impl Auditor {
    pub fn new(
        baseline: Arc<BaselineConfig>,
        phase: MigrationPhase,
        validators: ValidatorSetSnapshot,
    ) -> Self {
        Auditor {
            baseline,
            phase,
            validators,
            state: AuditState::default(),
        }
    }

    pub fn phase(&self) -> &MigrationPhase {
        &self.phase
    }

    pub fn validators(&self) -> &ValidatorSetSnapshot {
        &self.validators
    }

    pub fn state(&self) -> &AuditState {
        &self.state
    }

    pub fn summary(&self) -> Summary {
        Summary {
            total: self.state.total,
            passed: self.state.passed,
        }
    }

    /// Audit the next record of the stream.
    ///
    /// Not idempotent: a vote account folded into the state by an earlier
    /// call makes the same record fail its uniqueness check.
    pub fn audit_one(&mut self, record: &TransactionRecord) -> TransactionVerdict {
        let kind = record.kind();
        let mut note = None;

        let checks = match record {
            TransactionRecord::DeactivateValidator(change) => {
                let mut checks = vec![checks::required_phase(
                    &MigrationPhase::DeactivateValidators,
                    &self.phase,
                )];
                checks.extend(validator_change_checks(
                    &self.baseline,
                    change,
                    &self.validators.generation1_active,
                    "generation1_active",
                    &mut self.state.seen_vote_accounts,
                ));
                checks
            }
            TransactionRecord::AddValidator(change) => {
                let mut checks = vec![checks::required_phase(
                    &MigrationPhase::AddValidators,
                    &self.phase,
                )];
                checks.extend(validator_change_checks(
                    &self.baseline,
                    change,
                    &self.validators.generation2_target,
                    "generation2_target",
                    &mut self.state.seen_vote_accounts,
                ));
                checks
            }
            TransactionRecord::MigrateStateToV2(payload) => {
                let mut checks = vec![
                    checks::required_phase(&MigrationPhase::UpgradeProgram, &self.phase),
                    checks::phase_order(kind, &self.state.observed_kind_order),
                ];
                checks.extend(migrate_state_checks(&self.baseline, payload));
                checks
            }
            TransactionRecord::ProgramUpgrade(payload) => {
                let mut checks = vec![
                    checks::required_phase(&MigrationPhase::UpgradeProgram, &self.phase),
                    checks::phase_order(kind, &self.state.observed_kind_order),
                ];
                checks.extend(program_upgrade_checks(&self.baseline, payload));
                checks
            }
            TransactionRecord::Unknown { reason } => {
                note = Some(reason.clone());
                Vec::new()
            }
        };

        let passed = kind != InstructionKind::Unknown && checks.iter().all(CheckOutcome::ok);

        let position = self.state.total;
        self.state.observed_kind_order.push(kind);
        self.state.verdicts.push((position, passed));
        self.state.total += 1;
        if passed {
            self.state.passed += 1;
        }

        debug!(
            "Audited record {} ({}): {}",
            position + 1,
            kind,
            if passed { "verified" } else { "rejected" }
        );

        TransactionVerdict {
            kind,
            checks,
            passed,
            note,
        }
    }

    /// Account for a record that could not be fetched.
    ///
    /// It occupies its stream position as an Unknown kind, so records after
    /// it are order-checked against the gap, and it never counts as verified.
    pub fn record_skipped(&mut self) {
        let position = self.state.total;
        self.state.observed_kind_order.push(InstructionKind::Unknown);
        self.state.verdicts.push((position, false));
        self.state.total += 1;

        debug!("Record {} skipped: not fetched", position + 1);
    }

    /// Audit every record in order and return the running summary
    pub fn audit_many<'a, I>(&mut self, records: I) -> Summary
    where
        I: IntoIterator<Item = &'a TransactionRecord>,
    {
        for record in records {
            self.audit_one(record);
        }
        self.summary()
    }
}

fn address_value(address: &Option<Address>) -> Option<FieldValue> {
    address.clone().map(FieldValue::from)
}

fn integer_value(value: Option<u64>) -> Option<FieldValue> {
    value.map(FieldValue::from)
}

fn validator_change_checks(
    baseline: &BaselineConfig,
    change: &ValidatorChange,
    target: &BTreeSet<Address>,
    target_name: &str,
    seen: &mut HashSet<Address>,
) -> Vec<CheckOutcome> {
    vec![
        checks::exact_match(
            baseline,
            BaselineField::SolidoInstance,
            address_value(&change.solido_instance),
        ),
        checks::exact_match(baseline, BaselineField::Manager, address_value(&change.manager)),
        checks::unique_member(
            VOTE_ACCOUNT_FIELD,
            change.validator_vote_account.as_ref(),
            target,
            target_name,
            seen,
        ),
    ]
}

fn program_upgrade_checks(
    baseline: &BaselineConfig,
    payload: &ProgramUpgrade,
) -> Vec<CheckOutcome> {
    let expect = |field, actual| checks::exact_match(baseline, field, actual);
    vec![
        expect(BaselineField::ProgramToUpgrade, address_value(&payload.program_to_upgrade)),
        expect(BaselineField::ProgramDataAddress, address_value(&payload.program_data_address)),
        expect(BaselineField::BufferAddress, address_value(&payload.buffer_address)),
    ]
}

fn migrate_state_checks(
    baseline: &BaselineConfig,
    payload: &MigrateStateToV2,
) -> Vec<CheckOutcome> {
    let expect = |field, actual| checks::exact_match(baseline, field, actual);
    let mut checks = vec![
        expect(BaselineField::SolidoInstance, address_value(&payload.solido_instance)),
        expect(BaselineField::Manager, address_value(&payload.manager)),
        expect(BaselineField::ValidatorList, address_value(&payload.validator_list)),
        expect(BaselineField::MaintainerList, address_value(&payload.maintainer_list)),
        expect(BaselineField::DeveloperAccount, address_value(&payload.developer_account)),
        expect(BaselineField::MaxMaintainers, integer_value(payload.max_maintainers)),
        expect(BaselineField::MaxValidators, integer_value(payload.max_validators)),
        expect(
            BaselineField::MaxCommissionPercentage,
            integer_value(payload.max_commission_percentage),
        ),
    ];

    // A missing reward_distribution object fails all three sub-fields.
    let rewards = payload.reward_distribution.clone().unwrap_or_default();
    for field in RewardField::ALL {
        let actual = match field {
            RewardField::TreasuryFee => rewards.treasury_fee,
            RewardField::DeveloperFee => rewards.developer_fee,
            RewardField::StSolAppreciation => rewards.st_sol_appreciation,
        };
        checks.push(checks::reward_match(baseline, field, actual));
    }

    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::RewardDistribution;
    use crate::checks::CheckStatus;
    use crate::instruction::RewardDistributionFields;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn baseline() -> Arc<BaselineConfig> {
        Arc::new(BaselineConfig {
            solido_instance: addr("Instance"),
            manager: addr("Manager"),
            program_to_upgrade: addr("P"),
            program_data_address: addr("D"),
            buffer_address: addr("B"),
            validator_list: addr("ValidatorList"),
            maintainer_list: addr("MaintainerList"),
            developer_account: addr("Developer"),
            reward_distribution: RewardDistribution {
                treasury_fee: 4,
                developer_fee: 1,
                st_sol_appreciation: 95,
            },
            max_validators: 9,
            max_maintainers: 3,
            max_commission_percentage: 5,
            expected_active_validators: None,
        })
    }

    fn sets(generation1: &[&str], generation2: &[&str]) -> ValidatorSetSnapshot {
        ValidatorSetSnapshot {
            generation1_active: generation1.iter().map(|s| addr(s)).collect(),
            generation2_target: generation2.iter().map(|s| addr(s)).collect(),
        }
    }

    fn change(vote: &str) -> ValidatorChange {
        ValidatorChange {
            solido_instance: Some(addr("Instance")),
            manager: Some(addr("Manager")),
            validator_vote_account: Some(addr(vote)),
        }
    }

    fn upgrade() -> TransactionRecord {
        TransactionRecord::ProgramUpgrade(ProgramUpgrade {
            program_to_upgrade: Some(addr("P")),
            program_data_address: Some(addr("D")),
            buffer_address: Some(addr("B")),
        })
    }

    fn migrate() -> TransactionRecord {
        TransactionRecord::MigrateStateToV2(MigrateStateToV2 {
            solido_instance: Some(addr("Instance")),
            manager: Some(addr("Manager")),
            validator_list: Some(addr("ValidatorList")),
            maintainer_list: Some(addr("MaintainerList")),
            developer_account: Some(addr("Developer")),
            max_maintainers: Some(3),
            max_validators: Some(9),
            max_commission_percentage: Some(5),
            reward_distribution: Some(RewardDistributionFields {
                treasury_fee: Some(4),
                developer_fee: Some(1),
                st_sol_appreciation: Some(95),
            }),
        })
    }

    #[test]
    fn test_upgrade_then_migrate_passes() {
        let mut auditor = Auditor::new(baseline(), MigrationPhase::UpgradeProgram, sets(&[], &[]));
        let summary = auditor.audit_many(&[upgrade(), migrate()]);
        assert_eq!(summary, Summary { total: 2, passed: 2 });
        assert_eq!(
            auditor.state().observed_kind_order,
            vec![InstructionKind::ProgramUpgrade, InstructionKind::MigrateStateToV2]
        );
    }

    #[test]
    fn test_migrate_then_upgrade_fails_both() {
        let mut auditor = Auditor::new(baseline(), MigrationPhase::UpgradeProgram, sets(&[], &[]));
        let summary = auditor.audit_many(&[migrate(), upgrade()]);
        assert_eq!(summary, Summary { total: 2, passed: 0 });
        assert_eq!(auditor.state().verdicts, vec![(0, false), (1, false)]);
    }

    #[test]
    fn test_deactivate_validator_checks() {
        let mut auditor = Auditor::new(
            baseline(),
            MigrationPhase::DeactivateValidators,
            sets(&["VoteA", "VoteB"], &[]),
        );

        let verdict = auditor.audit_one(&TransactionRecord::DeactivateValidator(change("VoteA")));
        assert!(verdict.passed);
        assert_eq!(verdict.checks.len(), 4);

        let outsider = auditor.audit_one(&TransactionRecord::DeactivateValidator(change("VoteZ")));
        assert!(!outsider.passed);
        assert_eq!(
            outsider.failed_checks().map(|c| c.status).collect::<Vec<_>>(),
            vec![CheckStatus::NotInTargetSet]
        );
    }

    #[test]
    fn test_same_record_twice_differs() {
        let mut auditor = Auditor::new(
            baseline(),
            MigrationPhase::DeactivateValidators,
            sets(&["VoteA"], &[]),
        );
        let record = TransactionRecord::DeactivateValidator(change("VoteA"));

        let first = auditor.audit_one(&record);
        let second = auditor.audit_one(&record);

        assert!(first.passed);
        assert!(!second.passed);
        assert_ne!(first, second);
        assert_eq!(
            second.failed_checks().map(|c| c.status).collect::<Vec<_>>(),
            vec![CheckStatus::Duplicate]
        );
    }

    #[test]
    fn test_vote_account_unique_across_kinds() {
        let mut auditor = Auditor::new(
            baseline(),
            MigrationPhase::DeactivateValidators,
            sets(&["VoteA"], &["VoteA"]),
        );

        auditor.audit_one(&TransactionRecord::DeactivateValidator(change("VoteA")));
        let add = auditor.audit_one(&TransactionRecord::AddValidator(change("VoteA")));

        let vote_check = add
            .checks
            .iter()
            .find(|c| c.field == VOTE_ACCOUNT_FIELD)
            .unwrap();
        assert_eq!(vote_check.status, CheckStatus::Duplicate);
    }

    #[test]
    fn test_add_validator_fails_closed_with_empty_target() {
        let mut auditor = Auditor::new(baseline(), MigrationPhase::AddValidators, sets(&[], &[]));
        let verdict = auditor.audit_one(&TransactionRecord::AddValidator(change("VoteNew")));
        assert!(!verdict.passed);
        assert_eq!(auditor.summary(), Summary { total: 1, passed: 0 });
    }

    #[test]
    fn test_add_validator_in_target_passes() {
        let mut auditor =
            Auditor::new(baseline(), MigrationPhase::AddValidators, sets(&[], &["VoteNew"]));
        assert!(auditor.audit_one(&TransactionRecord::AddValidator(change("VoteNew"))).passed);
    }

    #[test]
    fn test_wrong_phase_fails() {
        let mut auditor = Auditor::new(
            baseline(),
            MigrationPhase::DeactivateValidators,
            sets(&["VoteA"], &[]),
        );
        let verdict = auditor.audit_one(&upgrade());
        assert!(!verdict.passed);
        assert_eq!(verdict.checks[0].status, CheckStatus::WrongPhase);
    }

    #[test]
    fn test_unknown_always_fails_and_is_recorded() {
        let mut auditor = Auditor::new(baseline(), MigrationPhase::UpgradeProgram, sets(&[], &[]));
        let verdict = auditor.audit_one(&TransactionRecord::Unknown {
            reason: "instruction `Unrecognized`".to_string(),
        });
        assert!(!verdict.passed);
        assert!(verdict.checks.is_empty());
        assert_eq!(verdict.note.as_deref(), Some("instruction `Unrecognized`"));

        // The Unknown record occupies the first slot, so the upgrade is no longer first.
        assert!(!auditor.audit_one(&upgrade()).passed);
    }

    #[test]
    fn test_skipped_record_occupies_its_position() {
        let mut auditor = Auditor::new(baseline(), MigrationPhase::UpgradeProgram, sets(&[], &[]));
        auditor.record_skipped();
        assert!(!auditor.audit_one(&upgrade()).passed);

        let mut auditor = Auditor::new(baseline(), MigrationPhase::UpgradeProgram, sets(&[], &[]));
        assert!(auditor.audit_one(&upgrade()).passed);
        auditor.record_skipped();
        let verdict = auditor.audit_one(&migrate());
        assert!(!verdict.passed);
        assert_eq!(
            verdict.failed_checks().map(|c| c.status).collect::<Vec<_>>(),
            vec![CheckStatus::OutOfOrder]
        );

        assert_eq!(auditor.summary(), Summary { total: 3, passed: 1 });
        assert_eq!(auditor.state().verdicts, vec![(0, true), (1, false), (2, false)]);
    }

    #[test]
    fn test_missing_reward_distribution_fails_all_sub_fields() {
        let mut auditor = Auditor::new(baseline(), MigrationPhase::UpgradeProgram, sets(&[], &[]));
        auditor.audit_one(&upgrade());

        let mut record = migrate();
        if let TransactionRecord::MigrateStateToV2(payload) = &mut record {
            payload.reward_distribution = None;
        }
        let verdict = auditor.audit_one(&record);
        assert!(!verdict.passed);
        assert_eq!(
            verdict.failed_checks().map(|c| c.status).collect::<Vec<_>>(),
            vec![CheckStatus::Missing; 3]
        );
    }

    #[test]
    fn test_all_checks_run_after_first_failure() {
        let mut auditor = Auditor::new(baseline(), MigrationPhase::AddValidators, sets(&[], &[]));
        let verdict =
            auditor.audit_one(&TransactionRecord::AddValidator(ValidatorChange::default()));
        assert_eq!(verdict.checks.len(), 4);
        assert_eq!(verdict.failed_checks().count(), 3);
    }
}
