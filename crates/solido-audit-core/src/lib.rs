//! Migration transaction auditor for the Solido staking pool.
//!
//! Infers which phase of the v1 → v2 state migration an instance is in and
//! verifies a stream of proposed multisig transactions against a baseline
//! configuration and the phase's validator sets.

pub mod address;
pub mod auditor;
pub mod baseline;
pub mod checks;
pub mod instruction;
pub mod phase;
pub mod pipeline;
pub mod report;
pub mod source;

pub use address::{parse_address_list, Address, AddressError};
pub use auditor::{AuditState, Auditor, Summary, TransactionVerdict};
pub use baseline::{
    BaselineConfig, BaselineError, BaselineField, FieldValue, RewardDistribution, RewardField,
};
pub use checks::{CheckOutcome, CheckStatus};
pub use instruction::{classify, InstructionKind, TransactionRecord};
pub use phase::{
    classify_phase, infer_phase, InstanceSnapshot, MigrationPhase, ValidatorEntry,
    ValidatorSetSnapshot,
};
pub use pipeline::{run_audit, AuditError, AuditOptions, FetchErrorPolicy};
pub use report::{render_json, render_text, AuditEntry, AuditReport, SkippedTransaction};
pub use source::{
    parse_transaction_list, FetchError, FetchedTransaction, InstanceStateSource, TransactionId,
    TransactionSource,
};
