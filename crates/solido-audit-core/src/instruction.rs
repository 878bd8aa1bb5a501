// TRANSACTION CLASSIFIER
// Turns the solido CLI's `parsed_instruction` JSON into a typed record
//
// Recognized shapes:
//   {"SolidoInstruction": {"DeactivateValidator": {..}}}
//   {"SolidoInstruction": {"AddValidator": {..}}}
//   {"SolidoInstruction": {"MigrateStateToV2": {..}}}
//   {"BpfLoaderUpgrade": {..}}
// Anything else classifies as Unknown. Classification never fails.

use crate::address::Address;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

const SOLIDO_INSTRUCTION: &str = "SolidoInstruction";
const BPF_LOADER_UPGRADE: &str = "BpfLoaderUpgrade";

/// Fieldless instruction kind, as recorded in the phase-order list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstructionKind {
    DeactivateValidator,
    AddValidator,
    MigrateStateToV2,
    ProgramUpgrade,
    Unknown,
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstructionKind::DeactivateValidator => "DeactivateValidator",
            InstructionKind::AddValidator => "AddValidator",
            InstructionKind::MigrateStateToV2 => "MigrateStateToV2",
            InstructionKind::ProgramUpgrade => "ProgramUpgrade",
            InstructionKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Payload of DeactivateValidator and AddValidator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorChange {
    #[serde(default)]
    pub solido_instance: Option<Address>,
    #[serde(default)]
    pub manager: Option<Address>,
    #[serde(default)]
    pub validator_vote_account: Option<Address>,
}

/// Payload of a bpf_loader_upgradeable::upgrade
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramUpgrade {
    #[serde(default)]
    pub program_to_upgrade: Option<Address>,
    #[serde(default)]
    pub program_data_address: Option<Address>,
    #[serde(default)]
    pub buffer_address: Option<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDistributionFields {
    #[serde(default)]
    pub treasury_fee: Option<u64>,
    #[serde(default)]
    pub developer_fee: Option<u64>,
    #[serde(default)]
    pub st_sol_appreciation: Option<u64>,
}

/// Payload of MigrateStateToV2
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateStateToV2 {
    #[serde(default)]
    pub solido_instance: Option<Address>,
    #[serde(default)]
    pub manager: Option<Address>,
    #[serde(default)]
    pub validator_list: Option<Address>,
    #[serde(default)]
    pub maintainer_list: Option<Address>,
    #[serde(default)]
    pub developer_account: Option<Address>,
    #[serde(default)]
    pub max_maintainers: Option<u64>,
    #[serde(default)]
    pub max_validators: Option<u64>,
    #[serde(default)]
    pub max_commission_percentage: Option<u64>,
    #[serde(default)]
    pub reward_distribution: Option<RewardDistributionFields>,
}

/// One classified administrative instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionRecord {
    DeactivateValidator(ValidatorChange),
    AddValidator(ValidatorChange),
    MigrateStateToV2(MigrateStateToV2),
    ProgramUpgrade(ProgramUpgrade),
    /// Not one of the audited kinds; the reason is diagnostic only
    Unknown { reason: String },
}

impl TransactionRecord {
    pub fn kind(&self) -> InstructionKind {
        match self {
            TransactionRecord::DeactivateValidator(_) => InstructionKind::DeactivateValidator,
            TransactionRecord::AddValidator(_) => InstructionKind::AddValidator,
            TransactionRecord::MigrateStateToV2(_) => InstructionKind::MigrateStateToV2,
            TransactionRecord::ProgramUpgrade(_) => InstructionKind::ProgramUpgrade,
            TransactionRecord::Unknown { .. } => InstructionKind::Unknown,
        }
    }

    fn unknown(reason: impl Into<String>) -> Self {
        TransactionRecord::Unknown {
            reason: reason.into(),
        }
    }
}

/// Classify a `parsed_instruction` value
pub fn classify(raw: &Value) -> TransactionRecord {
    let Some((tag, inner)) = single_tag(raw) else {
        return TransactionRecord::unknown(describe_shape(raw));
    };

    match tag {
        SOLIDO_INSTRUCTION => classify_solido(inner),
        BPF_LOADER_UPGRADE => {
            decode_payload(BPF_LOADER_UPGRADE, inner, TransactionRecord::ProgramUpgrade)
        }
        other => TransactionRecord::unknown(format!("unsupported instruction wrapper `{}`", other)),
    }
}

fn classify_solido(inner: &Value) -> TransactionRecord {
    let Some((sub_kind, payload)) = single_tag(inner) else {
        return TransactionRecord::unknown(format!(
            "Solido instruction with {}",
            describe_shape(inner)
        ));
    };

    match sub_kind {
        "DeactivateValidator" => {
            decode_payload(sub_kind, payload, TransactionRecord::DeactivateValidator)
        }
        "AddValidator" => decode_payload(sub_kind, payload, TransactionRecord::AddValidator),
        "MigrateStateToV2" => {
            decode_payload(sub_kind, payload, TransactionRecord::MigrateStateToV2)
        }
        other => TransactionRecord::unknown(format!("unsupported Solido instruction `{}`", other)),
    }
}

/// Externally tagged value: an object with exactly one key
fn single_tag(value: &Value) -> Option<(&str, &Value)> {
    match value {
        Value::Object(map) if map.len() == 1 => map.iter().next().map(|(k, v)| (k.as_str(), v)),
        _ => None,
    }
}

fn describe_shape(value: &Value) -> String {
    match value {
        Value::Null => "no parsed instruction".to_string(),
        // Unit variants such as "Unrecognized" or "InvalidSolidoInstruction"
        Value::String(tag) => format!("instruction `{}`", tag),
        Value::Object(map) => format!(
            "ambiguous instruction object with keys [{}]",
            map.keys().cloned().collect::<Vec<_>>().join(", ")
        ),
        _ => "non-object instruction value".to_string(),
    }
}

fn decode_payload<T, F>(name: &str, payload: &Value, wrap: F) -> TransactionRecord
where
    T: DeserializeOwned,
    F: FnOnce(T) -> TransactionRecord,
{
    match T::deserialize(payload) {
        Ok(decoded) => wrap(decoded),
        Err(e) => TransactionRecord::unknown(format!("malformed {} payload: {}", name, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_deactivate_validator() {
        let raw = json!({
            "SolidoInstruction": {
                "DeactivateValidator": {
                    "solido_instance": "Instance",
                    "manager": "Manager",
                    "validator_vote_account": "VoteA"
                }
            }
        });

        let record = classify(&raw);
        assert_eq!(record.kind(), InstructionKind::DeactivateValidator);
        match record {
            TransactionRecord::DeactivateValidator(change) => {
                assert_eq!(change.validator_vote_account, Some("VoteA".parse().unwrap()));
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_classify_add_validator_ignores_extra_fields() {
        let raw = json!({
            "SolidoInstruction": {
                "AddValidator": {
                    "solido_instance": "Instance",
                    "manager": "Manager",
                    "validator_vote_account": "VoteB",
                    "validator_fee_st_sol_account": "FeeAccount"
                }
            }
        });
        assert_eq!(classify(&raw).kind(), InstructionKind::AddValidator);
    }

    #[test]
    fn test_classify_program_upgrade() {
        let raw = json!({
            "BpfLoaderUpgrade": {
                "program_to_upgrade": "P",
                "program_data_address": "D",
                "buffer_address": "B",
                "spill_address": "S"
            }
        });
        assert_eq!(
            classify(&raw),
            TransactionRecord::ProgramUpgrade(ProgramUpgrade {
                program_to_upgrade: Some("P".parse().unwrap()),
                program_data_address: Some("D".parse().unwrap()),
                buffer_address: Some("B".parse().unwrap()),
            })
        );
    }

    #[test]
    fn test_missing_fields_decode_as_none() {
        let raw = json!({
            "SolidoInstruction": {
                "MigrateStateToV2": {
                    "solido_instance": "Instance",
                    "max_validators": 6700
                }
            }
        });

        match classify(&raw) {
            TransactionRecord::MigrateStateToV2(payload) => {
                assert_eq!(payload.max_validators, Some(6700));
                assert!(payload.manager.is_none());
                assert!(payload.reward_distribution.is_none());
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_shapes_are_unknown() {
        let cases = vec![
            Value::Null,
            json!("Unrecognized"),
            json!("InvalidSolidoInstruction"),
            json!({"MultisigChange": {"old_threshold": 1}}),
            json!({"SolidoInstruction": {"AddMaintainer": {"maintainer": "M"}}}),
            json!({"SolidoInstruction": "Unrecognized"}),
            json!({"BpfLoaderUpgrade": {}, "SolidoInstruction": {}}),
            json!([1, 2, 3]),
        ];

        for raw in cases {
            assert_eq!(classify(&raw).kind(), InstructionKind::Unknown, "{}", raw);
        }
    }

    #[test]
    fn test_wrong_field_type_is_unknown_with_reason() {
        let raw = json!({
            "SolidoInstruction": {
                "MigrateStateToV2": { "max_validators": "many" }
            }
        });

        match classify(&raw) {
            TransactionRecord::Unknown { reason } => {
                assert!(reason.starts_with("malformed MigrateStateToV2 payload"), "{}", reason);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }
}
