// SOLIDO CLI OUTPUT DECODING
// Maps `solido --output json` documents onto the auditor's snapshot types
//
// show-solido:
//   {"solido": {"lido_version": 0, "validators": {"entries": [
//       {"pubkey": "<vote account>", "entry": {"inactive": false, ..}}]}}}
//   The v2 layout reports `active` instead of `inactive`.
// multisig show-transaction:
//   {"did_execute": bool, "parsed_instruction": <tagged instruction>, ..}

use serde_json::Value;
use solido_audit_core::{Address, FetchError, FetchedTransaction, InstanceSnapshot, ValidatorEntry};

/// Parse raw command or file output as JSON
pub fn parse_json(what: &str, bytes: &[u8]) -> Result<Value, FetchError> {
    serde_json::from_slice(bytes).map_err(|source| FetchError::Decode {
        what: what.to_string(),
        source,
    })
}

pub fn decode_show_solido(value: &Value) -> Result<InstanceSnapshot, FetchError> {
    let solido = value
        .get("solido")
        .ok_or_else(|| malformed("show-solido output has no `solido` object"))?;

    let version = solido
        .get("lido_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("`solido.lido_version` is missing or not an integer"))?;
    let schema_version = u8::try_from(version)
        .map_err(|_| malformed(format!("`solido.lido_version` {} is out of range", version)))?;

    let entries = solido
        .get("validators")
        .and_then(|validators| validators.get("entries"))
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("`solido.validators.entries` is missing or not a list"))?;

    let validators = entries
        .iter()
        .enumerate()
        .map(|(i, raw)| decode_validator(i, raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InstanceSnapshot {
        schema_version,
        validators,
    })
}

fn decode_validator(position: usize, raw: &Value) -> Result<ValidatorEntry, FetchError> {
    let pubkey = raw
        .get("pubkey")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("validator entry {} has no `pubkey`", position)))?;
    let identity: Address = pubkey
        .parse()
        .map_err(|e| malformed(format!("validator entry {}: {}", position, e)))?;

    let entry = raw.get("entry").unwrap_or(&Value::Null);
    let active = match (
        entry.get("active").and_then(Value::as_bool),
        entry.get("inactive").and_then(Value::as_bool),
    ) {
        (Some(active), _) => active,
        (None, Some(inactive)) => !inactive,
        (None, None) => {
            return Err(malformed(format!(
                "validator {} reports neither `active` nor `inactive`",
                identity
            )))
        }
    };

    Ok(ValidatorEntry { identity, active })
}

pub fn decode_show_transaction(value: &Value) -> Result<FetchedTransaction, FetchError> {
    let executed = value
        .get("did_execute")
        .and_then(Value::as_bool)
        .ok_or_else(|| malformed("show-transaction output has no boolean `did_execute`"))?;

    // An absent instruction classifies as Unknown downstream.
    let parsed_instruction = value.get("parsed_instruction").cloned().unwrap_or(Value::Null);

    Ok(FetchedTransaction {
        executed,
        parsed_instruction,
    })
}

fn malformed(message: impl Into<String>) -> FetchError {
    FetchError::Malformed(message.into())
}
