// EXTERNAL COLLABORATORS
// Read-only access to the instance state and to multisig transactions
//
// The auditor never decodes on-chain data itself; it trusts the parse
// produced by the collaborator behind these traits.

use crate::phase::InstanceSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` exited with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{what} timed out after {limit:?}")]
    Timeout { what: String, limit: Duration },

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed collaborator output: {0}")]
    Malformed(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Opaque handle of a multisig transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Returns None for empty or whitespace-only input
    pub fn new(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(TransactionId(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction identifiers from a list file, in file order.
///
/// The first word on each line is the transaction address; anything after
/// it is ignored. Blank lines and `#` comments are skipped.
pub fn parse_transaction_list(text: &str) -> Vec<TransactionId> {
    text.lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|word| !word.starts_with('#'))
        .filter_map(TransactionId::new)
        .collect()
}

/// A fetched, already decoded multisig transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedTransaction {
    pub executed: bool,
    pub parsed_instruction: Value,
}

#[async_trait]
pub trait InstanceStateSource: Send + Sync {
    /// Idempotent read of the instance's schema version and validators
    async fn fetch_instance(&self) -> Result<InstanceSnapshot, FetchError>;
}

#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn fetch_transaction(&self, id: &TransactionId) -> Result<FetchedTransaction, FetchError>;
}
