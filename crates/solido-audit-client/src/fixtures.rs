// SAVED DUMP SOURCE
// Serves previously captured solido CLI output from a directory:
//   <root>/instance.json              show-solido output
//   <root>/transactions/<id>.json     multisig show-transaction output

use crate::snapshot::{decode_show_solido, decode_show_transaction, parse_json};
use async_trait::async_trait;
use serde_json::Value;
use solido_audit_core::{
    FetchError, FetchedTransaction, InstanceSnapshot, InstanceStateSource, TransactionId,
    TransactionSource,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const INSTANCE_FILE: &str = "instance.json";
const TRANSACTIONS_DIR: &str = "transactions";

#[derive(Debug, Clone)]
pub struct FixtureDir {
    root: PathBuf,
}

impl FixtureDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FixtureDir { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn instance_path(&self) -> PathBuf {
        self.root.join(INSTANCE_FILE)
    }

    /// Location of a transaction dump; ids that could escape the directory are rejected
    pub fn transaction_path(&self, id: &TransactionId) -> Result<PathBuf, FetchError> {
        let name = id.as_str();
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(FetchError::Malformed(format!(
                "transaction id `{}` is not a valid file name",
                name
            )));
        }
        Ok(self.root.join(TRANSACTIONS_DIR).join(format!("{}.json", name)))
    }
}

async fn read_json(path: &Path) -> Result<Value, FetchError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(FetchError::NotFound(path.display().to_string()))
        }
        Err(e) => return Err(FetchError::Io(e)),
    };
    parse_json(&path.display().to_string(), &bytes)
}

#[async_trait]
impl InstanceStateSource for FixtureDir {
    async fn fetch_instance(&self) -> Result<InstanceSnapshot, FetchError> {
        let value = read_json(&self.instance_path()).await?;
        decode_show_solido(&value)
    }
}

#[async_trait]
impl TransactionSource for FixtureDir {
    async fn fetch_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<FetchedTransaction, FetchError> {
        let path = self.transaction_path(id)?;
        let value = read_json(&path).await?;
        decode_show_transaction(&value)
    }
}
