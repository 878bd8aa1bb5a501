// SOLIDO CLI ADAPTER
// Read-only queries through the `solido` command-line tool
//
// SAFETY INVARIANTS:
// 1. Only read-only subcommands are ever invoked (show-solido, multisig show-transaction)
// 2. A child process never outlives its query; it is killed when the query is dropped
// 3. The optional timeout here is the only timeout anywhere in the audit

use crate::snapshot::{decode_show_solido, decode_show_transaction, parse_json};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use solido_audit_core::{
    FetchError, FetchedTransaction, InstanceSnapshot, InstanceStateSource, TransactionId,
    TransactionSource,
};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct SolidoCli {
    program: PathBuf,
    config_path: Option<PathBuf>,
    cluster: Option<String>,
    timeout: Option<Duration>,
}

impl SolidoCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        SolidoCli {
            program: program.into(),
            config_path: None,
            cluster: None,
            timeout: None,
        }
    }

    /// Passed as `--config`; the file names the instance and multisig
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Passed as `--cluster`
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn args(&self, subcommand: &[&str]) -> Vec<String> {
        let mut args = vec!["--output".to_string(), "json".to_string()];
        if let Some(cluster) = &self.cluster {
            args.push("--cluster".to_string());
            args.push(cluster.clone());
        }
        if let Some(path) = &self.config_path {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        args.extend(subcommand.iter().map(|s| s.to_string()));
        args
    }

    async fn run_json(&self, what: &str, subcommand: &[&str]) -> Result<Value, FetchError> {
        let args = self.args(subcommand);
        let rendered = format!("{} {}", self.program.display(), args.join(" "));
        debug!("Running `{}`", rendered);

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => timeout(limit, command.output())
                .await
                .map_err(|_| FetchError::Timeout {
                    what: rendered.clone(),
                    limit,
                })??,
            None => command.output().await?,
        };

        if !output.status.success() {
            return Err(FetchError::CommandFailed {
                command: rendered,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_json(what, &output.stdout)
    }
}

#[async_trait]
impl InstanceStateSource for SolidoCli {
    async fn fetch_instance(&self) -> Result<InstanceSnapshot, FetchError> {
        let value = self.run_json("show-solido output", &["show-solido"]).await?;
        decode_show_solido(&value)
    }
}

#[async_trait]
impl TransactionSource for SolidoCli {
    async fn fetch_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<FetchedTransaction, FetchError> {
        let what = format!("show-transaction output for {}", id);
        let value = self
            .run_json(
                &what,
                &["multisig", "show-transaction", "--transaction-address", id.as_str()],
            )
            .await?;
        decode_show_transaction(&value)
    }
}
