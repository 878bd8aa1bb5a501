use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use solido_audit_client::{FixtureDir, SolidoCli};
use solido_audit_core::{
    infer_phase, parse_address_list, parse_transaction_list, render_json, render_text, run_audit,
    AuditOptions, BaselineConfig, FetchErrorPolicy, InstanceStateSource, TransactionSource,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "solido-audit")]
#[command(
    about = "Verify Solido v1 to v2 migration transactions against a baseline",
    long_about = None
)]
struct Cli {
    /// Baseline configuration (JSON, YAML or TOML); SOLIDO_AUDIT__* variables override keys
    #[arg(long)]
    baseline: PathBuf,

    /// Path to the solido executable
    #[arg(long, default_value = "solido")]
    solido: PathBuf,

    /// Config file passed to solido as --config
    #[arg(long)]
    solido_config: Option<PathBuf>,

    /// Cluster passed to solido as --cluster
    #[arg(long)]
    cluster: Option<String>,

    /// Read saved show-solido / show-transaction dumps instead of running solido
    #[arg(long, conflicts_with_all = ["solido_config", "cluster"])]
    fixtures: Option<PathBuf>,

    /// Abort a single solido invocation after this many seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    fetch_timeout_secs: Option<u64>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the inferred migration phase and the active generation-1 validators
    Phase,

    /// Audit a list of multisig transactions
    Audit {
        /// One transaction address per line (first word of each line)
        #[arg(long)]
        transactions: PathBuf,

        /// Vote accounts expected after the migration, one per line
        #[arg(long)]
        target_validators: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Transactions fetched ahead of the one being audited
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
        prefetch: u16,

        #[arg(long, value_enum, default_value_t = OnFetchError::Abort)]
        on_fetch_error: OnFetchError,
    },

    /// Load and validate the baseline, then print it
    CheckBaseline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OnFetchError {
    Abort,
    Skip,
}

impl From<OnFetchError> for FetchErrorPolicy {
    fn from(value: OnFetchError) -> Self {
        match value {
            OnFetchError::Abort => FetchErrorPolicy::Abort,
            OnFetchError::Skip => FetchErrorPolicy::Skip,
        }
    }
}

/// Where instance state and transactions come from
enum Collaborator {
    Live(SolidoCli),
    Saved(FixtureDir),
}

impl Collaborator {
    fn from_cli(cli: &Cli) -> Self {
        if let Some(root) = &cli.fixtures {
            return Collaborator::Saved(FixtureDir::new(root));
        }

        let mut solido = SolidoCli::new(&cli.solido);
        if let Some(path) = &cli.solido_config {
            solido = solido.with_config(path);
        }
        if let Some(cluster) = &cli.cluster {
            solido = solido.with_cluster(cluster);
        }
        if let Some(secs) = cli.fetch_timeout_secs {
            solido = solido.with_timeout(Duration::from_secs(secs));
        }
        Collaborator::Live(solido)
    }

    fn instances(&self) -> &dyn InstanceStateSource {
        match self {
            Collaborator::Live(solido) => solido,
            Collaborator::Saved(fixtures) => fixtures,
        }
    }

    fn transactions(&self) -> &dyn TransactionSource {
        match self {
            Collaborator::Live(solido) => solido,
            Collaborator::Saved(fixtures) => fixtures,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_baseline(path: &Path) -> Result<Arc<BaselineConfig>> {
    let baseline = BaselineConfig::load(path)
        .with_context(|| format!("loading baseline {}", path.display()))?;
    Ok(Arc::new(baseline))
}

async fn read_list(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

/// Ok(true) when everything checked out
async fn run(cli: Cli) -> Result<bool> {
    let baseline = load_baseline(&cli.baseline)?;
    let collaborator = Collaborator::from_cli(&cli);

    match cli.command {
        Commands::CheckBaseline => {
            println!("{}", serde_json::to_string_pretty(baseline.as_ref())?);
            println!(
                "Baseline OK; a fully populated instance has {} active validators",
                baseline.full_population_threshold()
            );
            Ok(true)
        }
        Commands::Phase => {
            let snapshot = collaborator
                .instances()
                .fetch_instance()
                .await
                .context("fetching instance state")?;
            let threshold = baseline.full_population_threshold();
            let (phase, sets) = infer_phase(&snapshot, threshold);

            println!("Phase: {}", phase);
            println!("Schema version: {}", snapshot.schema_version);
            println!(
                "Active generation-1 validators: {} (fully populated: {})",
                sets.generation1_active.len(),
                threshold
            );
            for identity in &sets.generation1_active {
                println!("  {}", identity);
            }
            Ok(true)
        }
        Commands::Audit {
            transactions,
            target_validators,
            format,
            prefetch,
            on_fetch_error,
        } => {
            let ids = parse_transaction_list(&read_list(&transactions).await?);
            let target = match &target_validators {
                Some(path) => parse_address_list(&read_list(path).await?),
                None => BTreeSet::new(),
            };
            info!(
                "Auditing {} transactions from {} ({} target validators)",
                ids.len(),
                transactions.display(),
                target.len()
            );

            let options = AuditOptions {
                prefetch: prefetch as usize,
                on_fetch_error: on_fetch_error.into(),
            };
            let report = run_audit(
                baseline,
                collaborator.instances(),
                collaborator.transactions(),
                &ids,
                target,
                &options,
            )
            .await
            .context("audit aborted")?;

            match format {
                OutputFormat::Text => print!("{}", render_text(&report)),
                OutputFormat::Json => println!("{}", render_json(&report)?),
            }
            Ok(report.all_verified())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
