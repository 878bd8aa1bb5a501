// BASELINE CONFIGURATION
// Expected field values for one Solido deployment
//
// INVARIANTS:
// 1. Loaded once at process start and never mutated afterwards
// 2. A baseline that fails validation never reaches the auditor
// 3. Every checkable field is addressable by name (BaselineField / RewardField)

use crate::address::Address;
use config::{Config, Environment, File, FileFormat};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Prefix for environment overrides, e.g. `SOLIDO_AUDIT__MANAGER`.
pub const ENV_PREFIX: &str = "SOLIDO_AUDIT";

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("failed to load baseline configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid baseline field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Expected split of rewards, in parts of 100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDistribution {
    pub treasury_fee: u32,
    pub developer_fee: u32,
    pub st_sol_appreciation: u32,
}

impl RewardDistribution {
    pub fn sum(&self) -> u64 {
        self.treasury_fee as u64 + self.developer_fee as u64 + self.st_sol_appreciation as u64
    }

    pub fn expected(&self, field: RewardField) -> u64 {
        match field {
            RewardField::TreasuryFee => self.treasury_fee as u64,
            RewardField::DeveloperFee => self.developer_fee as u64,
            RewardField::StSolAppreciation => self.st_sol_appreciation as u64,
        }
    }
}

/// Baseline for one deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// The Solido instance being migrated
    pub solido_instance: Address,

    /// Multisig that manages the instance
    pub manager: Address,

    /// Program upgrade targets
    pub program_to_upgrade: Address,
    pub program_data_address: Address,
    pub buffer_address: Address,

    /// Accounts created for the v2 state layout
    pub validator_list: Address,
    pub maintainer_list: Address,
    pub developer_account: Address,

    pub reward_distribution: RewardDistribution,

    pub max_validators: u32,
    pub max_maintainers: u32,
    pub max_commission_percentage: u8,

    /// Number of active validators in a fully populated v1 instance.
    /// Falls back to `max_validators` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_active_validators: Option<u32>,
}

/// Top-level baseline fields compared by exact match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineField {
    SolidoInstance,
    Manager,
    ProgramToUpgrade,
    ProgramDataAddress,
    BufferAddress,
    ValidatorList,
    MaintainerList,
    DeveloperAccount,
    MaxValidators,
    MaxMaintainers,
    MaxCommissionPercentage,
}

impl BaselineField {
    /// JSON key used by the solido CLI for this field
    pub fn name(&self) -> &'static str {
        match self {
            BaselineField::SolidoInstance => "solido_instance",
            BaselineField::Manager => "manager",
            BaselineField::ProgramToUpgrade => "program_to_upgrade",
            BaselineField::ProgramDataAddress => "program_data_address",
            BaselineField::BufferAddress => "buffer_address",
            BaselineField::ValidatorList => "validator_list",
            BaselineField::MaintainerList => "maintainer_list",
            BaselineField::DeveloperAccount => "developer_account",
            BaselineField::MaxValidators => "max_validators",
            BaselineField::MaxMaintainers => "max_maintainers",
            BaselineField::MaxCommissionPercentage => "max_commission_percentage",
        }
    }
}

impl fmt::Display for BaselineField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fields nested under `reward_distribution`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardField {
    TreasuryFee,
    DeveloperFee,
    StSolAppreciation,
}

impl RewardField {
    pub const ALL: [RewardField; 3] = [
        RewardField::TreasuryFee,
        RewardField::DeveloperFee,
        RewardField::StSolAppreciation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RewardField::TreasuryFee => "treasury_fee",
            RewardField::DeveloperFee => "developer_fee",
            RewardField::StSolAppreciation => "st_sol_appreciation",
        }
    }
}

impl fmt::Display for RewardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A baseline value, as compared against an instruction field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Address(Address),
    Integer(u64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Address(address) => write!(f, "{}", address),
            FieldValue::Integer(value) => write!(f, "{}", value),
        }
    }
}

impl From<Address> for FieldValue {
    fn from(address: Address) -> Self {
        FieldValue::Address(address)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Integer(value)
    }
}

impl BaselineConfig {
    /// Load from a file (format from extension) with `SOLIDO_AUDIT__*`
    /// environment overrides applied on top.
    pub fn load(path: &Path) -> Result<Self, BaselineError> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .add_source(environment_overrides())
            .build()?;
        Self::finish(settings)
    }

    /// Load from an in-memory document. Environment overrides are not applied.
    pub fn from_str_with_format(source: &str, format: FileFormat) -> Result<Self, BaselineError> {
        let settings = Config::builder()
            .add_source(File::from_str(source, format))
            .build()?;
        Self::finish(settings)
    }

    fn finish(settings: Config) -> Result<Self, BaselineError> {
        let baseline: BaselineConfig = settings.try_deserialize()?;
        baseline.validate()?;
        Ok(baseline)
    }

    /// Reject baselines the auditor cannot use
    pub fn validate(&self) -> Result<(), BaselineError> {
        if self.max_commission_percentage > 100 {
            return Err(BaselineError::InvalidField {
                field: "max_commission_percentage",
                reason: format!("{} exceeds 100", self.max_commission_percentage),
            });
        }

        if self.max_validators == 0 {
            return Err(BaselineError::InvalidField {
                field: "max_validators",
                reason: "must be positive".to_string(),
            });
        }

        // Zero would make a fully populated instance look like an emptied one.
        if self.expected_active_validators == Some(0) {
            return Err(BaselineError::InvalidField {
                field: "expected_active_validators",
                reason: "must be positive".to_string(),
            });
        }

        let sum = self.reward_distribution.sum();
        if sum != 100 {
            warn!("Baseline reward distribution sums to {} instead of 100", sum);
        }

        Ok(())
    }

    /// Active validator count of a fully populated v1 instance
    pub fn full_population_threshold(&self) -> usize {
        self.expected_active_validators.unwrap_or(self.max_validators) as usize
    }

    /// Expected value of a top-level field
    pub fn expected(&self, field: BaselineField) -> FieldValue {
        match field {
            BaselineField::SolidoInstance => self.solido_instance.clone().into(),
            BaselineField::Manager => self.manager.clone().into(),
            BaselineField::ProgramToUpgrade => self.program_to_upgrade.clone().into(),
            BaselineField::ProgramDataAddress => self.program_data_address.clone().into(),
            BaselineField::BufferAddress => self.buffer_address.clone().into(),
            BaselineField::ValidatorList => self.validator_list.clone().into(),
            BaselineField::MaintainerList => self.maintainer_list.clone().into(),
            BaselineField::DeveloperAccount => self.developer_account.clone().into(),
            BaselineField::MaxValidators => (self.max_validators as u64).into(),
            BaselineField::MaxMaintainers => (self.max_maintainers as u64).into(),
            BaselineField::MaxCommissionPercentage => {
                (self.max_commission_percentage as u64).into()
            }
        }
    }
}

fn environment_overrides() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
