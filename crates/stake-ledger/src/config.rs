//! Ledger configuration
//!
//! Built once at node start and passed by reference into every component.
//! Nothing in the crate reads thresholds or policy terms from anywhere else.

use crate::error::{LedgerError, Result};
use crate::policy::{PolicyTable, PositionPolicy};
use crate::record::Role;
use crate::types::{Address, BlockNumber, U256};
use serde::{Deserialize, Serialize};

/// Periodic interest payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestConfig {
    /// Account that funds interest payouts
    pub reward_pool: Address,

    /// Blocks between payouts
    pub interval_blocks: BlockNumber,

    /// Amount split across all positions per payout
    pub amount_per_interval: U256,
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            reward_pool: Address::from_low_u64(0x1002),
            interval_blocks: 17_280,            // one day at 5-second blocks
            amount_per_interval: U256::from(10_000u64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Contract that holds every deposit and the ledger's own storage
    pub deposit_contract: Address,

    /// Minimum role-eligible stake for validators
    pub validator_threshold: U256,

    /// Minimum role-eligible stake for miners
    pub miner_threshold: U256,

    /// Ascending stake thresholds for validator group level rates
    pub level_thresholds: Vec<U256>,

    /// Policy version in force
    pub policy_version: u32,

    /// Every known policy version
    pub policies: Vec<PolicyTable>,

    pub interest: InterestConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            deposit_contract: Address::from_low_u64(0x1001),
            validator_threshold: U256::from(100_000u64),
            miner_threshold: U256::from(10_000u64),
            level_thresholds: vec![
                U256::zero(),
                U256::from(100_000u64),
                U256::from(1_000_000u64),
            ],
            policy_version: 1,
            policies: vec![PolicyTable::v1()],
            interest: InterestConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Load and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.policy_table()?;
        for table in &self.policies {
            table.validate()?;
        }
        if self.miner_threshold > self.validator_threshold {
            return Err(LedgerError::Config(
                "miner threshold above validator threshold".into(),
            ));
        }
        if self.level_thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(LedgerError::Config(
                "level thresholds must be strictly ascending".into(),
            ));
        }
        if self.interest.interval_blocks == 0 {
            return Err(LedgerError::Config("zero interest interval".into()));
        }
        Ok(())
    }

    /// Active policy table
    pub fn policy_table(&self) -> Result<&PolicyTable> {
        self.policies
            .iter()
            .find(|t| t.version == self.policy_version)
            .ok_or_else(|| {
                LedgerError::Config(format!("policy version {} missing", self.policy_version))
            })
    }

    /// Active policy for a deposit type
    pub fn policy(&self, deposit_type: u32) -> Result<PositionPolicy<'_>> {
        self.policy_table()?.policy(deposit_type)
    }

    /// Stake needed to hold `role`; zero for no role
    pub fn threshold(&self, role: Role) -> U256 {
        match role {
            Role::None => U256::zero(),
            Role::Miner => self.miner_threshold,
            Role::Validator => self.validator_threshold,
        }
    }
}
