//! Configuration types for the stakeledger system

use {
    std::{collections::HashSet, fs, path::Path},
    serde::{Deserialize, Serialize},
};

use crate::{
    errors::{Error, Result},
    types::{Account, Amount, Tier},
};

const DAY_SECS: u64 = 86_400;

/// Staking policy: who holds escrow, the minimum opening deposit and the
/// lock duration of each tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingConfig {
    #[serde(default = "default_escrow_account")]
    pub escrow_account: Account,

    #[serde(default = "default_min_stake")]
    pub min_stake: Amount,

    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    pub tier: Tier,
    /// Seconds a position must stay staked before it can be withdrawn
    pub lock_secs: u64,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            escrow_account: default_escrow_account(),
            min_stake: default_min_stake(),
            tiers: default_tiers(),
        }
    }
}

impl StakingConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str::<Self>(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_stake == 0 {
            return Err(Error::Config("min_stake must be at least 1".into()));
        }
        if self.tiers.is_empty() {
            return Err(Error::Config("at least one lock tier is required".into()));
        }

        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if !seen.insert(tier.tier) {
                return Err(Error::Config(format!("duplicate lock tier {}", tier.tier)));
            }
        }
        Ok(())
    }
}

fn default_escrow_account() -> Account {
    Account::from("stakeledger-escrow")
}

fn default_min_stake() -> Amount {
    1
}

fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig { tier: 0, lock_secs: 0 },
        TierConfig { tier: 1, lock_secs: 30 * DAY_SECS },
        TierConfig { tier: 2, lock_secs: 90 * DAY_SECS },
        TierConfig { tier: 3, lock_secs: 180 * DAY_SECS },
    ]
}
