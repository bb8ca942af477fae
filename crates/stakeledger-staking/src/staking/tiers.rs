//! Lock tier table

use crate::{Result, StakingError};
use stakeledger_common::{utils::seconds_between, Tier, TierConfig, Timestamp};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct TierTable {
    locks: BTreeMap<Tier, u64>,
}

impl TierTable {
    pub fn new(tiers: &[TierConfig]) -> Self {
        Self {
            locks: tiers.iter().map(|t| (t.tier, t.lock_secs)).collect(),
        }
    }

    pub fn lock_secs(&self, tier: Tier) -> Result<u64> {
        self.locks
            .get(&tier)
            .copied()
            .ok_or(StakingError::InvalidTier(tier))
    }

    pub fn unlocks_at(&self, tier: Tier, start: Timestamp) -> Result<Timestamp> {
        let lock = Timestamp::try_from(self.lock_secs(tier)?).unwrap_or(Timestamp::MAX);
        Ok(start.saturating_add(lock))
    }

    pub fn is_unlocked(&self, tier: Tier, start: Timestamp, now: Timestamp) -> Result<bool> {
        Ok(seconds_between(start, now) >= self.lock_secs(tier)?)
    }
}
