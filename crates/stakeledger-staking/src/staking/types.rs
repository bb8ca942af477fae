use serde::{Deserialize, Serialize};
use stakeledger_common::{Account, Amount, PositionId, Tier, Timestamp};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    /// Accepting top-ups and withdrawals
    Open,
    /// A withdrawal is in flight; `amount` already excludes the released funds
    Releasing,
    /// Terminal, `amount` is zero
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    pub id: PositionId,
    pub owner: Account,
    pub amount: Amount,
    pub tier: Tier,
    pub start_time: Timestamp,
    pub state: PositionState,
}

impl StakePosition {
    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }

    /// Whether the position still holds stake counted towards its owner
    pub fn is_live(&self) -> bool {
        self.state != PositionState::Withdrawn
    }
}

/// Point-in-time view of every balance and position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub taken_at: Timestamp,
    pub total_staked: Amount,
    pub balances: BTreeMap<Account, Amount>,
    pub positions: Vec<StakePosition>,
}
