//! Replays a list of staking operations against an in-memory token.
//! Backs the `stakeledger run` command.

use crate::{
    clock::ManualClock,
    staking::{LedgerSnapshot, StakingController},
    token::{FungibleToken, InMemoryToken},
    Result,
};
use serde::{Deserialize, Serialize};
use stakeledger_common::{Account, Amount, PositionId, StakingConfig, Tier, Timestamp};
use std::{fs, path::Path, sync::Arc};
use tracing::{info, warn};

const ETHER: Amount = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Send tokens from the treasury
    Fund { account: Account, amount: Amount },
    /// Let the staking escrow draw `amount` from `account`
    Approve { account: Account, amount: Amount },
    StartStaking {
        account: Account,
        amount: Amount,
        tier: Tier,
    },
    Stake {
        account: Account,
        amount: Amount,
        #[serde(default)]
        position: Option<PositionId>,
    },
    Withdraw {
        account: Account,
        amount: Amount,
        #[serde(default)]
        position: Option<PositionId>,
    },
    AdvanceTime { secs: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    #[serde(default = "default_treasury")]
    pub treasury: Account,
    pub supply: Amount,
    #[serde(default)]
    pub start_time: Timestamp,
    pub operations: Vec<Operation>,
}

impl Script {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Fund an account, open a tier-0 position, top it up once and withdraw
    /// half of it again
    pub fn deposit_top_up_withdraw() -> Self {
        let staker = Account::from("addr1");
        let stake = 10_000_000 * ETHER;

        Self {
            treasury: default_treasury(),
            supply: 100_000_000_000 * ETHER,
            start_time: 0,
            operations: vec![
                Operation::Fund { account: staker.clone(), amount: 100_000_000 * ETHER },
                Operation::Approve { account: staker.clone(), amount: stake },
                Operation::StartStaking { account: staker.clone(), amount: stake, tier: 0 },
                Operation::Approve { account: staker.clone(), amount: stake },
                Operation::Stake { account: staker.clone(), amount: stake, position: None },
                Operation::Withdraw { account: staker, amount: stake, position: None },
            ],
        }
    }
}

fn default_treasury() -> Account {
    Account::from("treasury")
}

/// Outcome of one replayed operation
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub operation: Operation,
    pub error: Option<String>,
    pub staked_after: Option<Amount>,
}

pub struct ScriptRunner {
    token: Arc<InMemoryToken>,
    clock: Arc<ManualClock>,
    controller: StakingController,
    treasury: Account,
}

impl ScriptRunner {
    pub fn new(config: StakingConfig, script: &Script) -> Result<Self> {
        let token = Arc::new(InMemoryToken::new(
            "stakeledger-demo",
            script.treasury.clone(),
            script.supply,
        ));
        let clock = Arc::new(ManualClock::new(script.start_time));
        let controller = StakingController::new(config, token.clone(), clock.clone())?;

        Ok(Self {
            token,
            clock,
            controller,
            treasury: script.treasury.clone(),
        })
    }

    pub fn controller(&self) -> &StakingController {
        &self.controller
    }

    /// Runs every operation in order. Failed operations are reported and the
    /// replay continues.
    pub async fn run(&self, operations: &[Operation]) -> Vec<StepReport> {
        let mut reports = Vec::with_capacity(operations.len());

        for (step, operation) in operations.iter().enumerate() {
            let error = match self.apply(operation).await {
                Ok(()) => None,
                Err(err) => {
                    warn!("Step {} ({:?}) failed: {}", step, operation, err);
                    Some(err.to_string())
                }
            };

            let staked_after = match operation {
                Operation::StartStaking { account, .. }
                | Operation::Stake { account, .. }
                | Operation::Withdraw { account, .. } => {
                    Some(self.controller.staked_amount(account).await)
                }
                _ => None,
            };
            if let Some(staked) = staked_after {
                info!("Step {}: staked amount now {}", step, staked);
            }

            reports.push(StepReport {
                step,
                operation: operation.clone(),
                error,
                staked_after,
            });
        }

        reports
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.controller.snapshot().await
    }

    async fn apply(&self, operation: &Operation) -> Result<()> {
        match operation {
            Operation::Fund { account, amount } => {
                self.token.transfer(&self.treasury, account, *amount).await?;
            }
            Operation::Approve { account, amount } => {
                self.token
                    .approve(account, self.controller.escrow_account(), *amount)
                    .await?;
            }
            Operation::StartStaking { account, amount, tier } => {
                self.controller.start_staking(account, *amount, *tier).await?;
            }
            Operation::Stake { account, amount, position: Some(id) } => {
                self.controller.stake_position(account, *id, *amount).await?;
            }
            Operation::Stake { account, amount, position: None } => {
                self.controller.stake(account, *amount).await?;
            }
            Operation::Withdraw { account, amount, position: Some(id) } => {
                self.controller.withdraw_position(account, *id, *amount).await?;
            }
            Operation::Withdraw { account, amount, position: None } => {
                self.controller.withdraw(account, *amount).await?;
            }
            Operation::AdvanceTime { secs } => {
                self.clock.advance(*secs);
            }
        }
        Ok(())
    }
}
