// crates/stakeledger-staking/src/staking/mod.rs

mod ledger;
mod metrics;
mod registry;
mod tiers;
pub mod types;

pub use ledger::BalanceLedger;
pub use metrics::{MetricsSnapshot, StakingMetrics};
pub use registry::PositionRegistry;
pub use tiers::TierTable;
pub use types::{LedgerSnapshot, PositionState, StakePosition};

use crate::{clock::Clock, token::FungibleToken, Result, StakingError};
use stakeledger_common::{
    utils::format_timestamp, Account, Amount, PositionId, StakingConfig, Tier, Timestamp,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Ledger and registry, always mutated together under one lock
#[derive(Debug, Default)]
struct LedgerState {
    ledger: BalanceLedger,
    registry: PositionRegistry,
}

/// Funds taken out of a position while the outbound transfer is in flight
#[derive(Debug, Clone, Copy)]
struct Release {
    position: PositionId,
    amount: Amount,
}

impl LedgerState {
    /// Positions of other accounts are not addressable by `caller`
    fn owned(&self, caller: &Account, id: PositionId) -> Result<&StakePosition> {
        self.registry
            .get(id)
            .filter(|position| &position.owner == caller)
            .ok_or(StakingError::PositionNotFound(id))
    }

    fn sole_open_position(&self, caller: &Account) -> Result<PositionId> {
        let open = self.registry.open_positions_of(caller);
        match open.as_slice() {
            [] => Err(StakingError::NoActivePosition(caller.clone())),
            [position] => Ok(position.id),
            _ => Err(StakingError::AmbiguousPosition {
                account: caller.clone(),
                open: open.len(),
            }),
        }
    }

    fn check_top_up(&self, caller: &Account, id: PositionId, amount: Amount) -> Result<()> {
        if !self.owned(caller, id)?.is_open() {
            return Err(StakingError::PositionNotOpen(id));
        }
        self.ledger.check_credit(caller, amount)
    }

    fn open_position(
        &mut self,
        owner: &Account,
        amount: Amount,
        tier: Tier,
        now: Timestamp,
    ) -> Result<PositionId> {
        // credit cannot fail once checked under the same lock
        self.ledger.check_credit(owner, amount)?;
        let id = self.registry.open(owner.clone(), amount, tier, now)?;
        self.ledger.credit(owner, amount)?;
        Ok(id)
    }

    fn top_up(&mut self, caller: &Account, id: PositionId, amount: Amount) -> Result<Amount> {
        self.check_top_up(caller, id, amount)?;
        let new_amount = self.registry.increase(id, amount)?;
        self.ledger.credit(caller, amount)?;
        Ok(new_amount)
    }

    fn begin_release(
        &mut self,
        caller: &Account,
        id: PositionId,
        amount: Amount,
        now: Timestamp,
        tiers: &TierTable,
    ) -> Result<Release> {
        let position = self.owned(caller, id)?;
        if !position.is_open() {
            return Err(StakingError::PositionNotOpen(id));
        }
        if !tiers.is_unlocked(position.tier, position.start_time, now)? {
            return Err(StakingError::StillLocked {
                position: id,
                unlocks_at: tiers.unlocks_at(position.tier, position.start_time)?,
            });
        }

        self.registry.begin_release(id, amount)?;
        if let Err(err) = self.ledger.debit(caller, amount) {
            self.registry.revert_release(id, amount)?;
            return Err(err);
        }

        Ok(Release {
            position: id,
            amount,
        })
    }

    fn revert_release(&mut self, caller: &Account, release: Release) -> Result<()> {
        self.registry
            .revert_release(release.position, release.amount)?;
        self.ledger.credit(caller, release.amount)
    }

    fn snapshot(&self, taken_at: Timestamp) -> LedgerSnapshot {
        LedgerSnapshot {
            taken_at,
            total_staked: self.ledger.total(),
            balances: self.ledger.balances(),
            positions: self.registry.iter().cloned().collect(),
        }
    }
}

/// Public entry point of the staking ledger.
///
/// Every mutating operation runs as one all-or-nothing step. The token is
/// called without holding the state lock: deposits are pulled into escrow
/// before anything is credited, and withdrawals are debited before the
/// funds are pushed out, then undone if the push fails.
pub struct StakingController {
    config: StakingConfig,
    tiers: TierTable,
    token: Arc<dyn FungibleToken>,
    clock: Arc<dyn Clock>,
    state: RwLock<LedgerState>,
    metrics: Arc<StakingMetrics>,
}

impl StakingController {
    pub fn new(
        config: StakingConfig,
        token: Arc<dyn FungibleToken>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| StakingError::Config(e.to_string()))?;

        Ok(Self {
            tiers: TierTable::new(&config.tiers),
            config,
            token,
            clock,
            state: RwLock::new(LedgerState::default()),
            metrics: StakingMetrics::new(),
        })
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    /// Account the controller holds deposits under; depositors approve it
    /// as spender before staking
    pub fn escrow_account(&self) -> &Account {
        &self.config.escrow_account
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Opens a new position of `amount` at lock `tier`, pulling the funds
    /// from `caller` into escrow first
    pub async fn start_staking(
        &self,
        caller: &Account,
        amount: Amount,
        tier: Tier,
    ) -> Result<PositionId> {
        if amount == 0 || amount < self.config.min_stake {
            return Err(StakingError::InvalidAmount(format!(
                "stake of {} is below the minimum of {}",
                amount, self.config.min_stake
            )));
        }
        self.tiers.lock_secs(tier)?;
        self.state.read().await.ledger.check_credit(caller, amount)?;

        self.pull(caller, amount).await?;

        let opened = {
            let mut state = self.state.write().await;
            state.open_position(caller, amount, tier, self.clock.now())
        };

        match opened {
            Ok(id) => {
                self.metrics.increment_positions_opened();
                info!("Opened position {} for {}: {} at tier {}", id, caller, amount, tier);
                Ok(id)
            }
            Err(err) => Err(self.refund(caller, amount, err).await),
        }
    }

    /// Adds `amount` to the caller's only open position and returns its id
    pub async fn stake(&self, caller: &Account, amount: Amount) -> Result<PositionId> {
        let id = self.state.read().await.sole_open_position(caller)?;
        self.stake_position(caller, id, amount).await?;
        Ok(id)
    }

    /// Adds `amount` to position `id`, returning the position's new amount
    pub async fn stake_position(
        &self,
        caller: &Account,
        id: PositionId,
        amount: Amount,
    ) -> Result<Amount> {
        if amount == 0 {
            return Err(StakingError::InvalidAmount(
                "stake must be greater than zero".into(),
            ));
        }
        self.state.read().await.check_top_up(caller, id, amount)?;

        self.pull(caller, amount).await?;

        // the position may have changed while the pull was in flight
        let topped_up = {
            let mut state = self.state.write().await;
            state.top_up(caller, id, amount)
        };

        match topped_up {
            Ok(new_amount) => {
                self.metrics.increment_top_ups();
                info!("Position {} of {} increased by {} to {}", id, caller, amount, new_amount);
                Ok(new_amount)
            }
            Err(err) => Err(self.refund(caller, amount, err).await),
        }
    }

    /// Withdraws `amount` from the caller's only open position and returns
    /// its id
    pub async fn withdraw(&self, caller: &Account, amount: Amount) -> Result<PositionId> {
        let id = self.state.read().await.sole_open_position(caller)?;
        self.withdraw_position(caller, id, amount).await?;
        Ok(id)
    }

    /// Withdraws `amount` from position `id` once its lock has elapsed.
    /// Withdrawing the whole amount closes the position for good.
    pub async fn withdraw_position(
        &self,
        caller: &Account,
        id: PositionId,
        amount: Amount,
    ) -> Result<PositionState> {
        if amount == 0 {
            return Err(StakingError::InvalidAmount(
                "withdrawal must be greater than zero".into(),
            ));
        }

        let release = {
            let mut state = self.state.write().await;
            state.begin_release(caller, id, amount, self.clock.now(), &self.tiers)
        };
        let release = match release {
            Ok(release) => release,
            Err(err) => {
                if let StakingError::StillLocked { unlocks_at, .. } = &err {
                    debug!(
                        "Position {} of {} is locked until {}",
                        id,
                        caller,
                        format_timestamp(*unlocks_at)
                    );
                }
                return Err(err);
            }
        };
        debug!("Releasing {} from position {} to {}", amount, id, caller);

        match self
            .token
            .transfer(&self.config.escrow_account, caller, amount)
            .await
        {
            Ok(()) => {
                let settled = self.state.write().await.registry.settle_release(id)?;
                let closed = settled == PositionState::Withdrawn;
                self.metrics.increment_withdrawals(closed);
                info!(
                    "Withdrew {} from position {} of {}{}",
                    amount,
                    id,
                    caller,
                    if closed { ", position closed" } else { "" }
                );
                Ok(settled)
            }
            Err(err) => {
                self.metrics.increment_transfer_failures();
                self.metrics.increment_rollbacks();
                warn!(
                    "Returning {} from escrow to {} failed, restoring position {}: {}",
                    amount, caller, id, err
                );
                self.state.write().await.revert_release(caller, release)?;
                Err(StakingError::TransferFailed(err))
            }
        }
    }

    pub async fn staked_amount(&self, account: &Account) -> Amount {
        self.state.read().await.ledger.total_staked(account)
    }

    /// Aggregate staked across all accounts
    pub async fn total_staked(&self) -> Amount {
        self.state.read().await.ledger.total()
    }

    pub async fn position(&self, id: PositionId) -> Option<StakePosition> {
        self.state.read().await.registry.get(id).cloned()
    }

    /// Every position `owner` opened, oldest first, whatever its state
    pub async fn positions_of(&self, owner: &Account) -> Vec<StakePosition> {
        let state = self.state.read().await;
        state
            .registry
            .positions_of(owner)
            .into_iter()
            .filter_map(|id| state.registry.get(id).cloned())
            .collect()
    }

    pub async fn open_positions_of(&self, owner: &Account) -> Vec<StakePosition> {
        self.state
            .read()
            .await
            .registry
            .open_positions_of(owner)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.read().await.snapshot(self.clock.now())
    }

    async fn pull(&self, caller: &Account, amount: Amount) -> Result<()> {
        let escrow = &self.config.escrow_account;
        self.token
            .transfer_from(escrow, caller, escrow, amount)
            .await
            .map_err(|err| {
                self.metrics.increment_transfer_failures();
                warn!("Pulling {} from {} into escrow failed: {}", amount, caller, err);
                StakingError::TransferFailed(err)
            })
    }

    /// Sends a pulled deposit back after it could not be recorded. Returns
    /// the error that prevented recording it, wrapped in `RefundFailed` if
    /// the funds could not be returned either.
    async fn refund(&self, caller: &Account, amount: Amount, cause: StakingError) -> StakingError {
        self.metrics.increment_rollbacks();
        warn!("Deposit of {} from {} not recorded ({}), refunding", amount, caller, cause);

        match self
            .token
            .transfer(&self.config.escrow_account, caller, amount)
            .await
        {
            Ok(()) => cause,
            Err(err) => {
                self.metrics.increment_transfer_failures();
                error!("Refund of {} to {} failed, funds remain in escrow: {}", amount, caller, err);
                StakingError::RefundFailed {
                    cause: Box::new(cause),
                    refund: err,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::token::{TokenError, TokenResult};
    use async_trait::async_trait;
    use mockall::{mock, predicate::eq};
    use stakeledger_common::TierConfig;

    mock! {
        pub Token {}

        #[async_trait]
        impl FungibleToken for Token {
            async fn transfer(&self, from: &Account, to: &Account, amount: Amount) -> TokenResult<()>;
            async fn transfer_from(
                &self,
                spender: &Account,
                owner: &Account,
                to: &Account,
                amount: Amount,
            ) -> TokenResult<()>;
            async fn approve(&self, owner: &Account, spender: &Account, amount: Amount) -> TokenResult<()>;
            async fn balance_of(&self, account: &Account) -> Amount;
            async fn allowance(&self, owner: &Account, spender: &Account) -> Amount;
        }
    }

    const DAY: u64 = 86_400;

    fn config() -> StakingConfig {
        StakingConfig {
            escrow_account: Account::from("escrow"),
            min_stake: 10,
            tiers: vec![
                TierConfig { tier: 0, lock_secs: 0 },
                TierConfig { tier: 1, lock_secs: 30 * DAY },
            ],
        }
    }

    fn alice() -> Account {
        Account::from("alice")
    }

    fn controller(token: MockToken) -> (StakingController, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let controller = StakingController::new(config(), Arc::new(token), clock.clone()).unwrap();
        (controller, clock)
    }

    fn accepting_pulls(token: &mut MockToken) {
        token
            .expect_transfer_from()
            .returning(|_, _, _, _| Ok(()));
    }

    #[tokio::test]
    async fn test_start_staking_rejects_zero_and_small_amounts() {
        // no expectations: any token call fails the test
        let (controller, _) = controller(MockToken::new());

        for amount in [0, 9] {
            let err = controller.start_staking(&alice(), amount, 0).await.unwrap_err();
            assert!(matches!(err, StakingError::InvalidAmount(_)));
        }
        assert_eq!(controller.staked_amount(&alice()).await, 0);
        assert!(controller.positions_of(&alice()).await.is_empty());
    }

    #[tokio::test]
    async fn test_start_staking_rejects_unknown_tier() {
        let (controller, _) = controller(MockToken::new());

        let err = controller.start_staking(&alice(), 100, 5).await.unwrap_err();
        assert_eq!(err, StakingError::InvalidTier(5));
    }

    #[tokio::test]
    async fn test_start_staking_pulls_into_escrow() {
        let mut token = MockToken::new();
        token
            .expect_transfer_from()
            .with(eq(Account::from("escrow")), eq(alice()), eq(Account::from("escrow")), eq(100))
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let (controller, _) = controller(token);

        let id = controller.start_staking(&alice(), 100, 1).await.unwrap();

        let position = controller.position(id).await.unwrap();
        assert_eq!(position.amount, 100);
        assert_eq!(position.tier, 1);
        assert_eq!(position.start_time, 1_700_000_000);
        assert_eq!(controller.staked_amount(&alice()).await, 100);
        assert_eq!(controller.metrics().positions_opened, 1);
    }

    #[tokio::test]
    async fn test_rejected_pull_records_nothing() {
        let mut token = MockToken::new();
        token
            .expect_transfer_from()
            .times(1)
            .returning(|_, _, _, _| Err(TokenError::InsufficientAllowance { have: 0, need: 100 }));
        let (controller, _) = controller(token);

        let err = controller.start_staking(&alice(), 100, 0).await.unwrap_err();

        assert_eq!(
            err,
            StakingError::TransferFailed(TokenError::InsufficientAllowance { have: 0, need: 100 })
        );
        assert_eq!(controller.staked_amount(&alice()).await, 0);
        assert_eq!(controller.total_staked().await, 0);
        assert!(controller.positions_of(&alice()).await.is_empty());
        assert_eq!(controller.metrics().transfer_failures, 1);
    }

    #[tokio::test]
    async fn test_overflow_detected_before_pull() {
        let mut token = MockToken::new();
        token
            .expect_transfer_from()
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let (controller, _) = controller(token);

        controller.start_staking(&alice(), Amount::MAX, 0).await.unwrap();
        let err = controller
            .start_staking(&Account::from("bob"), 10, 0)
            .await
            .unwrap_err();

        assert_eq!(err, StakingError::Overflow);
        assert_eq!(controller.total_staked().await, Amount::MAX);
    }

    #[tokio::test]
    async fn test_stake_without_position() {
        let (controller, _) = controller(MockToken::new());
        let bob = Account::from("bob");

        let err = controller.stake(&bob, 50).await.unwrap_err();
        assert_eq!(err, StakingError::NoActivePosition(bob.clone()));
        assert_eq!(controller.staked_amount(&bob).await, 0);
    }

    #[tokio::test]
    async fn test_stake_with_several_positions_is_ambiguous() {
        let mut token = MockToken::new();
        accepting_pulls(&mut token);
        let (controller, _) = controller(token);

        let first = controller.start_staking(&alice(), 100, 0).await.unwrap();
        controller.start_staking(&alice(), 100, 1).await.unwrap();

        let err = controller.stake(&alice(), 10).await.unwrap_err();
        assert_eq!(
            err,
            StakingError::AmbiguousPosition {
                account: alice(),
                open: 2
            }
        );

        assert_eq!(controller.stake_position(&alice(), first, 10).await.unwrap(), 110);
        assert_eq!(controller.staked_amount(&alice()).await, 210);
    }

    #[tokio::test]
    async fn test_foreign_position_is_not_addressable() {
        let mut token = MockToken::new();
        accepting_pulls(&mut token);
        let (controller, _) = controller(token);
        let bob = Account::from("bob");

        let id = controller.start_staking(&alice(), 100, 0).await.unwrap();

        assert_eq!(
            controller.stake_position(&bob, id, 10).await,
            Err(StakingError::PositionNotFound(id))
        );
        assert_eq!(
            controller.withdraw_position(&bob, id, 10).await,
            Err(StakingError::PositionNotFound(id))
        );
        assert_eq!(controller.staked_amount(&alice()).await, 100);
    }

    #[tokio::test]
    async fn test_withdraw_before_lock_elapses() {
        let mut token = MockToken::new();
        accepting_pulls(&mut token);
        token.expect_transfer().times(1).returning(|_, _, _| Ok(()));
        let (controller, clock) = controller(token);

        let id = controller.start_staking(&alice(), 100, 1).await.unwrap();
        clock.advance(30 * DAY - 1);

        let err = controller.withdraw(&alice(), 100).await.unwrap_err();
        assert_eq!(
            err,
            StakingError::StillLocked {
                position: id,
                unlocks_at: 1_700_000_000 + (30 * DAY) as i64,
            }
        );
        let position = controller.position(id).await.unwrap();
        assert!(position.is_open());
        assert_eq!(position.amount, 100);

        clock.advance(1);
        controller.withdraw(&alice(), 100).await.unwrap();
        assert_eq!(controller.staked_amount(&alice()).await, 0);
    }

    #[tokio::test]
    async fn test_full_withdrawal_closes_position_once() {
        let mut token = MockToken::new();
        accepting_pulls(&mut token);
        token
            .expect_transfer()
            .with(eq(Account::from("escrow")), eq(alice()), eq(100))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let (controller, _) = controller(token);

        let id = controller.start_staking(&alice(), 100, 0).await.unwrap();
        let state = controller.withdraw_position(&alice(), id, 100).await.unwrap();

        assert_eq!(state, PositionState::Withdrawn);
        assert_eq!(controller.staked_amount(&alice()).await, 0);
        assert_eq!(
            controller.withdraw_position(&alice(), id, 100).await,
            Err(StakingError::PositionNotOpen(id))
        );
        assert_eq!(
            controller.stake_position(&alice(), id, 100).await,
            Err(StakingError::PositionNotOpen(id))
        );

        let metrics = controller.metrics();
        assert_eq!(metrics.withdrawals, 1);
        assert_eq!(metrics.positions_withdrawn, 1);
    }

    #[tokio::test]
    async fn test_withdraw_more_than_staked() {
        let mut token = MockToken::new();
        accepting_pulls(&mut token);
        let (controller, _) = controller(token);

        let id = controller.start_staking(&alice(), 100, 0).await.unwrap();

        assert_eq!(
            controller.withdraw(&alice(), 101).await,
            Err(StakingError::InsufficientStake {
                position: id,
                requested: 101,
                available: 100,
            })
        );
        assert_eq!(controller.staked_amount(&alice()).await, 100);
    }

    #[tokio::test]
    async fn test_failed_push_restores_full_position() {
        let mut token = MockToken::new();
        accepting_pulls(&mut token);
        token
            .expect_transfer()
            .times(1)
            .returning(|_, _, _| Err(TokenError::Rejected("escrow frozen".into())));
        let (controller, _) = controller(token);

        let id = controller.start_staking(&alice(), 100, 0).await.unwrap();
        let before = controller.position(id).await.unwrap();

        let err = controller.withdraw(&alice(), 100).await.unwrap_err();

        assert_eq!(err, StakingError::TransferFailed(TokenError::Rejected("escrow frozen".into())));
        assert_eq!(controller.position(id).await.unwrap(), before);
        assert_eq!(controller.staked_amount(&alice()).await, 100);
        assert_eq!(controller.total_staked().await, 100);
        assert_eq!(controller.metrics().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_failed_push_restores_partial_withdrawal() {
        let mut token = MockToken::new();
        accepting_pulls(&mut token);
        token
            .expect_transfer()
            .times(1)
            .returning(|_, _, _| Err(TokenError::InsufficientBalance { have: 0, need: 40 }));
        let (controller, _) = controller(token);

        let id = controller.start_staking(&alice(), 100, 0).await.unwrap();
        assert!(controller.withdraw_position(&alice(), id, 40).await.is_err());

        let position = controller.position(id).await.unwrap();
        assert_eq!(position.state, PositionState::Open);
        assert_eq!(position.amount, 100);
        assert_eq!(controller.staked_amount(&alice()).await, 100);
    }

    #[tokio::test]
    async fn test_partial_withdrawal_keeps_position_open() {
        let mut token = MockToken::new();
        accepting_pulls(&mut token);
        token.expect_transfer().returning(|_, _, _| Ok(()));
        let (controller, _) = controller(token);

        let id = controller.start_staking(&alice(), 100, 0).await.unwrap();
        let state = controller.withdraw_position(&alice(), id, 30).await.unwrap();

        assert_eq!(state, PositionState::Open);
        assert_eq!(controller.position(id).await.unwrap().amount, 70);
        assert_eq!(controller.staked_amount(&alice()).await, 70);
        assert_eq!(controller.metrics().positions_withdrawn, 0);
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = StakingConfig {
            tiers: Vec::new(),
            ..config()
        };
        let result = StakingController::new(
            config,
            Arc::new(MockToken::new()),
            Arc::new(ManualClock::new(0)),
        );
        assert!(matches!(result, Err(StakingError::Config(_))));
    }
}
