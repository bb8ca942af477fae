//! Per-account totals of staked funds

use crate::{Result, StakingError};
use stakeledger_common::{Account, Amount};
use std::collections::{BTreeMap, HashMap};

/// Authoritative staked total per account, plus the aggregate across all
/// accounts. Both are updated together so the aggregate always equals the
/// sum of the per-account totals.
#[derive(Debug, Default)]
pub struct BalanceLedger {
    balances: HashMap<Account, Amount>,
    total: Amount,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_staked(&self, account: &Account) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Aggregate staked across every account
    pub fn total(&self) -> Amount {
        self.total
    }

    /// Fails with `Overflow` if crediting `delta` to `account` would not fit
    pub fn check_credit(&self, account: &Account, delta: Amount) -> Result<()> {
        self.credited(account, delta).map(|_| ())
    }

    pub fn credit(&mut self, account: &Account, delta: Amount) -> Result<()> {
        let (balance, total) = self.credited(account, delta)?;
        self.balances.insert(account.clone(), balance);
        self.total = total;
        Ok(())
    }

    pub fn debit(&mut self, account: &Account, delta: Amount) -> Result<()> {
        let available = self.total_staked(account);
        let balance = available
            .checked_sub(delta)
            .ok_or_else(|| StakingError::InsufficientBalance {
                account: account.clone(),
                requested: delta,
                available,
            })?;
        // the aggregate is at least every single balance
        let total = self.total.checked_sub(delta).ok_or(StakingError::Overflow)?;

        if balance == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), balance);
        }
        self.total = total;
        Ok(())
    }

    pub fn balances(&self) -> BTreeMap<Account, Amount> {
        self.balances
            .iter()
            .map(|(account, amount)| (account.clone(), *amount))
            .collect()
    }

    fn credited(&self, account: &Account, delta: Amount) -> Result<(Amount, Amount)> {
        let balance = self
            .total_staked(account)
            .checked_add(delta)
            .ok_or(StakingError::Overflow)?;
        let total = self.total.checked_add(delta).ok_or(StakingError::Overflow)?;
        Ok((balance, total))
    }
}
