//! In-process token with ERC-20 transfer and allowance semantics

use super::{FungibleToken, TokenError, TokenResult};
use async_trait::async_trait;
use stakeledger_common::{Account, Amount};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct TokenState {
    balances: HashMap<Account, Amount>,
    allowances: HashMap<(Account, Account), Amount>, // (owner, spender) -> remaining
}

impl TokenState {
    fn balance(&self, account: &Account) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn move_balance(&mut self, from: &Account, to: &Account, amount: Amount) -> TokenResult<()> {
        if amount == 0 {
            return Err(TokenError::ZeroAmount);
        }

        let have = self.balance(from);
        let remaining = have
            .checked_sub(amount)
            .ok_or(TokenError::InsufficientBalance { have, need: amount })?;

        if from == to {
            return Ok(());
        }

        let credited = self
            .balance(to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;

        self.balances.insert(from.clone(), remaining);
        self.balances.insert(to.clone(), credited);
        Ok(())
    }
}

/// Fixed-supply token held entirely in memory
#[derive(Debug)]
pub struct InMemoryToken {
    name: String,
    state: RwLock<TokenState>,
}

impl InMemoryToken {
    /// Creates a token whose whole supply starts in `treasury`
    pub fn new(name: impl Into<String>, treasury: Account, total_supply: Amount) -> Self {
        let mut state = TokenState::default();
        state.balances.insert(treasury, total_supply);

        Self {
            name: name.into(),
            state: RwLock::new(state),
        }
    }
}

#[async_trait]
impl FungibleToken for InMemoryToken {
    async fn transfer(&self, from: &Account, to: &Account, amount: Amount) -> TokenResult<()> {
        let mut state = self.state.write().await;
        state.move_balance(from, to, amount)?;
        debug!("{}: transferred {} from {} to {}", self.name, amount, from, to);
        Ok(())
    }

    async fn transfer_from(
        &self,
        spender: &Account,
        owner: &Account,
        to: &Account,
        amount: Amount,
    ) -> TokenResult<()> {
        let mut state = self.state.write().await;

        let key = (owner.clone(), spender.clone());
        let have = state.allowances.get(&key).copied().unwrap_or(0);
        let remaining = have
            .checked_sub(amount)
            .ok_or(TokenError::InsufficientAllowance { have, need: amount })?;

        state.move_balance(owner, to, amount)?;
        state.allowances.insert(key, remaining);

        debug!(
            "{}: {} moved {} from {} to {}",
            self.name, spender, amount, owner, to
        );
        Ok(())
    }

    async fn approve(&self, owner: &Account, spender: &Account, amount: Amount) -> TokenResult<()> {
        let mut state = self.state.write().await;
        state
            .allowances
            .insert((owner.clone(), spender.clone()), amount);
        Ok(())
    }

    async fn balance_of(&self, account: &Account) -> Amount {
        self.state.read().await.balance(account)
    }

    async fn allowance(&self, owner: &Account, spender: &Account) -> Amount {
        self.state
            .read()
            .await
            .allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }
}
