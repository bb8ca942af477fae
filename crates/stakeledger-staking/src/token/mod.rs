//! Fungible token collaborator
//!
//! The ledger never moves balances itself. Deposits are pulled into escrow
//! and withdrawals pushed back out through a [`FungibleToken`] implementation
//! handed to the controller at construction.

mod memory;

pub use memory::InMemoryToken;

use async_trait::async_trait;
use stakeledger_common::{Account, Amount};
use thiserror::Error;

/// Error reported by a token implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Amount, need: Amount },

    #[error("Insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance { have: Amount, need: Amount },

    #[error("Zero amount not allowed")]
    ZeroAmount,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

pub type TokenResult<T> = std::result::Result<T, TokenError>;

/// ERC-20 style token operations the staking controller relies on
#[async_trait]
pub trait FungibleToken: Send + Sync {
    /// Move `amount` from `from` to `to`
    async fn transfer(&self, from: &Account, to: &Account, amount: Amount) -> TokenResult<()>;

    /// Move `amount` from `owner` to `to`, spending `spender`'s allowance
    async fn transfer_from(
        &self,
        spender: &Account,
        owner: &Account,
        to: &Account,
        amount: Amount,
    ) -> TokenResult<()>;

    /// Set the allowance `spender` may draw from `owner`
    async fn approve(&self, owner: &Account, spender: &Account, amount: Amount) -> TokenResult<()>;

    async fn balance_of(&self, account: &Account) -> Amount;

    async fn allowance(&self, owner: &Account, spender: &Account) -> Amount;
}
