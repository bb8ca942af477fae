//! Token staking ledger
//! Tracks time-locked stake positions per account and keeps escrowed token
//! balances consistent with the external token they are held in.

pub mod clock;
pub mod script;
pub mod staking;
pub mod token;

use stakeledger_common::{Account, Amount, PositionId, Tier, Timestamp};
use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use staking::{
    LedgerSnapshot, PositionState, StakePosition, StakingController, StakingMetrics,
};
pub use token::{FungibleToken, InMemoryToken, TokenError};

/// Errors that can occur in staking operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown lock tier: {0}")]
    InvalidTier(Tier),

    #[error("Account {0} has no open stake position")]
    NoActivePosition(Account),

    #[error("Account {account} holds {open} open positions, a position id is required")]
    AmbiguousPosition { account: Account, open: usize },

    #[error("Position not found: {0}")]
    PositionNotFound(PositionId),

    #[error("Position {0} is not open")]
    PositionNotOpen(PositionId),

    #[error("Insufficient stake in position {position}: requested {requested}, available {available}")]
    InsufficientStake {
        position: PositionId,
        requested: Amount,
        available: Amount,
    },

    #[error("Position {position} is locked until {unlocks_at}")]
    StillLocked {
        position: PositionId,
        unlocks_at: Timestamp,
    },

    #[error("Insufficient balance for {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        account: Account,
        requested: Amount,
        available: Amount,
    },

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Token transfer failed: {0}")]
    TransferFailed(#[from] TokenError),

    #[error("Deposit not recorded ({cause}) and refund failed: {refund}; funds remain in escrow")]
    RefundFailed {
        cause: Box<StakingError>,
        refund: TokenError,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StakingError>;
