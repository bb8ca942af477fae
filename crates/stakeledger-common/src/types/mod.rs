//! Common data types used throughout the stakeledger system

pub mod account;

pub use account::Account;

/// Token amount in the token's smallest unit
pub type Amount = u128;

/// Identifier of a stake position, unique for the lifetime of a ledger
pub type PositionId = u64;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Lock tier selector
pub type Tier = u32;
