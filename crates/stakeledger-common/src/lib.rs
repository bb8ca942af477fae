pub mod config;
pub mod errors;
pub mod types;
pub mod utils;

pub use config::{StakingConfig, TierConfig};
pub use errors::{Error, Result};
pub use types::*;
