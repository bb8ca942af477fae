//! Account identity
//!
//! Accounts are opaque, address-like identities. The ledger never owns or
//! creates them; it only keys balances and positions by them.

use {
    serde::{Deserialize, Serialize},
    std::fmt::{Display, Formatter, Result as FmtResult},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(String);

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }
}

impl Display for Account {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl From<&str> for Account {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Account {
    fn from(address: String) -> Self {
        Self(address)
    }
}
