// ACCOUNT ADDRESSES
// Opaque on-chain addresses as rendered by the solido CLI (base58 strings).
//
// INVARIANTS:
// 1. An Address is never empty and never contains whitespace
// 2. Two addresses are equal iff their canonical strings are equal

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must not be empty")]
    Empty,

    #[error("address `{0}` contains whitespace")]
    Whitespace(String),
}

/// Account address (vote account, program, instance, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Result<Self, AddressError> {
        let value = value.into();
        if value.is_empty() {
            return Err(AddressError::Empty);
        }
        if value.chars().any(char::is_whitespace) {
            return Err(AddressError::Whitespace(value));
        }
        Ok(Address(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::new(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Parse a newline separated address list.
///
/// Only the first word of each line is used, so lines may carry trailing
/// annotations. Blank lines and `#` comments are skipped.
pub fn parse_address_list(text: &str) -> BTreeSet<Address> {
    let mut addresses = BTreeSet::new();

    for (index, line) in text.lines().enumerate() {
        let Some(word) = line.split_whitespace().next() else {
            continue;
        };
        if word.starts_with('#') {
            continue;
        }

        // A whitespace-split word is always a valid address.
        if !addresses.insert(Address(word.to_string())) {
            warn!("Duplicate address {} on line {} ignored", word, index + 1);
        }
    }

    addresses
}
