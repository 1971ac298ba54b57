//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different identifier kinds (e.g.,
//! using a transaction hash where an account address is expected) and make the
//! code more self-documenting. Validated identifiers can only be constructed
//! through their `parse` functions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned when parsing an invalid account address.
#[derive(Debug, Clone, Error)]
#[error("invalid address: expected 'G' + 55 base32 characters, got {len} bytes: {preview}")]
pub struct InvalidAddress {
    len: usize,
    preview: String,
}

/// Error returned when parsing an invalid transaction hash.
#[derive(Debug, Clone, Error)]
#[error("invalid transaction hash: expected 64 hex characters, got {len} bytes: {preview}")]
pub struct InvalidTxHash {
    len: usize,
    preview: String,
}

/// A distributor's stable identifier, assigned by the upstream registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistributorId(pub u32);

impl fmt::Display for DistributorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DistributorId {
    fn from(n: u32) -> Self {
        DistributorId(n)
    }
}

/// A public account address ('G' followed by 55 base32 characters).
///
/// Construction is only possible via `Address::parse`, which validates the
/// input. The inner representation is always uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parses a string as an account address.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidAddress> {
        let s = s.into();
        if s.len() == 56
            && s.starts_with('G')
            && s.chars().all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        {
            Ok(Address(s))
        } else {
            Err(InvalidAddress {
                len: s.len(),
                preview: s.chars().take(12).collect(),
            })
        }
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (8-character) prefix for display.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::parse(s).map_err(serde::de::Error::custom)
    }
}

/// A submitted transaction's hash (64 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    /// Parses a string as a transaction hash, normalizing to lowercase.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidTxHash> {
        let s = s.into();
        if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(TxHash(s.to_ascii_lowercase()))
        } else {
            Err(InvalidTxHash {
                len: s.len(),
                preview: s.chars().take(12).collect(),
            })
        }
    }

    /// Returns the hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (8-character) prefix for display.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TxHash::parse(s).map_err(serde::de::Error::custom)
    }
}

/// A caller-supplied logging correlator attached to every submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub String);

impl Tag {
    pub fn new(s: impl Into<String>) -> Self {
        Tag(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Tag(s.to_string())
    }
}
