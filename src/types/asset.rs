//! Asset identification: the native gas asset or an issued token.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::ids::Address;

/// Error returned when parsing an invalid asset code.
#[derive(Debug, Clone, Error)]
#[error("invalid asset code: expected 1-12 alphanumeric characters, got {0:?}")]
pub struct InvalidAssetCode(String);

/// A short alphanumeric token code (1-12 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AssetCode(String);

impl AssetCode {
    /// Parses a string as an asset code.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidAssetCode> {
        let s = s.into();
        if (1..=12).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(AssetCode(s))
        } else {
            Err(InvalidAssetCode(s.chars().take(16).collect()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for AssetCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AssetCode::parse(s).map_err(serde::de::Error::custom)
    }
}

/// An asset: the chain's native gas coin or a token issued by an account.
///
/// Issued assets require a destination-side trust line before they can be
/// received; the native asset does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Asset {
    /// The native gas coin.
    Native,

    /// A token identified by its code and issuing account.
    Issued { code: AssetCode, issuer: Address },
}

impl Asset {
    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    /// Returns the issuing account for an issued asset.
    pub fn issuer(&self) -> Option<&Address> {
        match self {
            Asset::Native => None,
            Asset::Issued { issuer, .. } => Some(issuer),
        }
    }

    /// Returns the token code for an issued asset.
    pub fn code(&self) -> Option<&AssetCode> {
        match self {
            Asset::Native => None,
            Asset::Issued { code, .. } => Some(code),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Issued { code, issuer } => write!(f, "{}:{}", code, issuer.short()),
        }
    }
}
