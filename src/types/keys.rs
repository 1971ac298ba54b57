//! Signing material and distributor credentials.
//!
//! `SigningKey` wraps a wallet's secret seed. Its `Debug` and `Display`
//! implementations redact the seed so credentials can never leak through
//! logs or error messages. Raw registry rows (`DistributorRecord`) are decoded
//! into validated `Distributor` values at refresh time; malformed rows are
//! rejected, not fatal.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::ids::{Address, DistributorId, InvalidAddress};

/// Error returned when parsing an invalid secret seed.
#[derive(Debug, Clone, Error)]
#[error("invalid signing key: expected 'S' + 55 base32 characters, got {len} bytes")]
pub struct InvalidSigningKey {
    len: usize,
}

/// Error returned when decoding a distributor record's credential material.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("bad address: {0}")]
    Address(#[from] InvalidAddress),

    #[error("bad seed: {0}")]
    Seed(#[from] InvalidSigningKey),
}

/// A wallet's secret signing seed ('S' followed by 55 base32 characters).
///
/// The seed is deliberately excluded from `Debug` and `Display` output.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningKey(String);

impl SigningKey {
    /// Parses a string as a secret seed.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidSigningKey> {
        let s = s.into();
        if s.len() == 56
            && s.starts_with('S')
            && s.chars().all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        {
            Ok(SigningKey(s))
        } else {
            Err(InvalidSigningKey { len: s.len() })
        }
    }

    /// Exposes the raw seed for gateway signing calls.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey(S…)")
    }
}

impl fmt::Display for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S…")
    }
}

/// An issuer credential: the issuing account's address plus its signing key.
///
/// Issuers can mint their asset; the recovery path uses them to refill
/// distributors that run short of a managed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub address: Address,
    pub key: SigningKey,
}

impl Issuer {
    pub fn new(address: Address, key: SigningKey) -> Self {
        Issuer { address, key }
    }
}

/// A raw distributor row as returned by the upstream registry.
///
/// Credential material is carried as plain strings; decoding happens in
/// `Distributor::try_from_record` so a malformed row can be skipped with a
/// warning instead of poisoning the whole refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributorRecord {
    pub id: DistributorId,
    pub address: String,
    pub seed: String,
    pub active: bool,
}

/// A decoded sending wallet: validated address and signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distributor {
    pub id: DistributorId,
    pub address: Address,
    pub key: SigningKey,
}

impl Distributor {
    /// Decodes a registry record into a usable distributor.
    pub fn try_from_record(record: &DistributorRecord) -> Result<Self, CredentialError> {
        Ok(Distributor {
            id: record.id,
            address: Address::parse(record.address.clone())?,
            key: SigningKey::parse(record.seed.clone())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn signing_key_parse_accepts_valid(s in "S[A-Z2-7]{55}") {
            let key = SigningKey::parse(&s).unwrap();
            prop_assert_eq!(key.expose(), s);
        }

        #[test]
        fn signing_key_parse_rejects_wrong_prefix(s in "G[A-Z2-7]{55}") {
            prop_assert!(SigningKey::parse(&s).is_err());
        }

        #[test]
        fn signing_key_parse_rejects_bad_length(s in "S[A-Z2-7]{0,54}") {
            prop_assert!(SigningKey::parse(&s).is_err());
        }

        #[test]
        fn debug_and_display_never_leak_seed(s in "S[A-Z2-7]{55}") {
            let key = SigningKey::parse(&s).unwrap();
            let debug = format!("{:?}", key);
            let display = format!("{}", key);
            prop_assert!(!debug.contains(&s[1..]));
            prop_assert!(!display.contains(&s[1..]));
        }
    }

    #[test]
    fn decode_valid_record() {
        let record = DistributorRecord {
            id: DistributorId(7),
            address: format!("G{}", "A".repeat(55)),
            seed: format!("S{}", "B".repeat(55)),
            active: true,
        };

        let distributor = Distributor::try_from_record(&record).unwrap();
        assert_eq!(distributor.id, DistributorId(7));
        assert_eq!(distributor.address.as_str(), record.address);
    }

    #[test]
    fn decode_rejects_malformed_address() {
        let record = DistributorRecord {
            id: DistributorId(7),
            address: "nonsense".to_string(),
            seed: format!("S{}", "B".repeat(55)),
            active: true,
        };

        assert!(matches!(
            Distributor::try_from_record(&record),
            Err(CredentialError::Address(_))
        ));
    }

    #[test]
    fn decode_rejects_malformed_seed() {
        let record = DistributorRecord {
            id: DistributorId(7),
            address: format!("G{}", "A".repeat(55)),
            seed: "nonsense".to_string(),
            active: true,
        };

        assert!(matches!(
            Distributor::try_from_record(&record),
            Err(CredentialError::Seed(_))
        ));
    }
}
