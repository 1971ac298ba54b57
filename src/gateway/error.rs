//! Gateway error types and result-code parsing.
//!
//! A failed submission carries structured result codes: one transaction-level
//! code plus (for batch submissions) one code per operation. The recovery
//! logic branches on these codes, so they are parsed into enums here rather
//! than compared as strings at every call site.
//!
//! Code parsing is total: anything unrecognized lands in an `Other` variant
//! and is handled by the classifier's catch-all rules.

use std::fmt;
use thiserror::Error;

/// A transaction-level result code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionCode {
    /// The sending wallet cannot cover the transaction fee.
    InsufficientBalance,

    /// The transaction failed; per-operation codes carry the detail.
    Failed,

    /// Any other transaction code.
    Other(String),
}

impl TransactionCode {
    /// Parses a gateway code string. Total: unknown codes become `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "tx_insufficient_balance" => TransactionCode::InsufficientBalance,
            "tx_failed" => TransactionCode::Failed,
            other => TransactionCode::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransactionCode::InsufficientBalance => "tx_insufficient_balance",
            TransactionCode::Failed => "tx_failed",
            TransactionCode::Other(s) => s,
        }
    }
}

impl fmt::Display for TransactionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-operation result code from a batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationCode {
    /// The operation succeeded (other operations in the batch did not).
    Success,

    /// The recipient lacks a trust line for the asset.
    NoTrust,

    /// The operation is structurally invalid.
    Malformed,

    /// The recipient's trust line cannot hold the amount.
    LineFull,

    /// The sending wallet lacks a trust line for the asset.
    SrcNoTrust,

    /// The sending wallet's token balance cannot cover the amount.
    Underfunded,

    /// Any other operation code.
    Other(String),
}

impl OperationCode {
    /// Parses a gateway code string. Total: unknown codes become `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "op_success" => OperationCode::Success,
            "op_no_trust" => OperationCode::NoTrust,
            "op_malformed" => OperationCode::Malformed,
            "op_line_full" => OperationCode::LineFull,
            "op_src_no_trust" => OperationCode::SrcNoTrust,
            "op_underfunded" => OperationCode::Underfunded,
            other => OperationCode::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperationCode::Success => "op_success",
            OperationCode::NoTrust => "op_no_trust",
            OperationCode::Malformed => "op_malformed",
            OperationCode::LineFull => "op_line_full",
            OperationCode::SrcNoTrust => "op_src_no_trust",
            OperationCode::Underfunded => "op_underfunded",
            OperationCode::Other(s) => s,
        }
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error surfaced by a gateway call.
///
/// Cloneable by design: the recovery loop classifies an error, acts, and may
/// log it again later without holding a source chain.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// A transport-level failure with an HTTP-style status code.
    #[error("transport failure (status {status}): {message}")]
    Transport { status: u16, message: String },

    /// The transaction was rejected with structured result codes.
    #[error("transaction rejected ({})", format_codes(transaction_code, operation_codes))]
    Transaction {
        transaction_code: Option<TransactionCode>,
        operation_codes: Option<Vec<OperationCode>>,
    },

    /// The request exceeded its per-call deadline.
    #[error("gateway request timed out")]
    Timeout,

    /// The gateway's response could not be parsed.
    #[error("unparseable gateway response: {message}")]
    Malformed { message: String },
}

impl GatewayError {
    /// Convenience constructor for a transport failure.
    pub fn transport(status: u16, message: impl Into<String>) -> Self {
        GatewayError::Transport {
            status,
            message: message.into(),
        }
    }

    /// Convenience constructor for a code-bearing rejection.
    pub fn transaction(
        transaction_code: Option<TransactionCode>,
        operation_codes: Option<Vec<OperationCode>>,
    ) -> Self {
        GatewayError::Transaction {
            transaction_code,
            operation_codes,
        }
    }

    /// True for transport failures in the 5xx range.
    pub fn is_server_error(&self) -> bool {
        matches!(self, GatewayError::Transport { status, .. } if (500..600).contains(status))
    }
}

fn format_codes(
    transaction_code: &Option<TransactionCode>,
    operation_codes: &Option<Vec<OperationCode>>,
) -> String {
    let tx = transaction_code
        .as_ref()
        .map(|c| c.as_str())
        .unwrap_or("no tx code");
    match operation_codes {
        Some(ops) => {
            let ops: Vec<&str> = ops.iter().map(|c| c.as_str()).collect();
            format!("{}; ops: [{}]", tx, ops.join(", "))
        }
        None => format!("{}; no op codes", tx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_code_parsing_is_total() {
        assert_eq!(
            TransactionCode::parse("tx_insufficient_balance"),
            TransactionCode::InsufficientBalance
        );
        assert_eq!(TransactionCode::parse("tx_failed"), TransactionCode::Failed);
        assert_eq!(
            TransactionCode::parse("tx_bad_seq"),
            TransactionCode::Other("tx_bad_seq".to_string())
        );
    }

    #[test]
    fn operation_code_parsing_is_total() {
        assert_eq!(OperationCode::parse("op_success"), OperationCode::Success);
        assert_eq!(OperationCode::parse("op_no_trust"), OperationCode::NoTrust);
        assert_eq!(OperationCode::parse("op_malformed"), OperationCode::Malformed);
        assert_eq!(OperationCode::parse("op_line_full"), OperationCode::LineFull);
        assert_eq!(
            OperationCode::parse("op_src_no_trust"),
            OperationCode::SrcNoTrust
        );
        assert_eq!(
            OperationCode::parse("op_underfunded"),
            OperationCode::Underfunded
        );
        assert_eq!(
            OperationCode::parse("op_no_issuer"),
            OperationCode::Other("op_no_issuer".to_string())
        );
    }

    #[test]
    fn code_roundtrip_through_as_str() {
        for code in [
            "op_success",
            "op_no_trust",
            "op_malformed",
            "op_line_full",
            "op_src_no_trust",
            "op_underfunded",
            "op_something_else",
        ] {
            assert_eq!(OperationCode::parse(code).as_str(), code);
        }
    }

    #[test]
    fn server_error_detection() {
        assert!(GatewayError::transport(500, "boom").is_server_error());
        assert!(GatewayError::transport(503, "unavailable").is_server_error());
        assert!(!GatewayError::transport(404, "not found").is_server_error());
        assert!(!GatewayError::Timeout.is_server_error());
    }

    #[test]
    fn display_includes_codes() {
        let err = GatewayError::transaction(
            Some(TransactionCode::Failed),
            Some(vec![OperationCode::Success, OperationCode::Underfunded]),
        );
        let text = err.to_string();
        assert!(text.contains("tx_failed"), "got: {}", text);
        assert!(text.contains("op_underfunded"), "got: {}", text);
    }
}
