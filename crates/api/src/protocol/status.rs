//! Structured call status returned to clients.
//!
//! Every ledger failure becomes a `Status` with a machine-readable `reason`
//! plus optional metadata / field violations. The mapping depends on the call:
//! the same `AccountNotFound` is `NOT_FOUND` for a balance read but an invalid
//! argument inside a summary stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use bankstream_banking::TransferRequest;
use bankstream_core::{ErrorKind, LedgerError};

pub const HELP_LINK: &str = "my-bank-website.com/faq";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    Unknown,
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_violations: Vec<FieldViolation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_link: Option<String>,
}

impl Status {
    pub fn new(code: Code, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            reason: reason.into(),
            metadata: BTreeMap::new(),
            field_violations: Vec::new(),
            help_link: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_field_violation(mut self, field: impl Into<String>, description: impl Into<String>) -> Self {
        self.field_violations.push(FieldViolation {
            field: field.into(),
            description: description.into(),
        });
        self
    }

    pub fn with_help_link(mut self, link: impl Into<String>) -> Self {
        self.help_link = Some(link.into());
        self
    }

    /// The inbound half of a stream failed; only that stream ends.
    pub fn stream_read_failed(err: impl core::fmt::Display) -> Self {
        Self::new(Code::Unknown, "STREAM_READ_FAILED", format!("failed to read inbound message: {err}"))
    }

    /// The inbound half was well-formed transport-wise but not a valid message.
    pub fn malformed_message(err: impl core::fmt::Display) -> Self {
        Self::new(Code::InvalidArgument, "MALFORMED_MESSAGE", format!("malformed message: {err}"))
    }
}

/// GetCurrentBalance.
pub fn balance_status(err: &LedgerError) -> Status {
    match err {
        LedgerError::AccountNotFound { account_number } => {
            Status::new(Code::NotFound, "ACCOUNT_NOT_FOUND", err.to_string())
                .with_metadata("account_number", account_number.clone())
        }
        other => common_status(other),
    }
}

/// FetchExchangeRates. Any lookup failure is reported against the requested pair.
pub fn rate_status(err: &LedgerError, from_currency: &str, to_currency: &str) -> Status {
    match err {
        LedgerError::InvalidCurrency { .. } | LedgerError::RateNotFound { .. } => Status::new(
            Code::InvalidArgument,
            "INVALID_CURRENCY",
            format!("invalid currency pair {from_currency}/{to_currency}: {err}"),
        )
        .with_metadata("from_currency", from_currency)
        .with_metadata("to_currency", to_currency),
        other => common_status(other),
    }
}

/// SummarizeTransactions.
pub fn summary_status(err: &LedgerError) -> Status {
    match err {
        LedgerError::AccountNotFound { account_number } => {
            Status::new(Code::InvalidArgument, "INVALID_ACCOUNT", err.to_string())
                .with_field_violation("account_number", format!("account {account_number} not found"))
        }
        LedgerError::InsufficientFunds { balance, requested, .. } => {
            Status::new(Code::InvalidArgument, "AMOUNT_EXCEEDS_BALANCE", err.to_string()).with_field_violation(
                "amount",
                format!("amount {requested} exceeds balance {balance}"),
            )
        }
        other => common_status(other),
    }
}

/// TransferMultiple.
pub fn transfer_status(err: &LedgerError, request: &TransferRequest) -> Status {
    match err {
        LedgerError::SourceAccountNotFound { account_number } => {
            Status::new(Code::FailedPrecondition, "SOURCE_ACCOUNT_NOT_FOUND", err.to_string())
                .with_metadata("account_side", "source")
                .with_metadata("account_number", account_number.clone())
        }
        LedgerError::DestinationAccountNotFound { account_number } => {
            Status::new(Code::FailedPrecondition, "DESTINATION_ACCOUNT_NOT_FOUND", err.to_string())
                .with_metadata("account_side", "destination")
                .with_metadata("account_number", account_number.clone())
        }
        LedgerError::SelfTransferNotAllowed { account_number } => {
            Status::new(Code::FailedPrecondition, "SELF_TRANSFER_NOT_ALLOWED", err.to_string())
                .with_metadata("account_number", account_number.clone())
        }
        LedgerError::TransferRecordFailed { .. } => {
            Status::new(Code::Internal, "TRANSFER_RECORD_FAILED", err.to_string()).with_help_link(HELP_LINK)
        }
        LedgerError::InsufficientFunds { .. } | LedgerError::TransferTransactionPairFailed { .. } => {
            let message = match err {
                LedgerError::TransferTransactionPairFailed { transfer_id, .. } => {
                    format!("transfer {transfer_id} could not post its transaction pair")
                }
                other => other.to_string(),
            };
            Status::new(Code::InvalidArgument, "TRANSACTION_PAIR_FAILED", message)
                .with_metadata("from_account", request.from_account_number.clone())
                .with_metadata("to_account", request.to_account_number.clone())
                .with_metadata("currency", request.currency.clone())
                .with_metadata("amount", request.amount.to_string())
        }
        other => common_status(other),
    }
}

/// Errors whose mapping does not depend on the call.
fn common_status(err: &LedgerError) -> Status {
    match err {
        LedgerError::InvalidAmount { reason, .. } => {
            Status::new(Code::InvalidArgument, "VALIDATION_FAILED", err.to_string())
                .with_field_violation("amount", reason.clone())
        }
        LedgerError::UnknownTransactionType(kind) => {
            Status::new(Code::InvalidArgument, "VALIDATION_FAILED", err.to_string())
                .with_field_violation("type", format!("unsupported transaction type {kind}"))
        }
        LedgerError::Storage { .. } => {
            error!(error = %err, "internal ledger failure");
            Status::new(Code::Internal, "INTERNAL", "internal error")
        }
        other => {
            let code = match other.kind() {
                ErrorKind::NotFound => Code::NotFound,
                ErrorKind::PreconditionFailed => Code::FailedPrecondition,
                ErrorKind::ValidationFailed => Code::InvalidArgument,
                ErrorKind::RecordingFailed | ErrorKind::Internal => Code::Internal,
            };
            Status::new(code, "LEDGER_ERROR", other.to_string())
        }
    }
}
