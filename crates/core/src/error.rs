//! Ledger error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::TransferId;

/// Result type used across the ledger layers.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Coarse error taxonomy. Transport adapters map each kind to a status class.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Account or rate does not exist.
    NotFound,
    /// Request is well-formed but the ledger state forbids it.
    PreconditionFailed,
    /// The intent record of a transfer could not be persisted.
    RecordingFailed,
    /// Malformed input (currency, amount, transaction type, identifiers).
    ValidationFailed,
    /// Unexpected storage failure.
    Internal,
}

/// Ledger-level error.
///
/// Each variant carries the request context needed to render a precise
/// diagnostic. Storage failures keep their detail in `message` for server-side
/// logs; adapters must not forward it to clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {account_number} not found")]
    AccountNotFound { account_number: String },

    #[error("account {account_number} already exists")]
    AccountExists { account_number: String },

    #[error("source account {account_number} not found")]
    SourceAccountNotFound { account_number: String },

    #[error("destination account {account_number} not found")]
    DestinationAccountNotFound { account_number: String },

    #[error("insufficient account balance {balance} on {account_number} for amount {requested}")]
    InsufficientFunds {
        account_number: String,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("cannot transfer from account {account_number} to itself")]
    SelfTransferNotAllowed { account_number: String },

    #[error("can't record transfer from {from_account} to {to_account}")]
    TransferRecordFailed {
        from_account: String,
        to_account: String,
    },

    #[error("transfer {transfer_id} failed to post its transaction pair: {reason}")]
    TransferTransactionPairFailed {
        transfer_id: TransferId,
        reason: String,
    },

    #[error("transfer {transfer_id} not found")]
    TransferNotFound { transfer_id: TransferId },

    #[error("no exchange rate {from}/{to} valid at {at}")]
    RateNotFound { from: String, to: String, at: String },

    #[error("invalid currency code {currency:?}")]
    InvalidCurrency { currency: String },

    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: String, reason: String },

    #[error("validity window ends ({valid_to}) before it starts ({valid_from})")]
    InvalidWindow { valid_from: String, valid_to: String },

    #[error("unknown transaction type {0}")]
    UnknownTransactionType(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("storage failure during {context}: {message}")]
    Storage { context: String, message: String },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccountNotFound { .. }
            | LedgerError::SourceAccountNotFound { .. }
            | LedgerError::DestinationAccountNotFound { .. }
            | LedgerError::TransferNotFound { .. }
            | LedgerError::RateNotFound { .. } => ErrorKind::NotFound,
            LedgerError::AccountExists { .. }
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::SelfTransferNotAllowed { .. }
            | LedgerError::TransferTransactionPairFailed { .. } => ErrorKind::PreconditionFailed,
            LedgerError::TransferRecordFailed { .. } => ErrorKind::RecordingFailed,
            LedgerError::InvalidCurrency { .. }
            | LedgerError::InvalidAmount { .. }
            | LedgerError::InvalidWindow { .. }
            | LedgerError::UnknownTransactionType(_)
            | LedgerError::InvalidId(_) => ErrorKind::ValidationFailed,
            LedgerError::Storage { .. } => ErrorKind::Internal,
        }
    }

    pub fn storage(context: impl Into<String>, message: impl core::fmt::Display) -> Self {
        Self::Storage {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_amount(amount: impl core::fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            amount: amount.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_failures_are_classified() {
        let pair = LedgerError::TransferTransactionPairFailed {
            transfer_id: TransferId::new(),
            reason: "boom".into(),
        };
        assert_eq!(pair.kind(), ErrorKind::PreconditionFailed);

        let record = LedgerError::TransferRecordFailed {
            from_account: "A".into(),
            to_account: "B".into(),
        };
        assert_eq!(record.kind(), ErrorKind::RecordingFailed);
    }

    #[test]
    fn storage_error_keeps_context() {
        let err = LedgerError::storage("post_transaction(ACC-1)", "connection reset");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(
            err.to_string(),
            "storage failure during post_transaction(ACC-1): connection reset"
        );
    }
}
