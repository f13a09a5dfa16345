//! Banking domain (accounts, journal entries, transfers, exchange rates).
//!
//! Pure domain logic only: no IO, no transport, no persistence concerns.

pub mod account;
pub mod rate;
pub mod summary;
pub mod transfer;

pub use account::{AMOUNT_SCALE, Account, Transaction, TransactionType, validate_amount};
pub use rate::{CurrencyPair, ExchangeRate, ValidityWindow};
pub use summary::TransactionSummary;
pub use transfer::{Transfer, TransferReceipt, TransferRequest, TransferState, TransferStatus};
