//! Ledger services: the only code that orchestrates store calls.
//!
//! Each service receives its store capability at construction time. Services
//! translate `StoreError` into `LedgerError` with the caller's context; storage
//! detail only ever reaches `LedgerError::Storage`.

pub mod balance;
pub mod rate_feed;
pub mod transfer;

pub use balance::{Balance, BalanceService, NewTransaction};
pub use rate_feed::RateFeed;
pub use transfer::TransferLedger;

use bankstream_core::LedgerError;

use crate::store::StoreError;

/// Map a store failure that has no more specific meaning at the call site.
pub(crate) fn store_failure(context: impl Into<String>, err: StoreError) -> LedgerError {
    match err {
        StoreError::InsufficientFunds {
            account_number,
            balance,
            requested,
        } => LedgerError::InsufficientFunds {
            account_number,
            balance,
            requested,
        },
        other => LedgerError::storage(context, other),
    }
}
