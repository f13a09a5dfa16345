//! `bankstream-core`: identifiers and the error taxonomy shared by every layer.
//!
//! Pure types only: no IO, no async, no storage concerns.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use id::{AccountId, ExchangeRateId, TransactionId, TransferId};
