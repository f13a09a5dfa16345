//! Ledger storage boundary.
//!
//! Services only see the capability traits in `r#trait`; adapters are chosen at
//! wiring time (`InMemoryLedgerStore` for tests/dev, `PostgresLedgerStore` in
//! production).

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{AccountStore, LedgerStore, RateStore, StoreError, TransactionStore, TransferStore};
