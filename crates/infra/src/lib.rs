//! Infrastructure layer: storage adapters, ledger services, background tasks, config.

pub mod config;
pub mod services;
pub mod store;
pub mod workers;

mod integration_tests;

pub use config::{AppConfig, ConfigError, SeedAccount};
pub use services::{Balance, BalanceService, NewTransaction, RateFeed, TransferLedger};
pub use store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
pub use workers::{RateProducer, RateProducerHandle};
