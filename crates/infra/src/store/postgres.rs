//! Postgres-backed ledger store.
//!
//! ## Atomic Postings
//!
//! `post()` runs in one SQL transaction:
//! 1. `SELECT … FOR UPDATE` on every touched account, ordered by account number
//!    (row locks are taken in a total order, so two transfers cannot deadlock)
//! 2. apply the postings to the locked snapshots (funds re-check)
//! 3. insert the journal rows and write the new balances
//! 4. commit
//!
//! Any failure rolls the whole unit back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | RowNotFound | `NotFound` |
//! | Database, code `23505` (unique violation) | `Conflict` |
//! | anything else | `Backend` |

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use bankstream_banking::{
    Account, CurrencyPair, ExchangeRate, Transaction, TransactionType, Transfer, TransferState,
    ValidityWindow,
};
use bankstream_core::{AccountId, ExchangeRateId, LedgerError, TransactionId, TransferId};

use super::r#trait::{AccountStore, RateStore, StoreError, TransactionStore, TransferStore};

const SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

/// Postgres-backed implementation of every ledger store contract.
///
/// `Send + Sync`; clones share the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Apply the embedded schema. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AccountStore for PostgresLedgerStore {
    #[instrument(skip(self, account), fields(account_number = %account.account_number), err)]
    async fn open_account(&self, account: Account) -> Result<Account, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, account_number, balance, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.account_number)
        .bind(account.balance)
        .bind(&account.currency)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("open_account", e))?;
        Ok(account)
    }

    async fn account_by_number(&self, account_number: &str) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT account_id, account_number, balance, currency, created_at, updated_at
            FROM accounts
            WHERE account_number = $1
            "#,
        )
        .bind(account_number)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("account_by_number", e))?
        .ok_or_else(|| StoreError::NotFound(format!("account {account_number}")))?;

        account_from_row(&row)
    }
}

#[async_trait::async_trait]
impl TransactionStore for PostgresLedgerStore {
    #[instrument(skip(self, postings), fields(postings = postings.len()), err)]
    async fn post(&self, postings: Vec<Transaction>) -> Result<Vec<Account>, StoreError> {
        if postings.is_empty() {
            return Ok(vec![]);
        }

        let mut ids: Vec<Uuid> = Vec::with_capacity(postings.len());
        for tx in &postings {
            if !ids.contains(tx.account_id.as_uuid()) {
                ids.push(*tx.account_id.as_uuid());
            }
        }

        let mut db = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let rows = sqlx::query(
            r#"
            SELECT account_id, account_number, balance, currency, created_at, updated_at
            FROM accounts
            WHERE account_id = ANY($1)
            ORDER BY account_number
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *db)
        .await
        .map_err(|e| map_sqlx_error("lock_accounts", e))?;

        let mut locked = rows
            .iter()
            .map(account_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        // Dropping `db` without commit rolls back.
        let mut touched: Vec<AccountId> = Vec::new();
        for tx in &postings {
            let account = locked
                .iter_mut()
                .find(|a| a.id == tx.account_id)
                .ok_or_else(|| StoreError::NotFound(format!("account id {}", tx.account_id)))?;
            account.apply(tx).map_err(ledger_to_store_error)?;
            if !touched.contains(&account.id) {
                touched.push(account.id);
            }

            sqlx::query(
                r#"
                INSERT INTO transactions
                    (transaction_id, account_id, transaction_type, amount, occurred_at, notes, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(tx.id.as_uuid())
            .bind(tx.account_id.as_uuid())
            .bind(tx.kind.as_str())
            .bind(tx.amount)
            .bind(tx.occurred_at)
            .bind(&tx.notes)
            .bind(tx.created_at)
            .execute(&mut *db)
            .await
            .map_err(|e| map_sqlx_error("insert_transaction", e))?;
        }

        let mut updated = Vec::with_capacity(touched.len());
        for id in touched {
            let Some(account) = locked.iter().find(|a| a.id == id) else {
                continue;
            };
            sqlx::query("UPDATE accounts SET balance = $2, updated_at = $3 WHERE account_id = $1")
                .bind(account.id.as_uuid())
                .bind(account.balance)
                .bind(account.updated_at)
                .execute(&mut *db)
                .await
                .map_err(|e| map_sqlx_error("update_balance", e))?;
            updated.push(account.clone());
        }

        db.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(updated)
    }

    async fn transactions_for(&self, account_id: AccountId) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_id, account_id, transaction_type, amount, occurred_at, notes, created_at
            FROM transactions
            WHERE account_id = $1
            ORDER BY created_at, transaction_id
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions_for", e))?;

        rows.iter().map(transaction_from_row).collect()
    }
}

#[async_trait::async_trait]
impl TransferStore for PostgresLedgerStore {
    #[instrument(skip(self, transfer), fields(transfer_id = %transfer.id), err)]
    async fn create_transfer(&self, transfer: &Transfer) -> Result<TransferId, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transfers (
                transfer_id, from_account_id, to_account_id, currency, amount,
                success, state, occurred_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(transfer.id.as_uuid())
        .bind(transfer.from_account_id.as_uuid())
        .bind(transfer.to_account_id.as_uuid())
        .bind(&transfer.currency)
        .bind(transfer.amount)
        .bind(transfer.success)
        .bind(transfer.state.as_str())
        .bind(transfer.occurred_at)
        .bind(transfer.created_at)
        .bind(transfer.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_transfer", e))?;
        Ok(transfer.id)
    }

    #[instrument(skip(self, transfer), fields(transfer_id = %transfer.id, state = transfer.state.as_str()), err)]
    async fn update_transfer(&self, transfer: &Transfer) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE transfers SET success = $2, state = $3, updated_at = $4 WHERE transfer_id = $1",
        )
        .bind(transfer.id.as_uuid())
        .bind(transfer.success)
        .bind(transfer.state.as_str())
        .bind(transfer.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_transfer", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("transfer {}", transfer.id)));
        }
        Ok(())
    }

    async fn transfer_by_id(&self, transfer_id: TransferId) -> Result<Transfer, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT transfer_id, from_account_id, to_account_id, currency, amount,
                   success, state, occurred_at, created_at, updated_at
            FROM transfers
            WHERE transfer_id = $1
            "#,
        )
        .bind(transfer_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transfer_by_id", e))?
        .ok_or_else(|| StoreError::NotFound(format!("transfer {transfer_id}")))?;

        let state: String = get(&row, "state")?;
        Ok(Transfer {
            id: TransferId::from_uuid(get(&row, "transfer_id")?),
            from_account_id: AccountId::from_uuid(get(&row, "from_account_id")?),
            to_account_id: AccountId::from_uuid(get(&row, "to_account_id")?),
            currency: get(&row, "currency")?,
            amount: get(&row, "amount")?,
            success: get(&row, "success")?,
            state: TransferState::from_str(&state).map_err(|e| StoreError::Backend(e.to_string()))?,
            occurred_at: get(&row, "occurred_at")?,
            created_at: get(&row, "created_at")?,
            updated_at: get(&row, "updated_at")?,
        })
    }
}

#[async_trait::async_trait]
impl RateStore for PostgresLedgerStore {
    async fn create_rate(&self, rate: &ExchangeRate) -> Result<ExchangeRateId, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO exchange_rates
                (exchange_rate_id, from_currency, to_currency, rate, valid_from, valid_to, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(rate.id.as_uuid())
        .bind(&rate.pair.from)
        .bind(&rate.pair.to)
        .bind(rate.rate)
        .bind(rate.window.valid_from)
        .bind(rate.window.valid_to)
        .bind(rate.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_rate", e))?;
        Ok(rate.id)
    }

    async fn rate_at(&self, pair: &CurrencyPair, at: DateTime<Utc>) -> Result<ExchangeRate, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT exchange_rate_id, rate, valid_from, valid_to, created_at
            FROM exchange_rates
            WHERE from_currency = $1
              AND to_currency = $2
              AND $3 BETWEEN valid_from AND valid_to
            ORDER BY created_at DESC, exchange_rate_id DESC
            LIMIT 1
            "#,
        )
        .bind(&pair.from)
        .bind(&pair.to)
        .bind(at)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("rate_at", e))?
        .ok_or_else(|| StoreError::NotFound(format!("rate {pair} at {at}")))?;

        Ok(ExchangeRate {
            id: ExchangeRateId::from_uuid(get(&row, "exchange_rate_id")?),
            pair: pair.clone(),
            rate: get(&row, "rate")?,
            window: ValidityWindow {
                valid_from: get(&row, "valid_from")?,
                valid_to: get(&row, "valid_to")?,
            },
            created_at: get(&row, "created_at")?,
        })
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("column {column}: {e}")))
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let balance: Decimal = get(row, "balance")?;
    Ok(Account {
        id: AccountId::from_uuid(get(row, "account_id")?),
        account_number: get(row, "account_number")?,
        balance,
        currency: get(row, "currency")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, StoreError> {
    let kind: String = get(row, "transaction_type")?;
    Ok(Transaction {
        id: TransactionId::from_uuid(get(row, "transaction_id")?),
        account_id: AccountId::from_uuid(get(row, "account_id")?),
        kind: TransactionType::from_str(&kind).map_err(|e| StoreError::Backend(e.to_string()))?,
        amount: get(row, "amount")?,
        occurred_at: get(row, "occurred_at")?,
        notes: get(row, "notes")?,
        created_at: get(row, "created_at")?,
    })
}

fn ledger_to_store_error(err: LedgerError) -> StoreError {
    match err {
        LedgerError::InsufficientFunds {
            account_number,
            balance,
            requested,
        } => StoreError::InsufficientFunds {
            account_number,
            balance,
            requested,
        },
        other => StoreError::Backend(other.to_string()),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("{operation}: row not found")),
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
