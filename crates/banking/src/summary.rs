use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bankstream_core::{LedgerError, LedgerResult};

use crate::account::{Transaction, TransactionType};

/// Running totals for one client-streaming session. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub summary_on: DateTime<Utc>,
    pub sum_in: Decimal,
    pub sum_out: Decimal,
    pub sum_total: Decimal,
}

impl TransactionSummary {
    pub fn new(summary_on: DateTime<Utc>) -> Self {
        Self {
            summary_on,
            sum_in: Decimal::ZERO,
            sum_out: Decimal::ZERO,
            sum_total: Decimal::ZERO,
        }
    }

    /// Fold one transaction into the totals.
    ///
    /// `sum_total` is recomputed from `sum_in - sum_out` on every call rather
    /// than accumulated.
    pub fn fold(&mut self, kind: TransactionType, amount: Decimal) -> LedgerResult<()> {
        match kind {
            TransactionType::In => self.sum_in += amount,
            TransactionType::Out => self.sum_out += amount,
            TransactionType::Unknown => {
                return Err(LedgerError::UnknownTransactionType(kind.to_string()));
            }
        }
        self.sum_total = self.sum_in - self.sum_out;
        Ok(())
    }

    pub fn fold_transaction(&mut self, tx: &Transaction) -> LedgerResult<()> {
        self.fold(tx.kind, tx.amount)
    }
}
