//! Two-account transfers.
//!
//! A transfer is recorded before its legs are posted, so a failed transfer is
//! auditable. While a record is in `RecordCreated`/`LegsPosted` its `success`
//! flag is `false`, which means "not yet known to have succeeded".

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bankstream_core::{AccountId, Entity, LedgerError, LedgerResult, TransferId};

use crate::account::{Account, Transaction, TransactionType, validate_amount};

/// Inbound request to move `amount` between two account numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_number: String,
    pub to_account_number: String,
    pub currency: String,
    pub amount: Decimal,
}

impl TransferRequest {
    /// Checks that need no account lookup.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.from_account_number == self.to_account_number {
            return Err(LedgerError::SelfTransferNotAllowed {
                account_number: self.from_account_number.clone(),
            });
        }
        validate_amount(self.amount, "transfer amount")
    }
}

/// Lifecycle of a transfer.
///
/// ```text
/// Initiated -> RecordCreated -> LegsPosted -> Committed
///                   |
///                   +---------> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Initiated,
    RecordCreated,
    LegsPosted,
    Committed,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Committed | TransferState::Failed)
    }

    pub fn can_transition_to(self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Initiated, RecordCreated)
                | (Initiated, Failed)
                | (RecordCreated, LegsPosted)
                | (RecordCreated, Failed)
                | (LegsPosted, Committed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferState::Initiated => "initiated",
            TransferState::RecordCreated => "record_created",
            TransferState::LegsPosted => "legs_posted",
            TransferState::Committed => "committed",
            TransferState::Failed => "failed",
        }
    }
}

impl core::str::FromStr for TransferState {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(TransferState::Initiated),
            "record_created" => Ok(TransferState::RecordCreated),
            "legs_posted" => Ok(TransferState::LegsPosted),
            "committed" => Ok(TransferState::Committed),
            "failed" => Ok(TransferState::Failed),
            other => Err(LedgerError::storage(
                "parse transfer state",
                format!("unknown state {other:?}"),
            )),
        }
    }
}

/// Client-facing outcome of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferStatus {
    Success,
    Failed,
}

/// Transfer audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub currency: String,
    pub amount: Decimal,
    pub success: bool,
    pub state: TransferState,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transfer {
    /// New intent record, not yet persisted.
    pub fn initiate(from: &Account, to: &Account, request: &TransferRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: TransferId::new(),
            from_account_id: from.id,
            to_account_id: to.id,
            currency: request.currency.clone(),
            amount: request.amount,
            success: false,
            state: TransferState::Initiated,
            occurred_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: TransferState, now: DateTime<Utc>) -> LedgerResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(LedgerError::storage(
                format!("transfer {}", self.id),
                format!("illegal transition {} -> {}", self.state.as_str(), next.as_str()),
            ));
        }
        self.state = next;
        self.success = next == TransferState::Committed;
        self.updated_at = now;
        Ok(())
    }

    /// The OUT leg on the source and the IN leg on the destination.
    pub fn legs(
        &self,
        from_account_number: &str,
        to_account_number: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<(Transaction, Transaction)> {
        let out = Transaction::new(
            self.from_account_id,
            TransactionType::Out,
            self.amount,
            self.occurred_at,
            format!("Transfer out to {to_account_number}"),
            now,
        )?;
        let inbound = Transaction::new(
            self.to_account_id,
            TransactionType::In,
            self.amount,
            self.occurred_at,
            format!("Transfer in from {from_account_number}"),
            now,
        )?;
        Ok((out, inbound))
    }

    pub fn status(&self) -> TransferStatus {
        if self.success {
            TransferStatus::Success
        } else {
            TransferStatus::Failed
        }
    }
}

impl Entity for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Returned by the ledger once a transfer is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: TransferId,
    pub status: TransferStatus,
}
