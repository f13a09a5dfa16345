//! Two-account transfer orchestration.
//!
//! ## Transfer Flow
//!
//! ```text
//! TransferRequest
//!   ↓
//! 1. validate (self-transfer, amount > 0)
//!   ↓
//! 2. resolve source, then destination
//!   ↓
//! 3. funds pre-check (no record is created on failure)
//!   ↓
//! 4. create Transfer record (RecordCreated, success=false)
//!   ↓
//! 5. post OUT + IN legs in one store unit (store re-checks funds)
//!   ↓
//! 6. mark Committed (success=true) and return the receipt
//! ```
//!
//! A failure in step 5 leaves no leg applied and the record ends `Failed`.

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use bankstream_banking::{Account, Transfer, TransferReceipt, TransferRequest, TransferState};
use bankstream_core::{LedgerError, LedgerResult, TransferId};

use super::store_failure;
use crate::store::{AccountStore, StoreError, TransactionStore, TransferStore};

#[derive(Debug, Clone)]
pub struct TransferLedger<S> {
    store: S,
}

impl<S> TransferLedger<S>
where
    S: AccountStore + TransactionStore + TransferStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(
        skip(self, request),
        fields(
            from = %request.from_account_number,
            to = %request.to_account_number,
            amount = %request.amount,
        ),
        err
    )]
    pub async fn transfer(&self, request: &TransferRequest) -> LedgerResult<TransferReceipt> {
        request.validate()?;

        let from = self
            .resolve(&request.from_account_number, |account_number| {
                LedgerError::SourceAccountNotFound { account_number }
            })
            .await?;
        let to = self
            .resolve(&request.to_account_number, |account_number| {
                LedgerError::DestinationAccountNotFound { account_number }
            })
            .await?;

        if from.balance < request.amount {
            return Err(LedgerError::InsufficientFunds {
                account_number: from.account_number,
                balance: from.balance,
                requested: request.amount,
            });
        }

        let now = Utc::now();
        let mut transfer = Transfer::initiate(&from, &to, request, now);
        transfer.transition(TransferState::RecordCreated, now)?;

        if let Err(err) = self.store.create_transfer(&transfer).await {
            error!(error = %err, "failed to record transfer");
            return Err(LedgerError::TransferRecordFailed {
                from_account: from.account_number,
                to_account: to.account_number,
            });
        }

        let (out, inbound) = transfer.legs(&from.account_number, &to.account_number, now)?;
        if let Err(err) = self.store.post(vec![out, inbound]).await {
            warn!(transfer_id = %transfer.id, error = %err, "transfer legs rejected");
            self.mark_failed(&mut transfer).await;
            return Err(LedgerError::TransferTransactionPairFailed {
                transfer_id: transfer.id,
                reason: err.to_string(),
            });
        }

        let now = Utc::now();
        transfer.transition(TransferState::LegsPosted, now)?;
        transfer.transition(TransferState::Committed, now)?;

        // The legs are committed at this point; a stale status flag is logged, not surfaced.
        if let Err(err) = self.store.update_transfer(&transfer).await {
            error!(transfer_id = %transfer.id, error = %err, "failed to persist committed transfer status");
        }

        info!(transfer_id = %transfer.id, "transfer committed");
        Ok(TransferReceipt {
            transfer_id: transfer.id,
            status: transfer.status(),
        })
    }

    /// Audit lookup of one transfer record.
    pub async fn get_transfer(&self, transfer_id: TransferId) -> LedgerResult<Transfer> {
        self.store
            .transfer_by_id(transfer_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => LedgerError::TransferNotFound { transfer_id },
                other => store_failure(format!("transfer_by_id({transfer_id})"), other),
            })
    }

    async fn resolve(
        &self,
        account_number: &str,
        not_found: impl FnOnce(String) -> LedgerError,
    ) -> LedgerResult<Account> {
        self.store
            .account_by_number(account_number)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => not_found(account_number.to_string()),
                other => store_failure(format!("account_by_number({account_number})"), other),
            })
    }

    async fn mark_failed(&self, transfer: &mut Transfer) {
        if let Err(err) = transfer.transition(TransferState::Failed, Utc::now()) {
            error!(transfer_id = %transfer.id, error = %err, "cannot mark transfer failed");
            return;
        }
        if let Err(err) = self.store.update_transfer(transfer).await {
            error!(transfer_id = %transfer.id, error = %err, "failed to persist failed transfer status");
        }
    }
}
