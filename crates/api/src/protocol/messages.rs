//! Wire messages of the four calls.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bankstream_banking::{TransactionSummary, TransactionType, TransferReceipt, TransferRequest, TransferStatus};
use bankstream_core::TransferId;

use super::status::Status;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentBalanceRequest {
    pub account_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentBalanceResponse {
    pub account_number: String,
    pub amount: Decimal,
    pub current_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateRequest {
    pub from_currency: String,
    pub to_currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateResponse {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeTransactionsRequest {
    pub account_number: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummaryResponse {
    pub account_number: String,
    pub sum_in: Decimal,
    pub sum_out: Decimal,
    pub sum_total: Decimal,
    pub summary_date: DateTime<Utc>,
}

impl TransactionSummaryResponse {
    pub fn new(account_number: String, summary: &TransactionSummary) -> Self {
        Self {
            account_number,
            sum_in: summary.sum_in,
            sum_out: summary.sum_out,
            sum_total: summary.sum_total,
            summary_date: summary.summary_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMessage {
    pub from_account: String,
    pub to_account: String,
    pub currency: String,
    pub amount: Decimal,
}

impl TransferMessage {
    pub fn to_request(&self) -> TransferRequest {
        TransferRequest {
            from_account_number: self.from_account.clone(),
            to_account_number: self.to_account.clone(),
            currency: self.currency.clone(),
            amount: self.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResponse {
    pub from_account: String,
    pub to_account: String,
    pub currency: String,
    pub amount: Decimal,
    pub status: TransferStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<TransferId>,
    /// Set on `FAILED` responses when the stream is kept open after a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Status>,
}

impl TransferResponse {
    pub fn committed(message: TransferMessage, receipt: TransferReceipt) -> Self {
        Self {
            from_account: message.from_account,
            to_account: message.to_account,
            currency: message.currency,
            amount: message.amount,
            status: receipt.status,
            timestamp: Utc::now(),
            transfer_id: Some(receipt.transfer_id),
            error: None,
        }
    }

    pub fn failed(message: TransferMessage, status: Status) -> Self {
        Self {
            from_account: message.from_account,
            to_account: message.to_account,
            currency: message.currency,
            amount: message.amount,
            status: TransferStatus::Failed,
            timestamp: Utc::now(),
            transfer_id: None,
            error: Some(status),
        }
    }
}
