//! Streaming call layer.
//!
//! Adapts the four interaction shapes onto the ledger services, independent of
//! the transport:
//!
//! | Call | Shape | Input | Output |
//! |---|---|---|---|
//! | `get_current_balance` | unary | one request | one response |
//! | `fetch_exchange_rates` | server stream | one request | `Sender` of responses |
//! | `summarize_transactions` | client stream | `Stream` of requests | one response |
//! | `transfer_multiple` | bidi stream | `Stream` of requests | `Sender` of responses |
//!
//! Cancellation is the outbound receiver being dropped: handlers check
//! `Sender::is_closed()` every iteration and race every wait against
//! `Sender::closed()`, then return without sending anything else.

use std::pin::pin;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use bankstream_banking::TransactionSummary;
use bankstream_infra::store::LedgerStore;
use bankstream_infra::{BalanceService, NewTransaction, RateFeed, TransferLedger};

pub mod messages;
pub mod status;

pub use messages::{
    CurrentBalanceRequest, CurrentBalanceResponse, ExchangeRateRequest, ExchangeRateResponse,
    SummarizeTransactionsRequest, TransactionSummaryResponse, TransferMessage, TransferResponse,
};
pub use status::{Code, FieldViolation, Status};

#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Pause between two rate emissions.
    pub stream_delay: Duration,
    /// Turn transfer failures into `FAILED` responses instead of ending the stream.
    pub continue_on_transfer_failure: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            stream_delay: Duration::from_secs(3),
            continue_on_transfer_failure: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BankProtocol<S> {
    balances: BalanceService<S>,
    transfers: TransferLedger<S>,
    rates: RateFeed<S>,
    config: ProtocolConfig,
}

impl<S> BankProtocol<S>
where
    S: LedgerStore + Clone,
{
    pub fn new(store: S, config: ProtocolConfig) -> Self {
        Self {
            balances: BalanceService::new(store.clone()),
            transfers: TransferLedger::new(store.clone()),
            rates: RateFeed::new(store),
            config,
        }
    }

    pub fn balances(&self) -> &BalanceService<S> {
        &self.balances
    }

    pub fn transfers(&self) -> &TransferLedger<S> {
        &self.transfers
    }

    pub fn rates(&self) -> &RateFeed<S> {
        &self.rates
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub async fn get_current_balance(
        &self,
        request: CurrentBalanceRequest,
    ) -> Result<CurrentBalanceResponse, Status> {
        let balance = self
            .balances
            .get_balance(&request.account_number)
            .await
            .map_err(|e| status::balance_status(&e))?;

        Ok(CurrentBalanceResponse {
            account_number: balance.account_number,
            amount: balance.amount,
            current_date: balance.as_of,
        })
    }

    /// Emit the current rate every `stream_delay` until the receiver goes away.
    ///
    /// The first failed lookup sends one status and ends the stream.
    #[instrument(skip_all, fields(from = %request.from_currency, to = %request.to_currency))]
    pub async fn fetch_exchange_rates(
        &self,
        request: ExchangeRateRequest,
        out: mpsc::Sender<Result<ExchangeRateResponse, Status>>,
    ) {
        loop {
            if out.is_closed() {
                debug!("rate stream cancelled by client");
                return;
            }

            let now = Utc::now().trunc_subsecs(0);
            let item = match self
                .rates
                .lookup_rate(&request.from_currency, &request.to_currency, now)
                .await
            {
                Ok(rate) => Ok(ExchangeRateResponse {
                    from_currency: request.from_currency.clone(),
                    to_currency: request.to_currency.clone(),
                    rate,
                    timestamp: now,
                }),
                Err(err) => {
                    warn!(error = %err, "rate lookup failed; closing stream");
                    Err(status::rate_status(&err, &request.from_currency, &request.to_currency))
                }
            };

            let terminal = item.is_err();
            if out.send(item).await.is_err() || terminal {
                return;
            }

            tokio::select! {
                biased;
                _ = out.closed() => {
                    debug!("rate stream cancelled by client");
                    return;
                }
                _ = tokio::time::sleep(self.config.stream_delay) => {}
            }
        }
    }

    /// Post every inbound transaction and answer once with the aggregate.
    ///
    /// The first failure (posting or inbound read) ends the call with a status;
    /// transactions posted before it stay posted.
    #[instrument(skip_all)]
    pub async fn summarize_transactions<St>(&self, inbound: St) -> Result<TransactionSummaryResponse, Status>
    where
        St: Stream<Item = Result<SummarizeTransactionsRequest, Status>>,
    {
        let mut inbound = pin!(inbound);
        let mut summary = TransactionSummary::new(Utc::now());
        let mut account_number = String::new();
        let mut received = 0usize;

        while let Some(item) = inbound.next().await {
            let request = item?;
            let tx = self
                .balances
                .post_transaction(
                    &request.account_number,
                    NewTransaction {
                        amount: request.amount,
                        kind: request.kind,
                        occurred_at: request.timestamp,
                        notes: request.notes,
                    },
                )
                .await
                .map_err(|e| status::summary_status(&e))?;
            self.balances
                .summarize(&mut summary, &tx)
                .map_err(|e| status::summary_status(&e))?;

            account_number = request.account_number;
            received += 1;
        }

        info!(received, sum_total = %summary.sum_total, "transaction summary complete");
        Ok(TransactionSummaryResponse::new(account_number, &summary))
    }

    /// Run each inbound transfer and answer before reading the next one.
    #[instrument(skip_all)]
    pub async fn transfer_multiple<St>(&self, inbound: St, out: mpsc::Sender<Result<TransferResponse, Status>>)
    where
        St: Stream<Item = Result<TransferMessage, Status>>,
    {
        let mut inbound = pin!(inbound);

        loop {
            let next = tokio::select! {
                biased;
                _ = out.closed() => {
                    debug!("transfer stream cancelled by client");
                    return;
                }
                next = inbound.next() => next,
            };

            let message = match next {
                None => return,
                Some(Ok(message)) => message,
                Some(Err(status)) => {
                    let _ = out.send(Err(status)).await;
                    return;
                }
            };

            let request = message.to_request();
            let item = match self.transfers.transfer(&request).await {
                Ok(receipt) => Ok(TransferResponse::committed(message, receipt)),
                Err(err) => {
                    let status = status::transfer_status(&err, &request);
                    if self.config.continue_on_transfer_failure {
                        Ok(TransferResponse::failed(message, status))
                    } else {
                        Err(status)
                    }
                }
            };

            if out.is_closed() {
                debug!("transfer stream cancelled by client");
                return;
            }
            let terminal = item.is_err();
            if out.send(item).await.is_err() || terminal {
                return;
            }
        }
    }
}
