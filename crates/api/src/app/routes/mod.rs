use axum::{
    Router,
    routing::{get, post},
};

pub mod balance;
pub mod rates;
pub mod summary;
pub mod system;
pub mod transfers;

/// Router for the four ledger calls.
pub fn router() -> Router {
    Router::new()
        .route("/balances/:account_number", get(balance::get_current_balance))
        .route("/rates/stream", get(rates::stream_exchange_rates))
        .route("/transactions/summary", post(summary::summarize_transactions))
        .route("/transfers/ws", get(transfers::transfer_multiple))
}
