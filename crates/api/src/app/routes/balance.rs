use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    response::IntoResponse,
};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::protocol::CurrentBalanceRequest;

/// GET /balances/:account_number
pub async fn get_current_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Path(account_number): Path<String>,
) -> axum::response::Response {
    match services
        .protocol
        .get_current_balance(CurrentBalanceRequest { account_number })
        .await
    {
        Ok(balance) => Json(balance).into_response(),
        Err(status) => errors::status_to_response(status),
    }
}
