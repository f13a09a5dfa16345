use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, Query},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};

use crate::app::services::AppServices;
use crate::protocol::ExchangeRateRequest;

#[derive(Debug, Deserialize)]
pub struct RateQuery {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// GET /rates/stream?from=USD&to=IDR
///
/// One `rate` event per emission; a failed lookup sends one `error` event and
/// ends the stream. Closing the connection cancels the call.
pub async fn stream_exchange_rates(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<RateQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (tx, rx) = mpsc::channel(1);
    let request = ExchangeRateRequest {
        from_currency: query.from,
        to_currency: query.to,
    };

    tokio::spawn(async move {
        services.protocol.fetch_exchange_rates(request, tx).await;
    });

    let stream = ReceiverStream::new(rx).map(|item| {
        Ok(match item {
            Ok(rate) => sse_event("rate", &rate),
            Err(status) => sse_event("error", &status),
        })
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn sse_event<T: Serialize>(name: &str, payload: &T) -> SseEvent {
    match serde_json::to_string(payload) {
        Ok(json) => SseEvent::default().event(name).data(json),
        Err(err) => SseEvent::default().event("error").data(err.to_string()),
    }
}
