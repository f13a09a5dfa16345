use std::sync::Arc;

use axum::{Json, body::Body, extract::Extension, response::IntoResponse};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::debug;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::protocol::{Status, SummarizeTransactionsRequest};

/// POST /transactions/summary
///
/// Request body is newline-delimited JSON, one `SummarizeTransactionsRequest`
/// per line; lines are posted as they arrive.
pub async fn summarize_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    body: Body,
) -> axum::response::Response {
    let (tx, rx) = mpsc::channel::<Result<SummarizeTransactionsRequest, Status>>(16);
    tokio::spawn(read_ndjson(body, tx));

    match services
        .protocol
        .summarize_transactions(ReceiverStream::new(rx))
        .await
    {
        Ok(summary) => Json(summary).into_response(),
        Err(status) => errors::status_to_response(status),
    }
}

/// Forward each body line as one decoded message. Stops at the first error or
/// when the receiver is gone.
async fn read_ndjson<T>(body: Body, tx: mpsc::Sender<Result<T, Status>>)
where
    T: DeserializeOwned,
{
    let mut chunks = body.into_data_stream();
    let mut buf: Vec<u8> = Vec::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(err) => {
                let _ = tx.send(Err(Status::stream_read_failed(err))).await;
                return;
            }
        };
        buf.extend_from_slice(&chunk);

        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            if !forward_line(&line, &tx).await {
                return;
            }
        }
    }

    forward_line(&buf, &tx).await;
}

async fn forward_line<T>(line: &[u8], tx: &mpsc::Sender<Result<T, Status>>) -> bool
where
    T: DeserializeOwned,
{
    let line = line.trim_ascii();
    if line.is_empty() {
        return true;
    }
    let item = serde_json::from_slice::<T>(line).map_err(Status::malformed_message);
    let keep_going = item.is_ok();
    if tx.send(item).await.is_err() {
        debug!("summary call ended before the body was consumed");
        return false;
    }
    keep_going
}
