use std::sync::Arc;

use axum::{
    extract::{
        Extension,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::app::services::AppServices;
use crate::protocol::{Status, TransferMessage, TransferResponse};

/// GET /transfers/ws
///
/// Each text frame from the client is one `TransferMessage`; each frame back is
/// one `TransferResponse`, or `{"error": Status}` right before the server closes.
pub async fn transfer_multiple(
    Extension(services): Extension<Arc<AppServices>>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(services, socket))
        .into_response()
}

async fn handle_socket(services: Arc<AppServices>, socket: WebSocket) {
    info!("transfer stream opened");
    let (mut sink, mut stream) = socket.split();
    let (in_tx, in_rx) = mpsc::channel::<Result<TransferMessage, Status>>(1);
    let (out_tx, mut out_rx) = mpsc::channel::<Result<TransferResponse, Status>>(1);

    let reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let item = match frame {
                Ok(Message::Text(text)) => {
                    serde_json::from_str::<TransferMessage>(&text).map_err(Status::malformed_message)
                }
                Ok(Message::Binary(_)) => Err(Status::malformed_message("binary frames are not supported")),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "client closed transfer stream");
                    break;
                }
                Err(err) => Err(Status::stream_read_failed(err)),
            };
            let terminal = item.is_err();
            if in_tx.send(item).await.is_err() || terminal {
                break;
            }
        }
    });

    let protocol = services.protocol.clone();
    let call = tokio::spawn(async move {
        protocol
            .transfer_multiple(ReceiverStream::new(in_rx), out_tx)
            .await
    });

    while let Some(item) = out_rx.recv().await {
        let terminal = item.is_err();
        let payload = match &item {
            Ok(response) => serde_json::to_string(response),
            Err(status) => serde_json::to_string(&json!({ "error": status })),
        };
        let text = match payload {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "failed to encode transfer response");
                break;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            debug!("client went away; cancelling transfer stream");
            break;
        }
        if terminal {
            break;
        }
    }

    // Dropping the receiver is the cancellation signal for the protocol.
    drop(out_rx);
    let _ = sink.close().await;
    reader.abort();
    if let Err(err) = call.await {
        warn!(error = %err, "transfer stream task failed");
    }
    info!("transfer stream closed");
}
