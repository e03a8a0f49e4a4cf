//! WebSocket notification channel
//!
//! Clients send `{"type": "subscribe_job", "job_id": "..."}` to join a
//! job's room. The server answers with an immediate `job_update` snapshot
//! and then forwards every further update for that job. One connection may
//! subscribe to any number of jobs.

use super::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::store::JobRecord;

#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    job_id: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Single writer task; room forwarders and the snapshot push both feed it
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let request: ClientMessage = match serde_json::from_str(text.as_str()) {
            Ok(request) => request,
            Err(e) => {
                debug!("Ignoring malformed client message: {}", e);
                continue;
            }
        };
        if request.kind != "subscribe_job" || request.job_id.is_empty() {
            continue;
        }

        let mut room = state.events.subscribe(&request.job_id).await;

        // Late subscribers get the current record right away
        if let Some(job) = state.store.get_job(&request.job_id).await {
            send_update(&tx, &job);
        }

        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match room.recv().await {
                    Ok(job) => {
                        if !send_update(&tx, &job) {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscriber lagged, skipped {} updates", skipped);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    writer.abort();
}

fn send_update(tx: &mpsc::UnboundedSender<String>, job: &JobRecord) -> bool {
    let payload = json!({ "type": "job_update", "job": job });
    match serde_json::to_string(&payload) {
        Ok(text) => tx.send(text).is_ok(),
        Err(e) => {
            warn!("Failed to serialize job update: {}", e);
            true
        }
    }
}
