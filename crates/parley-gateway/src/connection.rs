use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use parley_types::{ClientEvent, ServerEvent};

use crate::service::{ChatService, SubmitError};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection: register with the dispatcher, send
/// the history snapshot, then pump events both ways until either side hangs
/// up.
pub async fn handle_connection(socket: WebSocket, service: ChatService) {
    let (mut sender, mut receiver) = socket.split();

    // Register before loading history so nothing persisted from here on can
    // slip past this connection. Whatever queues up while the snapshot loads
    // is deduplicated against it below.
    let (conn_id, mut events_rx) = service.dispatcher().register().await;
    info!("connection {} registered", conn_id);

    // The snapshot always goes out first; live traffic waits in the queue.
    let snapshot = match service.history().await {
        Ok(messages) => messages,
        Err(e) => {
            warn!("connection {}: history load failed, closing: {:#}", conn_id, e);
            service.dispatcher().unregister(conn_id).await;
            return;
        }
    };
    let mut last_sent_id = snapshot.last().map(|m| m.id);

    let snapshot = ServerEvent::Snapshot { messages: snapshot };
    if sender
        .send(Message::Text(serde_json::to_string(&snapshot).unwrap().into()))
        .await
        .is_err()
    {
        service.dispatcher().unregister(conn_id).await;
        return;
    }

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let event = match event {
                        Some(event) => event,
                        None => break,
                    };

                    // Skip broadcasts the snapshot already covered so the
                    // client never sees the same id twice.
                    if let ServerEvent::Broadcast { message } = &event {
                        if last_sent_id.is_some_and(|id| message.id <= id) {
                            continue;
                        }
                        last_sent_id = Some(message.id);
                    }

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read submissions from the client
    let recv_service = service.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(ClientEvent::Submit { author, body }) => {
                        // Fire-and-forget transport: nothing goes back to
                        // the sender on failure, only a log line here.
                        if let Err(e) = recv_service.submit(author, body).await {
                            match e {
                                SubmitError::Rejected(_) => {
                                    debug!("connection {}: {}", conn_id, e);
                                }
                                SubmitError::Unavailable(_) => {
                                    warn!("connection {}: {}", conn_id, e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(
                            "connection {} bad payload: {} -- raw: {}",
                            conn_id,
                            e,
                            clip_for_log(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    service.dispatcher().unregister(conn_id).await;
    info!("connection {} disconnected", conn_id);
}

/// Clip a payload for logging to at most `max` bytes, backing up to a char
/// boundary; a byte slice at a non-boundary panics.
fn clip_for_log(text: &str, max: usize) -> &str {
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
