use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::chat::presence::Role;
use crate::error::ChatError;
use crate::state::ChatState;
use crate::ws::protocol;
use crate::ws::session::{ConnectionSession, InboundEvent};
use crate::ws::{ConnectionHandle, ConnectionId};

/// Run the actor-per-connection pattern for an upgraded WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from an mpsc channel
/// - Ping task: heartbeat; closes the socket when pongs stop arriving
/// - Reader loop: decodes frames and feeds them to the connection's session
///
/// The mpsc channel allows any part of the system to send messages to this client
/// by cloning the handle registered in the presence registry.
pub async fn run_connection(socket: WebSocket, state: ChatState, claim: Option<String>, role: Role) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle = ConnectionHandle::new(ConnectionId::new(), tx.clone());
    let connection_id = handle.id;
    let ping_interval = state.chat.ping_interval();
    let pong_timeout = state.chat.pong_timeout();

    // Writer first so the handshake's presence snapshot has somewhere to go
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let mut session = ConnectionSession::new(state, handle);
    session.dispatch(InboundEvent::Handshake { claim, role }).await;

    tracing::info!(
        connection_id = %connection_id,
        user_id = ?session.user_id(),
        role = role.as_str(),
        "WebSocket actor started"
    );

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    let ping_tx = tx.clone();
    let mut ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!(connection_id = %connection_id, "Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: events from one connection are handled strictly in order.
    // The ping task only finishes when the peer is dead, which ends the loop too.
    loop {
        let next = tokio::select! {
            _ = &mut ping_handle => {
                tracing::info!(connection_id = %connection_id, "Heartbeat stopped, dropping connection");
                break;
            }
            next = ws_receiver.next() => next,
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    session.handle_text(text.as_str()).await;
                }
                Message::Binary(_) => {
                    protocol::send_error(
                        session.handle(),
                        &ChatError::Malformed("binary frames are not supported".into()),
                        None,
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %connection_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection_id = %connection_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup runs on every exit path of the reader loop
    writer_handle.abort();
    ping_handle.abort();
    session.dispatch(InboundEvent::Disconnect).await;

    tracing::info!(connection_id = %connection_id, "WebSocket actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}
