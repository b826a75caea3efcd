//! WebSocket upgrade handler

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{IntentCell, JoinTicket, TurnIntent, OUTBOX_CAPACITY};
use crate::ws::protocol::parse_turn_intent;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    debug!(addr = %addr, "WebSocket upgrade requested");
    ws.on_failed_upgrade(move |e: axum::Error| {
        warn!(addr = %addr, error = %e, "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| handle_socket(socket, addr, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: AppState) {
    let (ws_sink, ws_stream) = socket.split();
    let (outbox_tx, outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);

    let ticket = match state.session.join(addr, outbox_tx).await {
        Ok(ticket) => ticket,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to join session");
            return;
        }
    };

    info!(addr = %addr, player_id = ticket.id, "New WebSocket connection");

    run_session(addr, &ticket, ws_sink, ws_stream, outbox_rx).await;

    // Cleanup on disconnect
    if let Err(e) = state.session.leave(addr, ticket.id).await {
        debug!(addr = %addr, error = %e, "Leave after session shutdown");
    }

    info!(addr = %addr, player_id = ticket.id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    addr: SocketAddr,
    ticket: &JoinTicket,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbox_rx: mpsc::Receiver<String>,
) {
    // Spawn writer task: outbox -> WebSocket. Ending it closes the outbox,
    // which the tick loop treats as a disconnect.
    let writer_handle = tokio::spawn(async move {
        while let Some(text) = outbox_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(text)).await {
                debug!(addr = %addr, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> turn intent
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => apply_client_text(addr, &ticket.intent, &text),
            Ok(Message::Binary(_)) => {
                warn!(addr = %addr, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(addr = %addr, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(addr = %addr, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(addr = %addr, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(addr = %addr, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Decode one text frame and update the player's intent. Malformed frames
/// are logged and steer straight.
fn apply_client_text(addr: SocketAddr, intent: &IntentCell, text: &str) {
    match parse_turn_intent(text) {
        Ok(turn) => intent.store(turn),
        Err(e) => {
            warn!(addr = %addr, error = %e, "Failed to parse client message");
            intent.store(TurnIntent::Straight);
        }
    }
}
