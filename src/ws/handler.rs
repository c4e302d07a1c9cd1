//! Realtime gateway: one task pair per connection
//!
//! The reader half owns the heartbeat and forwards inputs into the owning
//! match; the writer half drains the tab's outbound channel, which is the
//! only thing the connection table hands out.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{MatchCommand, MatchInput};
use crate::http::middleware::verify_jwt;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::connections::OUTBOUND_CAPACITY;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT from the identity service
    pub token: String,
    /// Tab id to resume; a fresh one is minted when absent
    #[serde(default)]
    pub tab: Option<Uuid>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify before upgrading
    match verify_jwt(&query.token, &state.config.jwt_secret) {
        Ok(claims) => {
            let tab_id = query.tab.unwrap_or_else(Uuid::new_v4);
            info!(identity = %claims.sub, tab_id = %tab_id, "WebSocket upgrade");
            ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, tab_id, state))
        }
        Err(e) => {
            warn!(error = %e, "WebSocket auth failed");
            e.into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, identity: Uuid, tab_id: Uuid, state: AppState) {
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let conn_id = state.connections.register(identity, tab_id, out_tx);
    state.matches.attach_tab(identity, tab_id);

    state.connections.send(
        identity,
        tab_id,
        ServerMsg::Welcome {
            identity,
            tab_id,
            server_time: unix_millis(),
        },
    );

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_loop(identity, sink, out_rx));

    serve_connection(&state, identity, tab_id, conn_id, stream).await;
    writer.abort();

    info!(identity = %identity, tab_id = %tab_id, "WebSocket connection closed");
}

/// Read until the peer leaves or misses a heartbeat, then give the tab up
async fn serve_connection<S>(state: &AppState, identity: Uuid, tab_id: Uuid, conn_id: u64, stream: S)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    read_loop(state, identity, tab_id, stream).await;

    // A newer connection on the same tab keeps the entry
    if state.connections.unregister(identity, tab_id, conn_id) {
        state.matches.detach_tab(identity, tab_id);
    }
}

async fn write_loop(
    identity: Uuid,
    mut sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = out_rx.recv().await {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                warn!(identity = %identity, error = %e, "Failed to encode push");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(json)).await {
            debug!(identity = %identity, error = %e, "WebSocket send failed");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop<S>(state: &AppState, identity: Uuid, tab_id: Uuid, mut stream: S)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let limiter = ConnectionRateLimiter::new();
    let period = state.config.heartbeat_interval;
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if awaiting_pong {
                    warn!(identity = %identity, tab_id = %tab_id, "Heartbeat missed, closing connection");
                    break;
                }
                awaiting_pong = true;
                state.connections.send(identity, tab_id, ServerMsg::Ping);
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !limiter.check() {
                        warn!(identity = %identity, "Rate limited inbound message");
                        continue;
                    }
                    match serde_json::from_str::<ClientMsg>(&text) {
                        Ok(ClientMsg::Pong) => awaiting_pong = false,
                        Ok(msg) => dispatch(state, identity, tab_id, msg),
                        Err(e) => {
                            warn!(identity = %identity, error = %e, "Ignoring unrecognized message");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(identity = %identity, "Client closed the connection");
                    break;
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(identity = %identity, "Received binary message, ignoring");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(identity = %identity, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }
}

/// Map an inbound message to the command a match understands
pub fn match_command(msg: ClientMsg) -> Option<MatchCommand> {
    match msg {
        ClientMsg::Move {
            direction,
            pressed,
            side,
        } => Some(MatchCommand::Move {
            direction,
            pressed,
            side,
        }),
        ClientMsg::Drag { y, side } => Some(MatchCommand::Drag { y, side }),
        ClientMsg::Go => Some(MatchCommand::Go),
        ClientMsg::Pong => None,
    }
}

/// Forward an input to the match this tab steers. Inputs for tabs without
/// a running match are dropped.
pub fn dispatch(state: &AppState, identity: Uuid, tab_id: Uuid, msg: ClientMsg) {
    let Some(command) = match_command(msg) else {
        return;
    };
    let Some(input_tx) = state.lobby.input_for(identity, tab_id) else {
        debug!(identity = %identity, "Input from a tab with no running match");
        return;
    };
    if let Err(e) = input_tx.try_send(MatchInput {
        identity,
        tab_id,
        command,
    }) {
        debug!(identity = %identity, error = %e, "Match input dropped");
    }
}
