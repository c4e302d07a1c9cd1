//! Diagnostic client: opens a gateway connection, requests a match and logs
//! interpolated frames until the match ends
//!
//! Environment:
//! - `PROBE_SERVER` (default `127.0.0.1:8080`)
//! - `AUTH_JWT_SECRET` signs the probe's own token
//! - `PROBE_IDENTITY` (default: random)
//! - `PROBE_KIND`: `local` (default) or `random`

use std::env;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use paddle_arena::client::SnapshotBuffer;
use paddle_arena::http::middleware::{sign_jwt, JwtClaims};
use paddle_arena::util::time::unix_millis;
use paddle_arena::ws::protocol::{ClientMsg, ServerMsg};

/// Log one rendered frame every this many snapshots
const LOG_EVERY: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server = env::var("PROBE_SERVER").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let secret = env::var("AUTH_JWT_SECRET").context("AUTH_JWT_SECRET is required")?;
    let identity = match env::var("PROBE_IDENTITY") {
        Ok(raw) => raw.parse().context("PROBE_IDENTITY must be a UUID")?,
        Err(_) => Uuid::new_v4(),
    };
    let kind = env::var("PROBE_KIND").unwrap_or_else(|_| "local".to_string());

    let claims = JwtClaims {
        sub: identity,
        aud: Some("authenticated".to_string()),
        exp: unix_millis() / 1000 + 3600,
        iat: unix_millis() / 1000,
        role: None,
    };
    let token = sign_jwt(&claims, &secret)?;
    let tab_id = Uuid::new_v4();

    let url = format!("ws://{server}/ws?token={token}&tab={tab_id}");
    let (mut socket, _) = connect_async(url.as_str())
        .await
        .context("gateway connection failed")?;
    info!(identity = %identity, tab_id = %tab_id, "Connected");

    let http = reqwest::Client::new();
    let mut buffer = SnapshotBuffer::new();

    while let Some(frame) = socket.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let msg: ServerMsg = match serde_json::from_str(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Unrecognized push");
                continue;
            }
        };

        match msg {
            ServerMsg::Welcome { server_time, .. } => {
                info!(server_time, kind = %kind, "Welcome received, requesting a match");
                let response = http
                    .post(format!("http://{server}/game/start"))
                    .bearer_auth(&token)
                    .json(&serde_json::json!({ "kind": kind, "tab_id": tab_id }))
                    .send()
                    .await?;
                let status = response.status();
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                info!(%status, %body, "Match request answered");
            }
            ServerMsg::Ping => {
                let pong = serde_json::to_string(&ClientMsg::Pong)?;
                socket.send(Message::Text(pong)).await?;
            }
            ServerMsg::StartGame { match_id, side, opponent, .. } => {
                info!(match_id, ?side, opponent = ?opponent.alias, "Match starting");
                buffer.clear();
            }
            ServerMsg::DecountGame { count } => info!(count, "Countdown"),
            ServerMsg::State(snapshot) => {
                let tick = snapshot.tick;
                buffer.push(unix_millis(), snapshot);
                if tick % LOG_EVERY == 0 {
                    if let Some(frame) = buffer.render(unix_millis()) {
                        info!(
                            tick,
                            ball_x = frame.ball.x,
                            ball_y = frame.ball.y,
                            you_y = frame.you.y,
                            opponent_y = frame.opponent.y,
                            score = ?frame.score,
                            "Rendered frame"
                        );
                    }
                }
            }
            ServerMsg::End { match_id, score, cancelled, .. } => {
                info!(match_id, ?score, cancelled, "Match over");
                break;
            }
            other => debug!(?other, "Push"),
        }
    }

    let _ = socket.close(None).await;
    Ok(())
}
