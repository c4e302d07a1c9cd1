//! HTTP route definitions

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::EngineError;
use crate::http::middleware::{require_auth, AuthenticatedIdentity};
use crate::matchmaking::{CleanOutcome, SeekOutcome};
use crate::tournament::{AdvanceOutcome, Departure, RosterEntry};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .merge(protected_routes(state.clone()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origin));

    router.with_state(state)
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/game/start", post(game_start_handler))
        .route("/tournament/create", post(tournament_create_handler))
        .route("/tournament/join", post(tournament_join_handler))
        .route("/tournament/leave", post(tournament_leave_handler))
        .route("/tournament/ready", post(tournament_ready_handler))
        .route("/tournament/start", post(tournament_start_handler))
        .route("/tournament/dismantle", post(tournament_dismantle_handler))
        .route("/tournament/advance", post(tournament_advance_handler))
        .route("/tournament/local", post(tournament_local_handler))
        .layer(middleware::from_fn_with_state(state, require_auth))
}

/// Comma-separated origins; `*` allows any origin without credentials
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    cors.allow_origin(allowed_origins).allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    active_tournaments: usize,
    registered_tabs: usize,
    open_connections: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.lobby.stats();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: stats.matches,
        active_tournaments: stats.tournaments,
        registered_tabs: stats.tabs,
        open_connections: state.connections.len(),
    })
}

// ============================================================================
// Responses
// ============================================================================

/// Small status object every engine endpoint answers with
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_ids: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<u64>,
}

impl StatusResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            match_id: None,
            match_ids: None,
            tournament_id: None,
        }
    }

    fn with_match(mut self, match_id: u64) -> Self {
        self.match_id = Some(match_id);
        self
    }

    fn with_tournament(mut self, tournament_id: u64) -> Self {
        self.tournament_id = Some(tournament_id);
        self
    }
}

type ApiResult = Result<Json<StatusResponse>, AppError>;

// ============================================================================
// Match requests
// ============================================================================

#[derive(Debug, Deserialize)]
struct StartRequest {
    tab_id: Uuid,
    /// Claimed player; must be the token's identity when present
    #[serde(default)]
    player_id: Option<Uuid>,
    #[serde(default)]
    alias: Option<String>,
    #[serde(flatten)]
    kind: StartKind,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StartKind {
    Random,
    Local {
        #[serde(default)]
        opponent_alias: Option<String>,
    },
    /// Resume a tournament seat on this tab
    Tournament { tournament_id: u64 },
    Invite { invitee: Uuid },
    Accept { inviter: Uuid },
    Clean {
        #[serde(default)]
        match_id: Option<u64>,
    },
}

async fn game_start_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let identity = auth.identity;
    if req.player_id.is_some_and(|claimed| claimed != identity) {
        return Err(EngineError::Unauthorized("player does not match the token".into()).into());
    }
    let (tab_id, alias) = (req.tab_id, req.alias);

    let response = match req.kind {
        StartKind::Random => match state.matches.random(identity, tab_id, alias).await? {
            SeekOutcome::Matched(id) => StatusResponse::new("matched").with_match(id),
            SeekOutcome::Waiting => StatusResponse::new("waiting"),
        },
        StartKind::Local { opponent_alias } => {
            let id = state
                .matches
                .local(identity, tab_id, alias, opponent_alias)
                .await?;
            StatusResponse::new("matched").with_match(id)
        }
        StartKind::Tournament { tournament_id } => {
            let response = StatusResponse::new("rejoined").with_tournament(tournament_id);
            match state.tournaments.rejoin(identity, tab_id, tournament_id)? {
                Some(id) => response.with_match(id),
                None => response,
            }
        }
        StartKind::Invite { invitee } => {
            state.matches.invite(identity, tab_id, alias, invitee).await?;
            StatusResponse::new("invited")
        }
        StartKind::Accept { inviter } => {
            let id = state.matches.accept(identity, tab_id, alias, inviter).await?;
            StatusResponse::new("matched").with_match(id)
        }
        StartKind::Clean { match_id } => match state.matches.clean(identity, tab_id, match_id).await? {
            CleanOutcome::Withdrawn => StatusResponse::new("withdrawn"),
            CleanOutcome::Cancelled(id) => StatusResponse::new("cancelled").with_match(id),
        },
    };

    Ok(Json(response))
}

// ============================================================================
// Tournament requests
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreateTournamentRequest {
    tab_id: Uuid,
    name: String,
    #[serde(default)]
    alias: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JoinTournamentRequest {
    tournament_id: u64,
    tab_id: Uuid,
    #[serde(default)]
    alias: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TournamentRequest {
    tournament_id: u64,
}

#[derive(Debug, Deserialize)]
struct ReadyRequest {
    tournament_id: u64,
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct LocalTournamentRequest {
    tab_id: Uuid,
    players: Vec<RosterEntry>,
}

async fn tournament_create_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    payload: Result<Json<CreateTournamentRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let id = state
        .tournaments
        .create(auth.identity, req.tab_id, &req.name, req.alias)
        .await?;
    Ok(Json(StatusResponse::new("created").with_tournament(id)))
}

async fn tournament_join_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    payload: Result<Json<JoinTournamentRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    state
        .tournaments
        .join(auth.identity, req.tab_id, req.tournament_id, req.alias)?;
    Ok(Json(StatusResponse::new("joined").with_tournament(req.tournament_id)))
}

async fn tournament_leave_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    payload: Result<Json<TournamentRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let status = match state.tournaments.leave(auth.identity, req.tournament_id).await? {
        Departure::Left => "left",
        Departure::Dismantle => "dismantled",
    };
    Ok(Json(StatusResponse::new(status).with_tournament(req.tournament_id)))
}

async fn tournament_ready_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    payload: Result<Json<ReadyRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    state
        .tournaments
        .set_ready(auth.identity, req.tournament_id, req.ready)?;
    let status = if req.ready { "ready" } else { "not_ready" };
    Ok(Json(StatusResponse::new(status).with_tournament(req.tournament_id)))
}

async fn tournament_start_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    payload: Result<Json<TournamentRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let matches = state.tournaments.start(auth.identity, req.tournament_id).await?;
    let mut response = StatusResponse::new("started").with_tournament(req.tournament_id);
    response.match_ids = Some(matches);
    Ok(Json(response))
}

async fn tournament_dismantle_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    payload: Result<Json<TournamentRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    state
        .tournaments
        .dismantle(auth.identity, req.tournament_id)
        .await?;
    Ok(Json(StatusResponse::new("dismantled").with_tournament(req.tournament_id)))
}

async fn tournament_advance_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    payload: Result<Json<TournamentRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let (status, match_id) = match state.tournaments.advance(auth.identity, req.tournament_id).await? {
        AdvanceOutcome::Started(id) => ("started", Some(id)),
        AdvanceOutcome::Deferred => ("deferred", None),
        AdvanceOutcome::AlreadyStarted => ("already_started", None),
    };
    let mut response = StatusResponse::new(status).with_tournament(req.tournament_id);
    response.match_id = match_id;
    Ok(Json(response))
}

async fn tournament_local_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedIdentity>,
    payload: Result<Json<LocalTournamentRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let (tournament_id, match_id) = state
        .tournaments
        .create_local(auth.identity, req.tab_id, &req.players)
        .await?;
    Ok(Json(
        StatusResponse::new("created")
            .with_tournament(tournament_id)
            .with_match(match_id),
    ))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Engine(e) => match e {
                EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                EngineError::Unauthorized(_) => StatusCode::FORBIDDEN,
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::Conflict(_) => StatusCode::CONFLICT,
                EngineError::Precondition(_) => StatusCode::PRECONDITION_FAILED,
                EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        // Collaborator details stay in the logs
        let message = match &self {
            AppError::Engine(EngineError::Internal(_)) => "internal error".to_string(),
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::http::middleware::{sign_jwt, JwtClaims};
    use crate::store::MemoryStore;

    const SECRET: &str = "test-secret";

    fn app() -> (AppState, Router) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::with_stores(Config::for_tests(SECRET), store.clone(), store);
        (state.clone(), build_router(state))
    }

    fn token(identity: Uuid) -> String {
        let claims = JwtClaims {
            sub: identity,
            aud: None,
            exp: u64::MAX / 2,
            iat: 0,
            role: None,
        };
        sign_jwt(&claims, SECRET).unwrap()
    }

    async fn post(
        router: &Router,
        path: &str,
        identity: Uuid,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", token(identity)))
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn health_reports_lobby_counters() {
        let (_, router) = app();
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_matches"], 0);
    }

    #[tokio::test]
    async fn requests_need_a_valid_token() {
        let (_, router) = app();
        let request = Request::builder()
            .method("POST")
            .uri("/game/start")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"kind":"random","tab_id":"00000000-0000-0000-0000-000000000001"}"#))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test(start_paused = true)]
    async fn two_seekers_are_paired() {
        let (state, router) = app();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let (status, body) = post(
            &router,
            "/game/start",
            a,
            serde_json::json!({"kind": "random", "tab_id": Uuid::new_v4()}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "waiting");

        let (status, body) = post(
            &router,
            "/game/start",
            b,
            serde_json::json!({"kind": "random", "tab_id": Uuid::new_v4(), "alias": "bee"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "matched");
        assert_eq!(state.lobby.stats().matches, 1);
        assert!(state
            .lobby
            .transact(|s| s.entries().iter().all(|p| !p.seeking)));
    }

    #[tokio::test]
    async fn boundary_errors_map_to_status_codes() {
        let (_, router) = app();
        let me = Uuid::new_v4();

        // Schema violation never reaches the engine
        let (status, _) = post(&router, "/game/start", me, serde_json::json!({"kind": "teleport"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(
            &router,
            "/game/start",
            me,
            serde_json::json!({"kind": "random", "tab_id": Uuid::new_v4(), "player_id": Uuid::new_v4()}),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = post(&router, "/tournament/start", me, serde_json::json!({"tournament_id": 77})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = post(
            &router,
            "/tournament/create",
            me,
            serde_json::json!({"tab_id": Uuid::new_v4(), "name": "cup"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["tournament_id"].as_u64().unwrap();

        let (status, _) = post(&router, "/tournament/start", me, serde_json::json!({"tournament_id": id})).await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);

        let (status, _) = post(
            &router,
            "/tournament/create",
            me,
            serde_json::json!({"tab_id": Uuid::new_v4(), "name": "second"}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
