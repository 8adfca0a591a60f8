//! Request Handlers
//!
//! Thin adapters from JSON requests to [`LedgerServices`] operations. The
//! ledger is synchronous and fast, so handlers call it inline.

use super::{
    errors::ApiError,
    middleware::{Caller, RequestId},
    models::*,
};
use crate::{
    games::{
        betting::BetReceipt,
        settlement::SettlementReport,
        types::{Account, GameStatus, HistoryEntry, Role, Wager, WinResult},
    },
    history::Page,
    services::LedgerServices,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub ledger: Arc<LedgerServices>,
    pub version: String,
}

impl AppState {
    pub fn new(ledger: Arc<LedgerServices>) -> Self {
        Self {
            ledger,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.ledger.metrics().to_prometheus_format(),
    )
}

/// GET /status
pub async fn status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<StatusResponse> {
    let now = Utc::now();
    let status = state
        .ledger
        .game_status(now)
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))?;
    let closed_reason = state.ledger.status_controller().closed_reason(&status, now);
    let deadline = state.ledger.clock().deadline(status.current_session);

    Ok(Json(StatusResponse {
        status,
        betting_open: closed_reason.is_none(),
        closed_reason,
        deadline,
        server_time: now,
    }))
}

/// POST /accounts
///
/// Users may register themselves; creating an admin account takes an admin caller.
pub async fn register_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: Option<Caller>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let role = body.role.unwrap_or(Role::User);
    if role == Role::Admin && !caller.as_ref().is_some_and(Caller::is_admin) {
        return Err(ApiError::forbidden(&request_id.0, "only admins can create admin accounts"));
    }

    let account = state
        .ledger
        .register(&body.id, role, Utc::now())
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /accounts/:id
pub async fn account_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Account> {
    caller.ensure_can_access(&id, &request_id.0)?;
    state
        .ledger
        .get_account(&id)
        .map(Json)
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))
}

/// GET /accounts/:id/history?cursor={hex}&limit={n}
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<HistoryEntry>> {
    caller.ensure_can_access(&id, &request_id.0)?;
    state
        .ledger
        .history_page(&id, query.cursor.as_deref(), query.limit)
        .map(Json)
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))
}

/// GET /accounts/:id/wagers
pub async fn pending_wagers_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<Wager>> {
    caller.ensure_can_access(&id, &request_id.0)?;
    state
        .ledger
        .pending_for(&id)
        .map(Json)
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))
}

/// GET /wagers/:id
pub async fn wager_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Wager> {
    let wager = state
        .ledger
        .get_wager(&id)
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))?
        .ok_or_else(|| ApiError::not_found(&request_id.0, format!("wager {}", id)))?;
    caller.ensure_can_access(&wager.owner, &request_id.0)?;
    Ok(Json(wager))
}

/// POST /bets
pub async fn place_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<PlaceBetRequest>,
) -> Result<(StatusCode, Json<BetReceipt>), ApiError> {
    let selector = body
        .selector
        .into_selector()
        .ok_or_else(|| ApiError::bad_request(&request_id.0, "unrecognised selector"))?;

    let receipt = state
        .ledger
        .place_bet(&caller.account_id, &selector, body.stake, Utc::now())
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /results?cursor={hex}&limit={n}
pub async fn results_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<WinResult>> {
    state
        .ledger
        .results_page(query.cursor.as_deref(), query.limit)
        .map(Json)
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))
}

/// POST /admin/topup
pub async fn top_up_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<AdjustBalanceRequest>,
) -> ApiResult<Account> {
    caller.ensure_admin(&request_id.0)?;
    state
        .ledger
        .top_up(&body.account, body.amount, Utc::now())
        .map(Json)
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))
}

/// POST /admin/withdraw
pub async fn withdraw_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<AdjustBalanceRequest>,
) -> ApiResult<Account> {
    caller.ensure_admin(&request_id.0)?;
    state
        .ledger
        .withdraw(&body.account, body.amount, Utc::now())
        .map(Json)
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))
}

/// POST /admin/settle
pub async fn settle_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<SettleRequest>,
) -> ApiResult<SettlementReport> {
    caller.ensure_admin(&request_id.0)?;
    tracing::info!(
        request_id = %request_id.0,
        admin = %caller.account_id,
        number = %body.number,
        session = %body.session,
        "Settlement requested"
    );
    // A run scans every pending wager; keep it off the async workers
    let ledger = state.ledger.clone();
    tokio::task::spawn_blocking(move || {
        ledger.settle(&body.number, body.multiplier, body.session, Utc::now())
    })
    .await
    .map_err(|e| ApiError::internal_error(&request_id.0, format!("settlement task failed: {}", e)))?
    .map(Json)
    .map_err(|e| ApiError::from_ledger(&request_id.0, e))
}

/// POST /admin/close
pub async fn close_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<CloseRequest>,
) -> ApiResult<GameStatus> {
    caller.ensure_admin(&request_id.0)?;
    state
        .ledger
        .set_manually_closed(body.closed, Utc::now())
        .map(Json)
        .map_err(|e| ApiError::from_ledger(&request_id.0, e))
}
