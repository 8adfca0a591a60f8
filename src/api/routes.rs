//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/status", get(status_handler))
        // Accounts
        .route("/accounts", post(register_handler))
        .route("/accounts/:id", get(account_handler))
        .route("/accounts/:id/history", get(history_handler))
        .route("/accounts/:id/wagers", get(pending_wagers_handler))
        .route("/wagers/:id", get(wager_handler))
        // Game
        .route("/bets", post(place_bet_handler))
        .route("/results", get(results_handler))
        // Operator
        .route("/admin/topup", post(top_up_handler))
        .route("/admin/withdraw", post(withdraw_handler))
        .route("/admin/settle", post(settle_handler))
        .route("/admin/close", post(close_handler))
        .with_state(state)
}
