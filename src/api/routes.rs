//! Route definitions.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Wallet
        .route("/api/wallet/open", post(open_wallet_handler))
        .route("/api/wallet", get(wallet_handler))
        .route("/api/wallet/transactions", get(transactions_handler))
        .route("/api/wallet/deposit", post(deposit_handler))
        .route("/api/wallet/audit", get(wallet_audit_handler))
        // Cards
        .route("/api/cards/shop", get(shop_handler))
        .route("/api/cards/pocket", get(pocket_handler))
        .route("/api/cards/purchase", post(purchase_handler))
        .route("/api/cards/:card_id", get(card_detail_handler))
        // Betting
        .route("/api/betting/tables", get(tables_handler).post(create_table_handler))
        .route("/api/betting/bets", get(user_bets_handler).post(place_bet_handler))
        .route(
            "/api/betting/tables/:table_id/settle",
            post(settle_table_handler),
        )
        // Statistics
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/api/leaderboard/rank", get(rank_handler))
        .route("/api/stats/rebuild", post(rebuild_stats_handler))
        .with_state(state)
}
