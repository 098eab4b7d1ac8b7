//! Request handlers.
//!
//! Each handler validates shape, calls into the core, and converts the
//! result; no business logic lives here.

use super::{
    errors::ApiError,
    middleware::RequestId,
    models::*,
};
use crate::bets::{BetRegistry, TableStatus};
use crate::catalog::CardCatalog;
use crate::settlement::SettlementEngine;
use crate::stats::StatsAggregator;
use crate::wallet::{to_amount, EntryReference, TransactionKind, WalletAccessor};
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    Extension, Json,
};
use std::sync::Arc;

/// Header carrying the authenticated user id, set by the upstream identity
/// provider. The core trusts this value.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state.
pub struct AppState {
    pub wallets: WalletAccessor,
    pub catalog: CardCatalog,
    pub registry: BetRegistry,
    pub stats: StatsAggregator,
    pub engine: Arc<SettlementEngine>,
    pub version: String,
}

/// The authenticated caller, extracted from `x-user-id`.
#[derive(Debug, Clone)]
pub struct AuthedUser(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .extensions
            .get::<RequestId>()
            .map(|r| r.0.clone())
            .unwrap_or_default();

        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(|s| AuthedUser(s.to_string()))
            .ok_or_else(|| {
                ApiError::unauthorized(request_id, format!("missing {} header", USER_ID_HEADER))
            })
    }
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// POST /api/wallet/open
pub async fn open_wallet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state
        .wallets
        .open_wallet(&user.0)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(wallet.into()))
}

/// GET /api/wallet
pub async fn wallet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state
        .wallets
        .wallet(&user.0)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(wallet.into()))
}

/// GET /api/wallet/transactions
pub async fn transactions_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
    Query(params): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let limit = params.limit.min(200);
    let (entries, next_cursor) = state
        .wallets
        .history(&user.0, params.kind, params.cursor.as_deref(), limit)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;

    Ok(Json(TransactionsResponse {
        transactions: entries.into_iter().map(Into::into).collect(),
        next_cursor,
    }))
}

/// POST /api/wallet/deposit
pub async fn deposit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
    Json(body): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, ApiError> {
    let description = body.description.as_deref().unwrap_or("Manual deposit");
    let entry = state
        .wallets
        .credit(
            &user.0,
            to_amount(body.amount),
            TransactionKind::Deposit,
            description,
            Some(EntryReference::System),
        )
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;

    Ok(Json(DepositResponse {
        amount: body.amount,
        new_balance: crate::wallet::from_amount(entry.balance_after),
    }))
}

/// GET /api/wallet/audit
pub async fn wallet_audit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
) -> Result<Json<AuditResponse>, ApiError> {
    let audit = state
        .wallets
        .audit(&user.0)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(audit.into()))
}

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

/// GET /api/cards/shop
pub async fn shop_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CardView>>, ApiError> {
    let cards = state
        .catalog
        .shop()
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(cards.into_iter().map(Into::into).collect()))
}

/// GET /api/cards/pocket
pub async fn pocket_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
) -> Result<Json<Vec<HoldingView>>, ApiError> {
    let inventory = state
        .catalog
        .inventory(&user.0)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(inventory.into_iter().map(Into::into).collect()))
}

/// POST /api/cards/purchase
pub async fn purchase_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let receipt = state
        .catalog
        .purchase(&user.0, &body.card_id)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(receipt.into()))
}

/// GET /api/cards/:card_id
pub async fn card_detail_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(card_id): Path<String>,
) -> Result<Json<CardView>, ApiError> {
    let card = state
        .catalog
        .card(&card_id)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(card.into()))
}

// ---------------------------------------------------------------------------
// Betting
// ---------------------------------------------------------------------------

/// GET /api/betting/tables
pub async fn tables_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<TablesQuery>,
) -> Result<Json<Vec<TableView>>, ApiError> {
    let filter = match params.status.as_deref() {
        None | Some("open") => Some(TableStatus::Open),
        Some("closed") => Some(TableStatus::Closed),
        Some("settled") => Some(TableStatus::Settled),
        Some("all") => None,
        Some(other) => {
            return Err(ApiError::bad_request(
                request_id.0.clone(),
                format!("unknown table status filter: {}", other),
            ));
        }
    };

    let tables = state
        .registry
        .list_tables(filter)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(tables.into_iter().map(Into::into).collect()))
}

/// POST /api/betting/tables
pub async fn create_table_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTableRequest>,
) -> Result<Json<TableView>, ApiError> {
    let table = state
        .registry
        .create_table(&body.match_id, body.match_name.as_deref(), body.match_date)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(table.into()))
}

/// POST /api/betting/bets
pub async fn place_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
    Json(body): Json<PlaceBetRequest>,
) -> Result<Json<PlaceBetResponse>, ApiError> {
    let placement = state
        .registry
        .place_bet(
            &user.0,
            &body.table_id,
            &body.card_id,
            to_amount(body.wager_amount),
        )
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(placement.into()))
}

/// GET /api/betting/bets
pub async fn user_bets_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
    Query(params): Query<UserBetsQuery>,
) -> Result<Json<UserBetsResponse>, ApiError> {
    let limit = params.limit.min(200);
    let (bets, next_cursor) = state
        .registry
        .user_bets(&user.0, params.status, params.cursor.as_deref(), limit)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;

    Ok(Json(UserBetsResponse {
        bets: bets.into_iter().map(Into::into).collect(),
        next_cursor,
    }))
}

/// POST /api/betting/tables/:table_id/settle
pub async fn settle_table_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(table_id): Path<String>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let report = state
        .engine
        .settle(&table_id)
        .await
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(report.into()))
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// GET /api/leaderboard
pub async fn leaderboard_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let sort = params.sort_by.unwrap_or_default();
    let limit = params.limit.min(200);

    let rows = state
        .stats
        .leaderboard(sort, limit)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;

    Ok(Json(LeaderboardResponse {
        leaderboard: rows
            .into_iter()
            .enumerate()
            .map(|(i, s)| LeaderboardRow {
                rank: i as u64 + 1,
                statistics: s.into(),
            })
            .collect(),
        sorted_by: sort,
    }))
}

/// GET /api/leaderboard/rank
pub async fn rank_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
) -> Result<Json<RankResponse>, ApiError> {
    let ranked = state
        .stats
        .rank(&user.0)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;

    let (rank, statistics) = match ranked {
        Some((rank, stats)) => (Some(rank), Some(stats.into())),
        None => (None, None),
    };
    Ok(Json(RankResponse { rank, statistics }))
}

/// POST /api/stats/rebuild — replay the bet history into a fresh rollup.
pub async fn rebuild_stats_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    user: AuthedUser,
) -> Result<Json<StatisticsView>, ApiError> {
    let stats = state
        .stats
        .rebuild(&user.0)
        .map_err(|e| ApiError::from_core(&request_id.0, e))?;
    Ok(Json(stats.into()))
}
