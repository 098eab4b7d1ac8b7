//! Wire models: request payloads and JSON response shapes.
//!
//! Chip amounts cross the wire as decimal chips; the fixed-point core
//! representation never leaks out of the library.

use crate::bets::{Bet, BetPlacement, BetStatus, BettingTable, TableStatus};
use crate::catalog::{Card, Holding, PurchaseReceipt, Rarity};
use crate::settlement::SettlementReport;
use crate::stats::{LeaderboardSort, UserStatistics};
use crate::wallet::{from_amount, LedgerEntry, TransactionKind, Wallet, WalletAudit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub user_id: String,
    pub chip_balance: f64,
    pub total_earned: f64,
    pub total_spent: f64,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(w: Wallet) -> Self {
        Self {
            user_id: w.user_id,
            chip_balance: from_amount(w.chip_balance),
            total_earned: from_amount(w.total_earned),
            total_spent: from_amount(w.total_spent),
            updated_at: w.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub kind: Option<TransactionKind>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub entry_id: String,
    pub amount: f64,
    pub kind: TransactionKind,
    pub description: String,
    pub balance_before: f64,
    pub balance_after: f64,
    pub reference: Option<crate::wallet::EntryReference>,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for TransactionView {
    fn from(e: LedgerEntry) -> Self {
        Self {
            entry_id: e.entry_id,
            amount: from_amount(e.amount),
            kind: e.kind,
            description: e.description,
            balance_before: from_amount(e.balance_before),
            balance_after: from_amount(e.balance_after),
            reference: e.reference,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub amount: f64,
    pub new_balance: f64,
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub user_id: String,
    pub entries: u64,
    pub replayed_balance: f64,
    pub recorded_balance: f64,
    pub consistent: bool,
}

impl From<WalletAudit> for AuditResponse {
    fn from(a: WalletAudit) -> Self {
        Self {
            user_id: a.user_id,
            entries: a.entries,
            replayed_balance: from_amount(a.replayed_balance),
            recorded_balance: from_amount(a.recorded_balance),
            consistent: a.consistent,
        }
    }
}

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CardView {
    pub card_id: String,
    pub name: String,
    pub scoring_rule: String,
    pub description: String,
    pub rarity: Rarity,
    pub multiplier: f64,
    pub chip_cost: f64,
    pub active: bool,
}

impl From<Card> for CardView {
    fn from(c: Card) -> Self {
        Self {
            card_id: c.card_id,
            name: c.name,
            scoring_rule: c.scoring_rule,
            description: c.description,
            rarity: c.rarity,
            multiplier: c.multiplier,
            chip_cost: from_amount(c.chip_cost),
            active: c.active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HoldingView {
    pub card: CardView,
    pub quantity: u32,
    pub acquired_at: DateTime<Utc>,
}

impl From<(Holding, Card)> for HoldingView {
    fn from((h, c): (Holding, Card)) -> Self {
        Self {
            card: c.into(),
            quantity: h.quantity,
            acquired_at: h.acquired_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub card_id: String,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub card_id: String,
    pub card_name: String,
    pub cost: f64,
    pub new_balance: f64,
}

impl From<PurchaseReceipt> for PurchaseResponse {
    fn from(r: PurchaseReceipt) -> Self {
        Self {
            card_id: r.card_id,
            card_name: r.card_name,
            cost: from_amount(r.cost),
            new_balance: from_amount(r.new_balance),
        }
    }
}

// ---------------------------------------------------------------------------
// Tables and bets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TablesQuery {
    /// `open` (default), `closed`, `settled`, or `all`.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTableRequest {
    pub match_id: String,
    #[serde(default)]
    pub match_name: Option<String>,
    #[serde(default)]
    pub match_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TableView {
    pub table_id: String,
    pub match_id: String,
    pub match_name: String,
    pub match_date: Option<DateTime<Utc>>,
    pub status: TableStatus,
    pub total_bets_placed: u64,
    pub total_chips_wagered: f64,
    pub opened_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl From<BettingTable> for TableView {
    fn from(t: BettingTable) -> Self {
        Self {
            table_id: t.table_id,
            match_id: t.match_id,
            match_name: t.match_name,
            match_date: t.match_date,
            status: t.status,
            total_bets_placed: t.total_bets_placed,
            total_chips_wagered: from_amount(t.total_chips_wagered),
            opened_at: t.opened_at,
            closed_at: t.closed_at,
            settled_at: t.settled_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    pub table_id: String,
    pub card_id: String,
    pub wager_amount: f64,
}

#[derive(Debug, Serialize)]
pub struct BetView {
    pub bet_id: String,
    pub table_id: String,
    pub card_id: String,
    pub wager_amount: f64,
    pub multiplier: f64,
    pub potential_payout: f64,
    pub status: BetStatus,
    pub actual_payout: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub placed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl From<Bet> for BetView {
    fn from(b: Bet) -> Self {
        Self {
            bet_id: b.bet_id,
            table_id: b.table_id,
            card_id: b.card_id,
            wager_amount: from_amount(b.wager_amount),
            multiplier: b.multiplier,
            potential_payout: from_amount(b.potential_payout),
            status: b.status,
            actual_payout: from_amount(b.actual_payout),
            failure_reason: b.failure_reason,
            placed_at: b.placed_at,
            settled_at: b.settled_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaceBetResponse {
    pub bet: BetView,
    pub card_name: String,
    pub new_balance: f64,
}

impl From<BetPlacement> for PlaceBetResponse {
    fn from(p: BetPlacement) -> Self {
        Self {
            new_balance: from_amount(p.new_balance),
            card_name: p.card_name,
            bet: p.bet.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserBetsQuery {
    #[serde(default)]
    pub status: Option<BetStatus>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct UserBetsResponse {
    pub bets: Vec<BetView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SettlementOutcomeView {
    pub bet_id: String,
    pub user_id: String,
    pub status: BetStatus,
    pub actual_payout: f64,
}

#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    pub table_id: String,
    pub match_id: String,
    pub total_bets: usize,
    pub won: usize,
    pub lost: usize,
    pub cancelled: usize,
    pub outcomes: Vec<SettlementOutcomeView>,
}

impl From<SettlementReport> for SettlementResponse {
    fn from(r: SettlementReport) -> Self {
        Self {
            table_id: r.table_id,
            match_id: r.match_id,
            total_bets: r.total_bets,
            won: r.won,
            lost: r.lost,
            cancelled: r.cancelled,
            outcomes: r
                .outcomes
                .into_iter()
                .map(|o| SettlementOutcomeView {
                    bet_id: o.bet_id,
                    user_id: o.user_id,
                    status: o.status,
                    actual_payout: from_amount(o.actual_payout),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub sort_by: Option<LeaderboardSort>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct StatisticsView {
    pub user_id: String,
    pub total_bets: u64,
    pub total_wins: u64,
    pub total_losses: u64,
    pub win_rate: f64,
    pub total_wagered: f64,
    pub total_won: f64,
    pub net_profit: f64,
    pub current_streak: u32,
    pub best_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_bet_at: Option<DateTime<Utc>>,
}

impl From<UserStatistics> for StatisticsView {
    fn from(s: UserStatistics) -> Self {
        Self {
            user_id: s.user_id,
            total_bets: s.total_bets,
            total_wins: s.total_wins,
            total_losses: s.total_losses,
            win_rate: s.win_rate,
            total_wagered: from_amount(s.total_wagered),
            total_won: from_amount(s.total_won),
            net_profit: from_amount(s.net_profit),
            current_streak: s.current_streak,
            best_streak: s.best_streak,
            last_bet_at: s.last_bet_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LeaderboardRow {
    pub rank: u64,
    #[serde(flatten)]
    pub statistics: StatisticsView,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardRow>,
    pub sorted_by: LeaderboardSort,
}

#[derive(Debug, Serialize)]
pub struct RankResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<StatisticsView>,
}
