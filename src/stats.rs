//! Per-user statistics rollups.
//!
//! The rollup is a cache derived from settled bets, updated incrementally in
//! the same transaction that resolves each bet. `rebuild` recomputes it by
//! replaying the bet history, which doubles as the consistency check when a
//! rollup is suspected of drift.

use crate::bets::{Bet, BetStatus};
use crate::errors::{CoreResult, StorageError};
use crate::store::{keys, LedgerStore, LedgerTxn};
use crate::wallet::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatistics {
    pub user_id: String,
    pub total_bets: u64,
    pub total_wins: u64,
    pub total_losses: u64,
    pub total_wagered: Amount,
    pub total_won: Amount,
    /// Signed: payouts minus wagers over all settled bets.
    pub net_profit: Amount,
    /// Percentage, recomputed on every outcome.
    pub win_rate: f64,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_bet_at: Option<DateTime<Utc>>,
}

impl UserStatistics {
    fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_bets: 0,
            total_wins: 0,
            total_losses: 0,
            total_wagered: 0,
            total_won: 0,
            net_profit: 0,
            win_rate: 0.0,
            current_streak: 0,
            best_streak: 0,
            last_bet_at: None,
        }
    }

    fn apply(&mut self, won: bool, wagered: Amount, payout: Amount, at: DateTime<Utc>) {
        self.total_bets += 1;
        if won {
            self.total_wins += 1;
            self.current_streak += 1;
            self.best_streak = self.best_streak.max(self.current_streak);
        } else {
            self.total_losses += 1;
            self.current_streak = 0;
        }
        self.total_wagered += wagered;
        self.total_won += payout;
        self.net_profit += payout - wagered;
        self.win_rate = self.total_wins as f64 / self.total_bets as f64 * 100.0;
        self.last_bet_at = Some(at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardSort {
    NetProfit,
    WinRate,
    TotalWins,
    TotalWagered,
    BestStreak,
}

impl Default for LeaderboardSort {
    fn default() -> Self {
        LeaderboardSort::NetProfit
    }
}

#[derive(Clone)]
pub struct StatsAggregator {
    store: LedgerStore,
}

impl StatsAggregator {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// The user's rollup; zeroed when nothing has settled yet.
    pub fn stats(&self, user_id: &str) -> CoreResult<UserStatistics> {
        Ok(self
            .store
            .get::<UserStatistics>(&keys::stats(user_id))?
            .unwrap_or_else(|| UserStatistics::empty(user_id)))
    }

    /// Fold one settled outcome into the rollup inside the caller's
    /// transaction (the same unit that resolves the bet).
    pub(crate) fn record_outcome_in(
        &self,
        txn: &LedgerTxn<'_>,
        user_id: &str,
        won: bool,
        wagered: Amount,
        payout: Amount,
    ) -> CoreResult<UserStatistics> {
        let key = keys::stats(user_id);
        let mut stats = txn
            .get_for_update::<UserStatistics>(&key)?
            .unwrap_or_else(|| UserStatistics::empty(user_id));

        stats.apply(won, wagered, payout, Utc::now());
        txn.put(&key, &stats)?;
        Ok(stats)
    }

    /// Recompute the rollup from the user's settled bets in settlement
    /// order and store the result. Cancelled bets are not outcomes and do
    /// not count.
    pub fn rebuild(&self, user_id: &str) -> CoreResult<UserStatistics> {
        let mut settled: Vec<Bet> = self
            .user_bet_history(user_id)?
            .into_iter()
            .filter(|b| matches!(b.status, BetStatus::Won | BetStatus::Lost))
            .collect();
        settled.sort_by_key(|b| b.settled_at);

        let mut stats = UserStatistics::empty(user_id);
        for bet in &settled {
            stats.apply(
                bet.status == BetStatus::Won,
                bet.wager_amount,
                bet.actual_payout,
                bet.settled_at.unwrap_or(bet.placed_at),
            );
        }

        self.store
            .with_txn(|txn| txn.put(&keys::stats(user_id), &stats))?;
        tracing::info!(user_id, total_bets = stats.total_bets, "statistics rebuilt");
        Ok(stats)
    }

    /// Top users by the requested measure. Users with no settled bets are
    /// excluded.
    pub fn leaderboard(
        &self,
        sort: LeaderboardSort,
        limit: usize,
    ) -> CoreResult<Vec<UserStatistics>> {
        let rows = self
            .store
            .scan_prefix(keys::STATS_PREFIX.as_bytes(), None, usize::MAX);

        let mut entries = Vec::with_capacity(rows.len());
        for (_, value) in rows {
            let stats: UserStatistics = serde_json::from_slice(&value).map_err(|e| {
                StorageError::CorruptedData(format!("failed to decode statistics: {}", e))
            })?;
            if stats.total_bets > 0 {
                entries.push(stats);
            }
        }

        entries.sort_by(|a, b| match sort {
            LeaderboardSort::NetProfit => b.net_profit.cmp(&a.net_profit),
            LeaderboardSort::WinRate => b
                .win_rate
                .partial_cmp(&a.win_rate)
                .unwrap_or(std::cmp::Ordering::Equal),
            LeaderboardSort::TotalWins => b.total_wins.cmp(&a.total_wins),
            LeaderboardSort::TotalWagered => b.total_wagered.cmp(&a.total_wagered),
            LeaderboardSort::BestStreak => b.best_streak.cmp(&a.best_streak),
        });
        entries.truncate(limit);
        Ok(entries)
    }

    /// 1-based rank by net profit among users with settled bets; `None`
    /// when the user has none.
    pub fn rank(&self, user_id: &str) -> CoreResult<Option<(u64, UserStatistics)>> {
        let board = self.leaderboard(LeaderboardSort::NetProfit, usize::MAX)?;
        Ok(board
            .into_iter()
            .enumerate()
            .find(|(_, s)| s.user_id == user_id)
            .map(|(i, s)| (i as u64 + 1, s)))
    }

    fn user_bet_history(&self, user_id: &str) -> CoreResult<Vec<Bet>> {
        let rows = self
            .store
            .scan_prefix(&keys::bet_user_scan(user_id), None, usize::MAX);

        let mut bets = Vec::with_capacity(rows.len());
        for (key, _) in rows {
            let Some(bet_id) = keys::id_suffix(&key) else {
                continue;
            };
            if let Some(bet) = self.store.get::<Bet>(&keys::bet(&bet_id))? {
                bets.push(bet);
            }
        }
        Ok(bets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::to_amount;
    use tempfile::TempDir;

    fn aggregator() -> (TempDir, LedgerStore, StatsAggregator) {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path(), 3).unwrap();
        let stats = StatsAggregator::new(store.clone());
        (dir, store, stats)
    }

    fn record(store: &LedgerStore, stats: &StatsAggregator, won: bool, wagered: f64, payout: f64) {
        store
            .with_txn(|txn| {
                stats.record_outcome_in(txn, "u1", won, to_amount(wagered), to_amount(payout))
            })
            .unwrap();
    }

    #[test]
    fn outcomes_accumulate() {
        let (_dir, store, stats) = aggregator();

        record(&store, &stats, true, 100.0, 200.0);
        record(&store, &stats, false, 50.0, 0.0);

        let s = stats.stats("u1").unwrap();
        assert_eq!(s.total_bets, 2);
        assert_eq!(s.total_wins, 1);
        assert_eq!(s.total_losses, 1);
        assert_eq!(s.total_wagered, to_amount(150.0));
        assert_eq!(s.total_won, to_amount(200.0));
        assert_eq!(s.net_profit, to_amount(50.0));
        assert_eq!(s.win_rate, 50.0);
    }

    #[test]
    fn streaks_grow_and_reset() {
        let (_dir, store, stats) = aggregator();

        record(&store, &stats, true, 10.0, 20.0);
        record(&store, &stats, true, 10.0, 20.0);
        record(&store, &stats, true, 10.0, 20.0);
        record(&store, &stats, false, 10.0, 0.0);
        record(&store, &stats, true, 10.0, 20.0);

        let s = stats.stats("u1").unwrap();
        assert_eq!(s.best_streak, 3);
        assert_eq!(s.current_streak, 1);
    }

    #[test]
    fn unknown_user_has_empty_stats() {
        let (_dir, _store, stats) = aggregator();
        let s = stats.stats("nobody").unwrap();
        assert_eq!(s.total_bets, 0);
        assert_eq!(s.win_rate, 0.0);
        assert!(stats.rank("nobody").unwrap().is_none());
    }

    #[test]
    fn leaderboard_sorts_by_requested_measure() {
        let (_dir, store, stats) = aggregator();

        store
            .with_txn(|txn| {
                stats.record_outcome_in(txn, "alice", true, to_amount(10.0), to_amount(100.0))
            })
            .unwrap();
        store
            .with_txn(|txn| {
                stats.record_outcome_in(txn, "bob", true, to_amount(10.0), to_amount(20.0))?;
                stats.record_outcome_in(txn, "bob", false, to_amount(10.0), 0)
            })
            .unwrap();

        let by_profit = stats.leaderboard(LeaderboardSort::NetProfit, 10).unwrap();
        assert_eq!(by_profit[0].user_id, "alice");

        let by_wins = stats.leaderboard(LeaderboardSort::TotalWins, 10).unwrap();
        assert_eq!(by_wins[0].total_wins, 1);

        let (rank, _) = stats.rank("bob").unwrap().unwrap();
        assert_eq!(rank, 2);
    }
}
