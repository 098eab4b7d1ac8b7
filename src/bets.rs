//! Betting tables and the wager lifecycle.
//!
//! A table is one resolvable event bound to a single external match; its
//! status only ever moves forward (`open → closed → settled`). A bet moves
//! `pending → {won, lost, cancelled}` exactly once. Wager placement is a
//! single transaction: table check, card consumption, wallet debit, bet
//! insert, and table counters either all land or none do.

use crate::catalog::CardCatalog;
use crate::errors::{CoreError, CoreResult, StorageError};
use crate::store::{keys, LedgerStore, LedgerTxn};
use crate::wallet::{
    decode_cursor, payout_for, Amount, EntryReference, TransactionKind, WalletAccessor,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Open,
    Closed,
    Settled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BettingTable {
    pub table_id: String,
    pub match_id: String,
    pub match_name: String,
    pub match_date: Option<DateTime<Utc>>,
    pub status: TableStatus,
    /// Aggregate counters, maintained in the placement transaction so they
    /// can never drift from the underlying bet rows.
    pub total_bets_placed: u64,
    pub total_chips_wagered: Amount,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Cancelled,
}

impl BetStatus {
    pub fn is_terminal(self) -> bool {
        self != BetStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub bet_id: String,
    pub user_id: String,
    pub table_id: String,
    pub card_id: String,
    /// Scoring rule bound to the card at placement.
    pub scoring_rule: String,
    pub wager_amount: Amount,
    /// Frozen at placement; later catalog changes never touch it.
    pub multiplier: f64,
    pub potential_payout: Amount,
    pub status: BetStatus,
    pub actual_payout: Amount,
    /// Raw oracle response stored for audit when the bet resolved.
    pub oracle_snapshot: Option<serde_json::Value>,
    /// Why a cancelled bet could not be resolved.
    pub failure_reason: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Outcome of resolving one bet against an oracle verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettledBet {
    pub status: BetStatus,
    pub actual_payout: Amount,
}

/// Pure resolution of a bet: no I/O, no clock, no storage.
pub fn settle_one(bet: &Bet, winning: bool) -> SettledBet {
    if winning {
        SettledBet {
            status: BetStatus::Won,
            actual_payout: payout_for(bet.wager_amount, bet.multiplier),
        }
    } else {
        SettledBet {
            status: BetStatus::Lost,
            actual_payout: 0,
        }
    }
}

/// Receipt returned to the caller after a successful placement.
#[derive(Debug, Clone, Serialize)]
pub struct BetPlacement {
    pub bet: Bet,
    pub card_name: String,
    pub new_balance: Amount,
}

#[derive(Clone)]
pub struct BetRegistry {
    store: LedgerStore,
    wallets: WalletAccessor,
    catalog: CardCatalog,
}

impl BetRegistry {
    pub fn new(store: LedgerStore, wallets: WalletAccessor, catalog: CardCatalog) -> Self {
        Self {
            store,
            wallets,
            catalog,
        }
    }

    /// Open a new table for a match. One table per match.
    pub fn create_table(
        &self,
        match_id: &str,
        match_name: Option<&str>,
        match_date: Option<DateTime<Utc>>,
    ) -> CoreResult<BettingTable> {
        if match_id.is_empty() {
            return Err(CoreError::InvalidState("match id is required".to_string()));
        }

        self.store.with_txn(|txn| {
            let match_key = keys::table_by_match(match_id);
            if txn.get_for_update::<String>(&match_key)?.is_some() {
                return Err(CoreError::InvalidState(format!(
                    "betting table already exists for match {}",
                    match_id
                )));
            }

            let table = BettingTable {
                table_id: Uuid::new_v4().to_string(),
                match_id: match_id.to_string(),
                match_name: match_name
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("Match {}", match_id)),
                match_date,
                status: TableStatus::Open,
                total_bets_placed: 0,
                total_chips_wagered: 0,
                opened_at: Utc::now(),
                closed_at: None,
                settled_at: None,
            };

            txn.put(&keys::table(&table.table_id), &table)?;
            txn.put(&match_key, &table.table_id)?;
            tracing::info!(table_id = %table.table_id, match_id, "betting table opened");
            Ok(table)
        })
    }

    pub fn table(&self, table_id: &str) -> CoreResult<BettingTable> {
        self.store
            .get::<BettingTable>(&keys::table(table_id))?
            .ok_or_else(|| CoreError::TableNotFound(table_id.to_string()))
    }

    /// Tables filtered by status, most recent match first.
    pub fn list_tables(&self, status: Option<TableStatus>) -> CoreResult<Vec<BettingTable>> {
        let rows = self
            .store
            .scan_prefix(keys::TABLE_PREFIX.as_bytes(), None, usize::MAX);

        let mut tables = Vec::with_capacity(rows.len());
        for (_, value) in rows {
            let table: BettingTable = serde_json::from_slice(&value).map_err(|e| {
                StorageError::CorruptedData(format!("failed to decode table: {}", e))
            })?;
            if status.map_or(true, |s| table.status == s) {
                tables.push(table);
            }
        }
        tables.sort_by(|a, b| {
            b.match_date
                .cmp(&a.match_date)
                .then(b.opened_at.cmp(&a.opened_at))
        });
        Ok(tables)
    }

    /// Place a wager: one atomic unit covering the table-open check, card
    /// consumption, wallet debit, bet insert, and table counter updates.
    /// If any step fails nothing is applied.
    pub fn place_bet(
        &self,
        user_id: &str,
        table_id: &str,
        card_id: &str,
        wager_amount: Amount,
    ) -> CoreResult<BetPlacement> {
        if wager_amount <= 0 {
            return Err(CoreError::InvalidAmount);
        }

        self.store.with_txn(|txn| {
            let table_key = keys::table(table_id);
            let mut table = txn
                .get_for_update::<BettingTable>(&table_key)?
                .ok_or_else(|| CoreError::TableNotFound(table_id.to_string()))?;

            if table.status != TableStatus::Open {
                return Err(CoreError::TableNotOpen(table_id.to_string()));
            }

            // Consumes one unit of the card or fails with AssetNotOwned.
            let card = self.catalog.consume_in(txn, user_id, card_id)?;

            let bet_id = Uuid::new_v4().to_string();
            let entry = self.wallets.debit_in(
                txn,
                user_id,
                wager_amount,
                TransactionKind::BetPlaced,
                &format!("Bet placed: {} on {}", card.name, table.match_name),
                Some(EntryReference::Bet(bet_id.clone())),
            )?;

            let placed_at = Utc::now();
            let bet = Bet {
                bet_id: bet_id.clone(),
                user_id: user_id.to_string(),
                table_id: table_id.to_string(),
                card_id: card.card_id.clone(),
                scoring_rule: card.scoring_rule.clone(),
                wager_amount,
                multiplier: card.multiplier,
                potential_payout: payout_for(wager_amount, card.multiplier),
                status: BetStatus::Pending,
                actual_payout: 0,
                oracle_snapshot: None,
                failure_reason: None,
                placed_at,
                settled_at: None,
            };

            txn.put(&keys::bet(&bet_id), &bet)?;
            txn.put_marker(&keys::bet_table_index(table_id, &bet_id))?;
            txn.put_marker(&keys::bet_user_index(
                user_id,
                placed_at.timestamp_millis() as u64,
                &bet_id,
            ))?;

            table.total_bets_placed += 1;
            table.total_chips_wagered += wager_amount;
            txn.put(&table_key, &table)?;

            tracing::info!(
                bet_id = %bet.bet_id,
                user_id,
                table_id,
                wager = bet.wager_amount,
                "bet placed"
            );

            Ok(BetPlacement {
                bet,
                card_name: card.name.clone(),
                new_balance: entry.balance_after,
            })
        })
    }

    pub fn bet(&self, bet_id: &str) -> CoreResult<Bet> {
        self.store
            .get::<Bet>(&keys::bet(bet_id))?
            .ok_or_else(|| CoreError::BetNotFound(bet_id.to_string()))
    }

    /// All still-pending bets on a table.
    pub fn pending_bets(&self, table_id: &str) -> CoreResult<Vec<Bet>> {
        let rows = self
            .store
            .scan_prefix(&keys::bet_table_scan(table_id), None, usize::MAX);

        let mut bets = Vec::new();
        for (key, _) in rows {
            let Some(bet_id) = keys::id_suffix(&key) else {
                continue;
            };
            let bet = self.bet(&bet_id)?;
            if bet.status == BetStatus::Pending {
                bets.push(bet);
            }
        }
        Ok(bets)
    }

    /// A user's bets, newest first, with optional status filter and opaque
    /// cursor pagination.
    pub fn user_bets(
        &self,
        user_id: &str,
        status: Option<BetStatus>,
        cursor: Option<&str>,
        limit: usize,
    ) -> CoreResult<(Vec<Bet>, Option<String>)> {
        let prefix = keys::bet_user_scan(user_id);
        let mut after = decode_cursor(cursor)?;

        let mut bets = Vec::new();
        let mut next_cursor = None;
        loop {
            let rows = self.store.scan_prefix(&prefix, after.as_deref(), limit.max(1));
            if rows.is_empty() {
                break;
            }
            let page_len = rows.len();

            for (key, _) in rows {
                after = Some(key.clone());
                let Some(bet_id) = keys::id_suffix(&key) else {
                    continue;
                };
                let bet = self.bet(&bet_id)?;
                if status.map_or(true, |s| bet.status == s) {
                    bets.push(bet);
                    next_cursor = Some(hex::encode(&key));
                    if bets.len() >= limit {
                        return Ok((bets, next_cursor));
                    }
                }
            }

            if page_len < limit.max(1) {
                break;
            }
        }

        Ok((bets, None))
    }

    /// Move a table toward settlement: fails fast when already settled,
    /// transitions `open → closed`, and proceeds quietly when already closed
    /// (idempotent close semantics).
    pub(crate) fn claim_for_settlement(&self, table_id: &str) -> CoreResult<BettingTable> {
        self.store.with_txn(|txn| {
            let key = keys::table(table_id);
            let mut table = txn
                .get_for_update::<BettingTable>(&key)?
                .ok_or_else(|| CoreError::TableNotFound(table_id.to_string()))?;

            match table.status {
                TableStatus::Settled => Err(CoreError::AlreadySettled(table_id.to_string())),
                TableStatus::Closed => Ok(table),
                TableStatus::Open => {
                    table.status = TableStatus::Closed;
                    table.closed_at = Some(Utc::now());
                    txn.put(&key, &table)?;
                    Ok(table)
                }
            }
        })
    }

    /// Terminal transition: the table is settled regardless of how many of
    /// its bets could be resolved.
    pub(crate) fn finalize_table(&self, table_id: &str) -> CoreResult<BettingTable> {
        self.store.with_txn(|txn| {
            let key = keys::table(table_id);
            let mut table = txn
                .get_for_update::<BettingTable>(&key)?
                .ok_or_else(|| CoreError::TableNotFound(table_id.to_string()))?;

            if table.status != TableStatus::Settled {
                table.status = TableStatus::Settled;
                table.settled_at = Some(Utc::now());
                txn.put(&key, &table)?;
            }
            Ok(table)
        })
    }

    /// Compare-and-set the pending→terminal transition inside the caller's
    /// transaction. Returns `None` when the bet already reached a terminal
    /// status — the exactly-once guard racing settlement runs rely on.
    pub(crate) fn apply_outcome_in(
        &self,
        txn: &LedgerTxn<'_>,
        bet_id: &str,
        status: BetStatus,
        actual_payout: Amount,
        oracle_snapshot: Option<serde_json::Value>,
        failure_reason: Option<String>,
    ) -> CoreResult<Option<Bet>> {
        debug_assert!(status.is_terminal());

        let key = keys::bet(bet_id);
        let mut bet = txn
            .get_for_update::<Bet>(&key)?
            .ok_or_else(|| CoreError::BetNotFound(bet_id.to_string()))?;

        if bet.status != BetStatus::Pending {
            return Ok(None);
        }

        bet.status = status;
        bet.actual_payout = actual_payout;
        bet.oracle_snapshot = oracle_snapshot;
        bet.failure_reason = failure_reason;
        bet.settled_at = Some(Utc::now());
        txn.put(&key, &bet)?;
        Ok(Some(bet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Card, Rarity};
    use crate::config::EconomyConfig;
    use crate::wallet::to_amount;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, WalletAccessor, CardCatalog, BetRegistry) {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path(), 3).unwrap();
        let wallets = WalletAccessor::new(
            store.clone(),
            &EconomyConfig {
                initial_chip_grant: 100.0,
            },
        );
        let catalog = CardCatalog::new(store.clone(), wallets.clone());
        catalog
            .upsert_card(&Card {
                card_id: "double-up".to_string(),
                name: "Double Up".to_string(),
                scoring_rule: "double-up".to_string(),
                description: "test card".to_string(),
                rarity: Rarity::Common,
                multiplier: 2.0,
                chip_cost: to_amount(50.0),
                active: true,
            })
            .unwrap();
        let registry = BetRegistry::new(store, wallets.clone(), catalog.clone());
        (dir, wallets, catalog, registry)
    }

    fn sample_bet(wager: Amount, multiplier: f64) -> Bet {
        Bet {
            bet_id: "b1".to_string(),
            user_id: "u1".to_string(),
            table_id: "t1".to_string(),
            card_id: "double-up".to_string(),
            scoring_rule: "double-up".to_string(),
            wager_amount: wager,
            multiplier,
            potential_payout: payout_for(wager, multiplier),
            status: BetStatus::Pending,
            actual_payout: 0,
            oracle_snapshot: None,
            failure_reason: None,
            placed_at: Utc::now(),
            settled_at: None,
        }
    }

    #[test]
    fn settle_one_win_pays_wager_times_multiplier() {
        let bet = sample_bet(to_amount(100.0), 2.0);
        let settled = settle_one(&bet, true);
        assert_eq!(settled.status, BetStatus::Won);
        assert_eq!(settled.actual_payout, to_amount(200.0));
    }

    #[test]
    fn settle_one_loss_pays_nothing() {
        let bet = sample_bet(to_amount(100.0), 2.0);
        let settled = settle_one(&bet, false);
        assert_eq!(settled.status, BetStatus::Lost);
        assert_eq!(settled.actual_payout, 0);
    }

    #[test]
    fn settle_one_rounds_fractional_payouts() {
        // 33.33 chips at 1.5x = 49.995 chips, rounded to 50.00.
        let bet = sample_bet(3333, 1.5);
        assert_eq!(settle_one(&bet, true).actual_payout, 5000);

        // 0.01 chips at 1.5x rounds to 0.02.
        let bet = sample_bet(1, 1.5);
        assert_eq!(settle_one(&bet, true).actual_payout, 2);
    }

    #[test]
    fn create_table_rejects_duplicate_match() {
        let (_dir, _w, _c, registry) = fixture();
        registry.create_table("m1", Some("Derby"), None).unwrap();

        let err = registry.create_table("m1", None, None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn place_bet_happy_path() {
        let (_dir, wallets, _c, registry) = fixture();
        wallets.open_wallet("u1").unwrap();
        registry.catalog.grant("u1", "double-up", 1).unwrap();
        let table = registry.create_table("m1", None, None).unwrap();

        // Wallet at 100, wager the full balance on a 2.0x card.
        let placement = registry
            .place_bet("u1", &table.table_id, "double-up", to_amount(100.0))
            .unwrap();

        assert_eq!(placement.new_balance, 0);
        assert_eq!(placement.bet.status, BetStatus::Pending);
        assert_eq!(placement.bet.potential_payout, to_amount(200.0));
        assert_eq!(placement.bet.multiplier, 2.0);

        let table = registry.table(&table.table_id).unwrap();
        assert_eq!(table.total_bets_placed, 1);
        assert_eq!(table.total_chips_wagered, to_amount(100.0));

        // Card consumed.
        assert!(registry.catalog.inventory("u1").unwrap().is_empty());
    }

    #[test]
    fn place_bet_with_empty_wallet_changes_nothing() {
        let (_dir, wallets, catalog, registry) = fixture();
        wallets.open_wallet("u1").unwrap();
        catalog.grant("u1", "double-up", 1).unwrap();
        let table = registry.create_table("m1", None, None).unwrap();

        registry
            .place_bet("u1", &table.table_id, "double-up", to_amount(100.0))
            .unwrap();
        catalog.grant("u1", "double-up", 1).unwrap();

        // Balance is now 0; one more chip is one too many.
        let err = registry
            .place_bet("u1", &table.table_id, "double-up", to_amount(1.0))
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));

        // Atomicity: card still held, no second bet, counters unchanged.
        assert_eq!(wallets.wallet("u1").unwrap().chip_balance, 0);
        assert_eq!(catalog.inventory("u1").unwrap()[0].0.quantity, 1);
        let table = registry.table(&table.table_id).unwrap();
        assert_eq!(table.total_bets_placed, 1);
        assert_eq!(registry.pending_bets(&table.table_id).unwrap().len(), 1);
    }

    #[test]
    fn place_bet_requires_open_table() {
        let (_dir, wallets, catalog, registry) = fixture();
        wallets.open_wallet("u1").unwrap();
        catalog.grant("u1", "double-up", 1).unwrap();
        let table = registry.create_table("m1", None, None).unwrap();
        registry.claim_for_settlement(&table.table_id).unwrap();

        let err = registry
            .place_bet("u1", &table.table_id, "double-up", to_amount(10.0))
            .unwrap_err();
        assert!(matches!(err, CoreError::TableNotOpen(_)));
    }

    #[test]
    fn place_bet_requires_card_ownership() {
        let (_dir, wallets, _c, registry) = fixture();
        wallets.open_wallet("u1").unwrap();
        let table = registry.create_table("m1", None, None).unwrap();

        let err = registry
            .place_bet("u1", &table.table_id, "double-up", to_amount(10.0))
            .unwrap_err();
        assert!(matches!(err, CoreError::AssetNotOwned(_)));

        // The failed attempt debited nothing.
        assert_eq!(
            wallets.wallet("u1").unwrap().chip_balance,
            to_amount(100.0)
        );
    }

    #[test]
    fn multiplier_is_frozen_at_placement() {
        let (_dir, wallets, catalog, registry) = fixture();
        wallets.open_wallet("u1").unwrap();
        catalog.grant("u1", "double-up", 1).unwrap();
        let table = registry.create_table("m1", None, None).unwrap();

        let placement = registry
            .place_bet("u1", &table.table_id, "double-up", to_amount(10.0))
            .unwrap();

        let mut card = catalog.card("double-up").unwrap();
        card.multiplier = 9.0;
        catalog.upsert_card(&card).unwrap();

        let bet = registry.bet(&placement.bet.bet_id).unwrap();
        assert_eq!(bet.multiplier, 2.0);
        assert_eq!(bet.potential_payout, to_amount(20.0));
    }

    #[test]
    fn zero_wager_is_rejected_before_any_io() {
        let (_dir, _w, _c, registry) = fixture();
        let err = registry.place_bet("u1", "t1", "double-up", 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidAmount));
    }

    #[test]
    fn claim_for_settlement_walks_the_state_machine() {
        let (_dir, _w, _c, registry) = fixture();
        let table = registry.create_table("m1", None, None).unwrap();

        let claimed = registry.claim_for_settlement(&table.table_id).unwrap();
        assert_eq!(claimed.status, TableStatus::Closed);
        assert!(claimed.closed_at.is_some());

        // Already closed: proceeds quietly.
        let again = registry.claim_for_settlement(&table.table_id).unwrap();
        assert_eq!(again.status, TableStatus::Closed);

        registry.finalize_table(&table.table_id).unwrap();
        let err = registry.claim_for_settlement(&table.table_id).unwrap_err();
        assert!(matches!(err, CoreError::AlreadySettled(_)));
    }

    #[test]
    fn apply_outcome_is_exactly_once() {
        let (_dir, wallets, catalog, registry) = fixture();
        wallets.open_wallet("u1").unwrap();
        catalog.grant("u1", "double-up", 1).unwrap();
        let table = registry.create_table("m1", None, None).unwrap();
        let placement = registry
            .place_bet("u1", &table.table_id, "double-up", to_amount(10.0))
            .unwrap();
        let bet_id = placement.bet.bet_id;

        let first = registry
            .store
            .with_txn(|txn| {
                registry.apply_outcome_in(txn, &bet_id, BetStatus::Won, to_amount(20.0), None, None)
            })
            .unwrap();
        assert!(first.is_some());

        let second = registry
            .store
            .with_txn(|txn| {
                registry.apply_outcome_in(txn, &bet_id, BetStatus::Lost, 0, None, None)
            })
            .unwrap();
        assert!(second.is_none());

        let bet = registry.bet(&bet_id).unwrap();
        assert_eq!(bet.status, BetStatus::Won);
        assert_eq!(bet.actual_payout, to_amount(20.0));
    }

    #[test]
    fn user_bets_paginate_newest_first() {
        let (_dir, wallets, catalog, registry) = fixture();
        wallets.open_wallet("u1").unwrap();
        catalog.grant("u1", "double-up", 3).unwrap();
        let table = registry.create_table("m1", None, None).unwrap();

        for _ in 0..3 {
            registry
                .place_bet("u1", &table.table_id, "double-up", to_amount(10.0))
                .unwrap();
        }

        let (page, cursor) = registry.user_bets("u1", None, None, 2).unwrap();
        assert_eq!(page.len(), 2);
        let cursor = cursor.expect("more results remain");

        let (rest, _) = registry.user_bets("u1", None, Some(&cursor), 10).unwrap();
        assert_eq!(rest.len(), 1);

        let (pending, _) = registry
            .user_bets("u1", Some(BetStatus::Pending), None, 10)
            .unwrap();
        assert_eq!(pending.len(), 3);
    }
}
