//! Batch settlement of betting tables.
//!
//! `settle` drives one table from wherever it is to `settled`: fail fast if
//! already settled, close if still open, resolve every pending bet, then mark
//! the table settled unconditionally. Each bet's resolution is its own atomic
//! unit and one bet's failure never touches the others — an oracle outage for
//! one scoring rule degrades that bet to `cancelled` (with its wager
//! refunded) while the rest of the table resolves normally.

use crate::bets::{settle_one, Bet, BetRegistry, BetStatus, BettingTable};
use crate::config::OracleConfig;
use crate::errors::{CoreError, CoreResult, OracleError};
use crate::oracle::ScoringOracle;
use crate::stats::StatsAggregator;
use crate::store::LedgerStore;
use crate::wallet::{Amount, EntryReference, TransactionKind, WalletAccessor};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of one bet within a settlement run.
#[derive(Debug, Clone, Serialize)]
pub struct BetOutcome {
    pub bet_id: String,
    pub user_id: String,
    pub status: BetStatus,
    pub actual_payout: Amount,
}

/// Summary of a completed settlement run.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub table_id: String,
    pub match_id: String,
    pub outcomes: Vec<BetOutcome>,
    pub total_bets: usize,
    pub won: usize,
    pub lost: usize,
    pub cancelled: usize,
}

pub struct SettlementEngine {
    store: LedgerStore,
    registry: BetRegistry,
    wallets: WalletAccessor,
    stats: StatsAggregator,
    oracle: Arc<dyn ScoringOracle>,
    config: OracleConfig,
    /// Tables with a settlement run in flight in this process.
    in_flight: DashMap<String, ()>,
}

impl SettlementEngine {
    pub fn new(
        store: LedgerStore,
        registry: BetRegistry,
        wallets: WalletAccessor,
        stats: StatsAggregator,
        oracle: Arc<dyn ScoringOracle>,
        config: OracleConfig,
    ) -> Self {
        Self {
            store,
            registry,
            wallets,
            stats,
            oracle,
            config,
            in_flight: DashMap::new(),
        }
    }

    /// Resolve every pending bet on the table and mark it settled.
    ///
    /// The per-table loop is not one transaction: a dead scoring rule must
    /// not block resolving the rest of the table.
    pub async fn settle(&self, table_id: &str) -> CoreResult<SettlementReport> {
        let _guard = self.claim_run(table_id)?;

        let table = self.registry.claim_for_settlement(table_id)?;
        let pending = self.registry.pending_bets(table_id)?;
        info!(
            table_id,
            match_id = %table.match_id,
            pending = pending.len(),
            "settlement run started"
        );

        let mut outcomes = Vec::with_capacity(pending.len());
        for bet in &pending {
            match self.resolve_bet(bet, &table).await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                // Another run already resolved it; nothing to record.
                Ok(None) => {}
                Err(e) => {
                    // Storage-level failure: the bet stays pending but the
                    // run keeps going; the next settle attempt on a stuck
                    // table is blocked only by the terminal transition below.
                    warn!(bet_id = %bet.bet_id, error = %e, "failed to persist bet resolution");
                }
            }
        }

        self.registry.finalize_table(table_id)?;

        let report = SettlementReport {
            table_id: table_id.to_string(),
            match_id: table.match_id.clone(),
            total_bets: pending.len(),
            won: count(&outcomes, BetStatus::Won),
            lost: count(&outcomes, BetStatus::Lost),
            cancelled: count(&outcomes, BetStatus::Cancelled),
            outcomes,
        };
        info!(
            table_id,
            won = report.won,
            lost = report.lost,
            cancelled = report.cancelled,
            "settlement run finished"
        );
        Ok(report)
    }

    /// Resolve one bet end to end: oracle verdict outside any transaction,
    /// then a single atomic unit applying the outcome. Any failure on the
    /// oracle side degrades this bet to `cancelled`.
    async fn resolve_bet(
        &self,
        bet: &Bet,
        table: &BettingTable,
    ) -> CoreResult<Option<BetOutcome>> {
        match self.fetch_verdict(bet, table).await {
            Ok((winning, snapshot)) => match self.apply_verdict(bet, winning, &snapshot) {
                Ok(applied) => Ok(applied),
                Err(e) if e.is_transient() => Err(e),
                Err(CoreError::Storage(e)) => Err(CoreError::Storage(e)),
                Err(e) => {
                    // Business-level failure applying the outcome (for
                    // example a missing wallet): per-bet isolation turns it
                    // into a cancellation rather than aborting the run.
                    warn!(bet_id = %bet.bet_id, error = %e, "outcome could not be applied, cancelling bet");
                    self.cancel_bet(bet, &e.to_string())
                }
            },
            Err(oracle_err) => {
                warn!(
                    bet_id = %bet.bet_id,
                    rule = %bet.scoring_rule,
                    error = %oracle_err,
                    "oracle verdict unavailable, cancelling bet"
                );
                self.cancel_bet(bet, &oracle_err.to_string())
            }
        }
    }

    /// Call the oracle with a timeout, retrying up to the configured number
    /// of attempts before giving up.
    async fn fetch_verdict(
        &self,
        bet: &Bet,
        table: &BettingTable,
    ) -> Result<(bool, serde_json::Value), OracleError> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let parameters = serde_json::json!({});
        let mut last_error = OracleError::Request("no attempts made".to_string());

        for attempt in 1..=self.config.max_attempts {
            let call = self
                .oracle
                .execute_scoring_rule(&bet.scoring_rule, &table.match_id, &parameters);

            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(response)) => {
                    let winning = response.hits_match(&table.match_id);
                    let snapshot = serde_json::to_value(&response)
                        .unwrap_or(serde_json::Value::Null);
                    return Ok((winning, snapshot));
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = OracleError::Timeout(self.config.timeout_ms),
            }

            warn!(
                bet_id = %bet.bet_id,
                rule = %bet.scoring_rule,
                attempt,
                max_attempts = self.config.max_attempts,
                error = %last_error,
                "oracle call failed"
            );
        }

        Err(last_error)
    }

    /// Apply a win or loss in one transaction: flip the bet terminal, credit
    /// the payout, fold the outcome into the user's statistics.
    fn apply_verdict(
        &self,
        bet: &Bet,
        winning: bool,
        snapshot: &serde_json::Value,
    ) -> CoreResult<Option<BetOutcome>> {
        let settled = settle_one(bet, winning);

        self.store.with_txn(|txn| {
            let Some(updated) = self.registry.apply_outcome_in(
                txn,
                &bet.bet_id,
                settled.status,
                settled.actual_payout,
                Some(snapshot.clone()),
                None,
            )?
            else {
                return Ok(None);
            };

            if settled.status == BetStatus::Won {
                self.wallets.credit_in(
                    txn,
                    &bet.user_id,
                    settled.actual_payout,
                    TransactionKind::BetWon,
                    &format!("Won bet on {}", bet.table_id),
                    Some(EntryReference::Bet(bet.bet_id.clone())),
                )?;
            }

            self.stats.record_outcome_in(
                txn,
                &bet.user_id,
                settled.status == BetStatus::Won,
                bet.wager_amount,
                settled.actual_payout,
            )?;

            Ok(Some(BetOutcome {
                bet_id: updated.bet_id,
                user_id: updated.user_id,
                status: updated.status,
                actual_payout: updated.actual_payout,
            }))
        })
    }

    /// Terminal degradation for a bet that could not be resolved: mark it
    /// cancelled with the failure preserved for audit and refund the wager
    /// so the wallet is not left debited for an unresolved outcome.
    /// Cancelled bets do not touch statistics.
    fn cancel_bet(&self, bet: &Bet, reason: &str) -> CoreResult<Option<BetOutcome>> {
        self.store.with_txn(|txn| {
            let Some(updated) = self.registry.apply_outcome_in(
                txn,
                &bet.bet_id,
                BetStatus::Cancelled,
                0,
                None,
                Some(reason.to_string()),
            )?
            else {
                return Ok(None);
            };

            match self.wallets.credit_in(
                txn,
                &bet.user_id,
                bet.wager_amount,
                TransactionKind::BetRefund,
                &format!("Refund for cancelled bet on {}", bet.table_id),
                Some(EntryReference::Bet(bet.bet_id.clone())),
            ) {
                Ok(_) => {}
                // A vanished wallet must not keep the bet pending forever.
                Err(CoreError::WalletNotFound(user)) => {
                    warn!(bet_id = %bet.bet_id, user = %user, "refund skipped: wallet missing");
                }
                Err(e) => return Err(e),
            }

            Ok(Some(BetOutcome {
                bet_id: updated.bet_id,
                user_id: updated.user_id,
                status: updated.status,
                actual_payout: 0,
            }))
        })
    }

    /// One settlement run per table per process. A second concurrent call
    /// observes the table as already being settled.
    fn claim_run(&self, table_id: &str) -> CoreResult<RunGuard<'_>> {
        use dashmap::mapref::entry::Entry;

        match self.in_flight.entry(table_id.to_string()) {
            Entry::Occupied(_) => Err(CoreError::AlreadySettled(table_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(RunGuard {
                    map: &self.in_flight,
                    table_id: table_id.to_string(),
                })
            }
        }
    }
}

struct RunGuard<'a> {
    map: &'a DashMap<String, ()>,
    table_id: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.table_id);
    }
}

fn count(outcomes: &[BetOutcome], status: BetStatus) -> usize {
    outcomes.iter().filter(|o| o.status == status).count()
}
