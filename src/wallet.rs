//! Chip wallets and the append-only transaction ledger.
//!
//! All amounts are fixed-point integers (100 units per chip) so ledger
//! arithmetic is exact; floats appear only at the API boundary and for
//! payout multipliers. Every balance change writes the wallet row and an
//! immutable `LedgerEntry` with matching before/after balances in one
//! transaction, which keeps `chip_balance == Σ entry.amount` replayable at
//! any time.

use crate::config::EconomyConfig;
use crate::errors::{CoreError, CoreResult};
use crate::store::{keys, LedgerStore, LedgerTxn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed-point chip amount: 1 chip = 100 units.
pub type Amount = i64;

pub const AMOUNT_SCALE: i64 = 100;

#[inline]
pub fn to_amount(chips: f64) -> Amount {
    (chips * AMOUNT_SCALE as f64).round() as Amount
}

#[inline]
pub fn from_amount(amount: Amount) -> f64 {
    amount as f64 / AMOUNT_SCALE as f64
}

/// Payout for a wager at a snapshotted multiplier, rounded to the nearest
/// fixed-point unit. The single place this product is computed.
#[inline]
pub fn payout_for(wager: Amount, multiplier: f64) -> Amount {
    (wager as f64 * multiplier).round() as Amount
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: String,
    pub chip_balance: Amount,
    /// Monotone accumulators; never decremented.
    pub total_earned: Amount,
    pub total_spent: Amount,
    /// Count of ledger entries written; doubles as the next entry sequence.
    pub entry_seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    BetPlaced,
    BetWon,
    BetRefund,
    CardPurchase,
}

/// What caused a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntryReference {
    Bet(String),
    Card(String),
    System,
}

/// Append-only ledger record. Never mutated or deleted after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub user_id: String,
    pub seq: u64,
    /// Signed: credits positive, debits negative.
    pub amount: Amount,
    pub kind: TransactionKind,
    pub description: String,
    pub balance_before: Amount,
    pub balance_after: Amount,
    pub reference: Option<EntryReference>,
    pub created_at: DateTime<Utc>,
}

/// Result of replaying a wallet's ledger entries against its balance.
#[derive(Debug, Clone, Serialize)]
pub struct WalletAudit {
    pub user_id: String,
    pub entries: u64,
    pub replayed_balance: Amount,
    pub recorded_balance: Amount,
    pub consistent: bool,
}

/// Serialized access path for every wallet mutation. No other component
/// writes wallet rows or ledger entries directly.
#[derive(Clone)]
pub struct WalletAccessor {
    store: LedgerStore,
    initial_grant: Amount,
}

impl WalletAccessor {
    pub fn new(store: LedgerStore, economy: &EconomyConfig) -> Self {
        Self {
            store,
            initial_grant: to_amount(economy.initial_chip_grant),
        }
    }

    /// Create the wallet with the configured initial grant, recording the
    /// grant as a deposit. Returns the existing wallet unchanged when one is
    /// already open (idempotent onboarding).
    pub fn open_wallet(&self, user_id: &str) -> CoreResult<Wallet> {
        self.store.with_txn(|txn| {
            let key = keys::wallet(user_id);
            if let Some(existing) = txn.get_for_update::<Wallet>(&key)? {
                return Ok(existing);
            }

            let now = Utc::now();
            let mut wallet = Wallet {
                user_id: user_id.to_string(),
                chip_balance: 0,
                total_earned: 0,
                total_spent: 0,
                entry_seq: 0,
                created_at: now,
                updated_at: now,
            };

            if self.initial_grant > 0 {
                let entry = build_entry(
                    &mut wallet,
                    self.initial_grant,
                    TransactionKind::Deposit,
                    "Initial signup bonus",
                    Some(EntryReference::System),
                );
                wallet.total_earned += self.initial_grant;
                txn.put(&keys::ledger_entry(user_id, entry.seq), &entry)?;
            }

            txn.put(&key, &wallet)?;
            tracing::info!(user_id, grant = wallet.chip_balance, "wallet opened");
            Ok(wallet)
        })
    }

    pub fn wallet(&self, user_id: &str) -> CoreResult<Wallet> {
        self.store
            .get::<Wallet>(&keys::wallet(user_id))?
            .ok_or_else(|| CoreError::WalletNotFound(user_id.to_string()))
    }

    /// Credit in a self-contained transaction.
    pub fn credit(
        &self,
        user_id: &str,
        amount: Amount,
        kind: TransactionKind,
        description: &str,
        reference: Option<EntryReference>,
    ) -> CoreResult<LedgerEntry> {
        self.store
            .with_txn(|txn| self.credit_in(txn, user_id, amount, kind, description, reference.clone()))
    }

    /// Debit in a self-contained transaction.
    pub fn debit(
        &self,
        user_id: &str,
        amount: Amount,
        kind: TransactionKind,
        description: &str,
        reference: Option<EntryReference>,
    ) -> CoreResult<LedgerEntry> {
        self.store
            .with_txn(|txn| self.debit_in(txn, user_id, amount, kind, description, reference.clone()))
    }

    /// Credit inside a caller-supplied transaction so multi-step operations
    /// (wager placement, settlement) share one atomic unit.
    pub fn credit_in(
        &self,
        txn: &LedgerTxn<'_>,
        user_id: &str,
        amount: Amount,
        kind: TransactionKind,
        description: &str,
        reference: Option<EntryReference>,
    ) -> CoreResult<LedgerEntry> {
        if amount <= 0 {
            return Err(CoreError::InvalidAmount);
        }

        let key = keys::wallet(user_id);
        let mut wallet = txn
            .get_for_update::<Wallet>(&key)?
            .ok_or_else(|| CoreError::WalletNotFound(user_id.to_string()))?;

        let entry = build_entry(&mut wallet, amount, kind, description, reference);
        wallet.total_earned += amount;

        txn.put(&keys::ledger_entry(user_id, entry.seq), &entry)?;
        txn.put(&key, &wallet)?;
        Ok(entry)
    }

    /// Debit inside a caller-supplied transaction. Requires
    /// `balance >= amount`; the balance can never go negative.
    pub fn debit_in(
        &self,
        txn: &LedgerTxn<'_>,
        user_id: &str,
        amount: Amount,
        kind: TransactionKind,
        description: &str,
        reference: Option<EntryReference>,
    ) -> CoreResult<LedgerEntry> {
        if amount <= 0 {
            return Err(CoreError::InvalidAmount);
        }

        let key = keys::wallet(user_id);
        let mut wallet = txn
            .get_for_update::<Wallet>(&key)?
            .ok_or_else(|| CoreError::WalletNotFound(user_id.to_string()))?;

        if wallet.chip_balance < amount {
            return Err(CoreError::InsufficientFunds {
                balance: from_amount(wallet.chip_balance),
                requested: from_amount(amount),
            });
        }

        let entry = build_entry(&mut wallet, -amount, kind, description, reference);
        wallet.total_spent += amount;

        txn.put(&keys::ledger_entry(user_id, entry.seq), &entry)?;
        txn.put(&key, &wallet)?;
        Ok(entry)
    }

    /// Newest-first transaction history with opaque cursor pagination and an
    /// optional kind filter.
    pub fn history(
        &self,
        user_id: &str,
        kind: Option<TransactionKind>,
        cursor: Option<&str>,
        limit: usize,
    ) -> CoreResult<(Vec<LedgerEntry>, Option<String>)> {
        let cursor_bytes = decode_cursor(cursor)?;
        let prefix = keys::ledger_scan(user_id);

        let mut entries = Vec::new();
        let mut next_cursor = None;
        let mut after = cursor_bytes;

        // Filtered scan: keep fetching pages until the limit fills or the
        // prefix is exhausted.
        loop {
            let rows = self.store.scan_prefix(&prefix, after.as_deref(), limit.max(1));
            if rows.is_empty() {
                break;
            }

            let page_len = rows.len();
            for (key, value) in rows {
                let entry: LedgerEntry = serde_json::from_slice(&value).map_err(|e| {
                    crate::errors::StorageError::CorruptedData(format!(
                        "failed to decode ledger entry: {}",
                        e
                    ))
                })?;
                after = Some(key.clone());

                if kind.map_or(true, |k| entry.kind == k) {
                    entries.push(entry);
                    next_cursor = Some(hex::encode(&key));
                    if entries.len() >= limit {
                        return Ok((entries, next_cursor));
                    }
                }
            }

            if page_len < limit.max(1) {
                break;
            }
        }

        Ok((entries, None))
    }

    /// Replay the full ledger and compare against the stored balance.
    /// The audit invariant: every balance equals the sum of its entry deltas.
    pub fn audit(&self, user_id: &str) -> CoreResult<WalletAudit> {
        let wallet = self.wallet(user_id)?;

        let mut replayed: Amount = 0;
        let mut entries: u64 = 0;
        let prefix = keys::ledger_scan(user_id);
        let mut after: Option<Vec<u8>> = None;

        loop {
            let rows = self.store.scan_prefix(&prefix, after.as_deref(), 256);
            if rows.is_empty() {
                break;
            }
            for (key, value) in &rows {
                let entry: LedgerEntry = serde_json::from_slice(value).map_err(|e| {
                    crate::errors::StorageError::CorruptedData(format!(
                        "failed to decode ledger entry: {}",
                        e
                    ))
                })?;
                replayed += entry.amount;
                entries += 1;
                after = Some(key.clone());
            }
            if rows.len() < 256 {
                break;
            }
        }

        Ok(WalletAudit {
            user_id: user_id.to_string(),
            entries,
            replayed_balance: replayed,
            recorded_balance: wallet.chip_balance,
            consistent: replayed == wallet.chip_balance,
        })
    }
}

/// Advance the wallet by `delta` and produce the matching ledger entry.
/// `balance_after = balance_before + amount` by construction.
fn build_entry(
    wallet: &mut Wallet,
    delta: Amount,
    kind: TransactionKind,
    description: &str,
    reference: Option<EntryReference>,
) -> LedgerEntry {
    let before = wallet.chip_balance;
    wallet.chip_balance = before + delta;
    wallet.entry_seq += 1;
    wallet.updated_at = Utc::now();

    LedgerEntry {
        entry_id: Uuid::new_v4().to_string(),
        user_id: wallet.user_id.clone(),
        seq: wallet.entry_seq,
        amount: delta,
        kind,
        description: description.to_string(),
        balance_before: before,
        balance_after: wallet.chip_balance,
        reference,
        created_at: wallet.updated_at,
    }
}

pub(crate) fn decode_cursor(cursor: Option<&str>) -> CoreResult<Option<Vec<u8>>> {
    match cursor {
        Some(c) => hex::decode(c)
            .map(Some)
            .map_err(|e| {
                crate::errors::StorageError::CorruptedData(format!("invalid cursor hex: {}", e))
                    .into()
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EconomyConfig;
    use tempfile::TempDir;

    fn accessor() -> (TempDir, WalletAccessor) {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path(), 3).unwrap();
        let economy = EconomyConfig {
            initial_chip_grant: 1000.0,
        };
        (dir, WalletAccessor::new(store, &economy))
    }

    #[test]
    fn open_wallet_grants_initial_chips() {
        let (_dir, wallets) = accessor();

        let wallet = wallets.open_wallet("u1").unwrap();
        assert_eq!(wallet.chip_balance, to_amount(1000.0));
        assert_eq!(wallet.total_earned, to_amount(1000.0));

        let (history, _) = wallets.history("u1", None, None, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Deposit);
        assert_eq!(history[0].balance_before, 0);
        assert_eq!(history[0].balance_after, to_amount(1000.0));
    }

    #[test]
    fn open_wallet_is_idempotent() {
        let (_dir, wallets) = accessor();

        wallets.open_wallet("u1").unwrap();
        wallets
            .debit("u1", to_amount(100.0), TransactionKind::CardPurchase, "card", None)
            .unwrap();

        let again = wallets.open_wallet("u1").unwrap();
        assert_eq!(again.chip_balance, to_amount(900.0));
    }

    #[test]
    fn debit_and_credit_chain_balances() {
        let (_dir, wallets) = accessor();
        wallets.open_wallet("u1").unwrap();

        let debit = wallets
            .debit("u1", to_amount(250.0), TransactionKind::BetPlaced, "bet", None)
            .unwrap();
        assert_eq!(debit.amount, -to_amount(250.0));
        assert_eq!(debit.balance_before, to_amount(1000.0));
        assert_eq!(debit.balance_after, to_amount(750.0));

        let credit = wallets
            .credit("u1", to_amount(500.0), TransactionKind::BetWon, "won", None)
            .unwrap();
        assert_eq!(credit.balance_before, to_amount(750.0));
        assert_eq!(credit.balance_after, to_amount(1250.0));

        let wallet = wallets.wallet("u1").unwrap();
        assert_eq!(wallet.chip_balance, to_amount(1250.0));
        assert_eq!(wallet.total_spent, to_amount(250.0));
        assert_eq!(wallet.total_earned, to_amount(1500.0));
    }

    #[test]
    fn debit_rejects_insufficient_funds() {
        let (_dir, wallets) = accessor();
        wallets.open_wallet("u1").unwrap();

        let err = wallets
            .debit("u1", to_amount(1001.0), TransactionKind::BetPlaced, "bet", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));

        // Nothing applied.
        let wallet = wallets.wallet("u1").unwrap();
        assert_eq!(wallet.chip_balance, to_amount(1000.0));
        assert_eq!(wallet.entry_seq, 1);
    }

    #[test]
    fn non_positive_amounts_are_programming_errors() {
        let (_dir, wallets) = accessor();
        wallets.open_wallet("u1").unwrap();

        for amount in [0, -to_amount(5.0)] {
            let err = wallets
                .debit("u1", amount, TransactionKind::BetPlaced, "bet", None)
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidAmount));

            let err = wallets
                .credit("u1", amount, TransactionKind::Deposit, "dep", None)
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidAmount));
        }
    }

    #[test]
    fn missing_wallet_is_reported() {
        let (_dir, wallets) = accessor();
        let err = wallets
            .credit("ghost", to_amount(1.0), TransactionKind::Deposit, "dep", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::WalletNotFound(_)));
    }

    #[test]
    fn audit_replays_to_recorded_balance() {
        let (_dir, wallets) = accessor();
        wallets.open_wallet("u1").unwrap();
        wallets
            .debit("u1", to_amount(300.0), TransactionKind::BetPlaced, "bet", None)
            .unwrap();
        wallets
            .credit("u1", to_amount(600.0), TransactionKind::BetWon, "won", None)
            .unwrap();
        wallets
            .debit("u1", to_amount(50.0), TransactionKind::CardPurchase, "card", None)
            .unwrap();

        let audit = wallets.audit("u1").unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.entries, 4);
        assert_eq!(audit.replayed_balance, to_amount(1250.0));
    }

    #[test]
    fn history_filters_by_kind() {
        let (_dir, wallets) = accessor();
        wallets.open_wallet("u1").unwrap();
        wallets
            .debit("u1", to_amount(10.0), TransactionKind::BetPlaced, "bet 1", None)
            .unwrap();
        wallets
            .debit("u1", to_amount(20.0), TransactionKind::BetPlaced, "bet 2", None)
            .unwrap();

        let (bets, _) = wallets
            .history("u1", Some(TransactionKind::BetPlaced), None, 10)
            .unwrap();
        assert_eq!(bets.len(), 2);
        // Newest first.
        assert_eq!(bets[0].description, "bet 2");
    }

    #[test]
    fn concurrent_debits_cannot_both_drain_the_wallet() {
        let (_dir, wallets) = accessor();
        wallets.open_wallet("u1").unwrap();
        // Balance 1000; two concurrent debits of 600 can afford only one.
        let w1 = wallets.clone();
        let w2 = wallets.clone();

        let h1 = std::thread::spawn(move || {
            w1.debit("u1", to_amount(600.0), TransactionKind::BetPlaced, "a", None)
        });
        let h2 = std::thread::spawn(move || {
            w2.debit("u1", to_amount(600.0), TransactionKind::BetPlaced, "b", None)
        });

        let results = [h1.join().unwrap(), h2.join().unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let wallet = wallets.wallet("u1").unwrap();
        assert_eq!(wallet.chip_balance, to_amount(400.0));
        assert!(wallets.audit("u1").unwrap().consistent);
    }
}
