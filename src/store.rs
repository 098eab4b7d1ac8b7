//! Ledger store backed by RocksDB optimistic transactions.
//!
//! Every multi-step mutation in the core (wager placement, single-bet
//! settlement, chip credit/debit) runs inside one optimistic transaction.
//! Reads taken with `get_for_update` join the transaction's conflict set, so
//! a read-then-write on a wallet row cannot interleave with another writer:
//! the loser fails at commit and is re-run up to the configured budget before
//! `ConcurrencyConflict` surfaces to the caller.
//!
//! Records are JSON documents under prefixed keys. Index keys embed an
//! inverted, zero-padded sequence so a forward prefix scan yields
//! newest-first ordering; pagination cursors are the hex-encoded last key.

use crate::errors::{CoreError, CoreResult, StorageError};
use rocksdb::{Direction, IteratorMode, OptimisticTransactionDB, Options, Transaction};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<OptimisticTransactionDB>,
    retry_budget: u32,
}

impl LedgerStore {
    pub fn open<P: AsRef<Path>>(path: P, retry_budget: u32) -> CoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = OptimisticTransactionDB::open(&opts, path)
            .map_err(|e| StorageError::OpenFailed(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            retry_budget: retry_budget.max(1),
        })
    }

    /// Run `op` inside an optimistic transaction and commit it.
    ///
    /// Transient commit conflicts re-run the closure against a fresh
    /// transaction; business errors abort immediately and are never retried.
    pub fn with_txn<T>(&self, op: impl Fn(&LedgerTxn<'_>) -> CoreResult<T>) -> CoreResult<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let txn = LedgerTxn {
                inner: self.db.transaction(),
            };

            let outcome = match op(&txn) {
                Ok(value) => txn.commit().map(|_| value),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry_budget => {
                    tracing::debug!(attempt, "ledger transaction conflicted, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Plain point read outside any transaction.
    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> CoreResult<Option<T>> {
        match self
            .db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?
        {
            Some(bytes) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Forward prefix scan, resuming strictly after `after` when given.
    /// Returns at most `limit` `(key, value)` pairs that carry the prefix.
    pub fn scan_prefix(
        &self,
        prefix: &[u8],
        after: Option<&[u8]>,
        limit: usize,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let start = match after {
            Some(cursor) => {
                let mut s = cursor.to_vec();
                s.push(0);
                s
            }
            None => prefix.to_vec(),
        };

        let mut out = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(&start, Direction::Forward))
        {
            let Ok((key, value)) = item else { break };
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
            if out.len() >= limit {
                break;
            }
        }
        out
    }

    #[cfg(test)]
    fn begin(&self) -> LedgerTxn<'_> {
        LedgerTxn {
            inner: self.db.transaction(),
        }
    }
}

/// A single optimistic transaction with typed JSON access.
pub struct LedgerTxn<'db> {
    inner: Transaction<'db, OptimisticTransactionDB>,
}

impl<'db> LedgerTxn<'db> {
    fn commit(self) -> CoreResult<()> {
        self.inner.commit().map_err(CoreError::from)
    }

    /// Snapshot read that does not join the conflict set.
    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> CoreResult<Option<T>> {
        match self
            .inner
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?
        {
            Some(bytes) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Read with write intent: a concurrent mutation of this key makes the
    /// enclosing transaction fail at commit.
    pub fn get_for_update<T: DeserializeOwned>(&self, key: &[u8]) -> CoreResult<Option<T>> {
        match self.inner.get_for_update(key, true).map_err(CoreError::from)? {
            Some(bytes) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&self, key: &[u8], value: &T) -> CoreResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| {
            StorageError::WriteFailed(format!(
                "failed to encode record {}: {}",
                String::from_utf8_lossy(key),
                e
            ))
        })?;
        self.inner.put(key, bytes).map_err(CoreError::from)
    }

    /// Write a bare marker value (index entries carry their data in the key).
    pub fn put_marker(&self, key: &[u8]) -> CoreResult<()> {
        self.inner.put(key, []).map_err(CoreError::from)
    }

    pub fn delete(&self, key: &[u8]) -> CoreResult<()> {
        self.inner.delete(key).map_err(CoreError::from)
    }
}

fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> CoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        StorageError::CorruptedData(format!(
            "failed to decode record {}: {}",
            String::from_utf8_lossy(key),
            e
        ))
        .into()
    })
}

/// Key layout for all record families in the store.
///
/// Listing prefixes are disjoint from record prefixes (`table:id:` vs
/// `table:match:`) so scans never cross families.
pub mod keys {
    /// Largest printable sequence first: inverted, zero-padded to 20 digits
    /// so lexicographic order equals newest-first numeric order.
    pub fn inverted_seq(seq: u64) -> String {
        format!("{:020}", u64::MAX - seq)
    }

    pub const WALLET_PREFIX: &str = "wallet:";
    pub const LEDGER_PREFIX: &str = "ledger:";
    pub const CARD_PREFIX: &str = "card:";
    pub const HOLDING_PREFIX: &str = "holding:";
    pub const TABLE_PREFIX: &str = "table:id:";
    pub const TABLE_MATCH_PREFIX: &str = "table:match:";
    pub const BET_PREFIX: &str = "bet:id:";
    pub const BET_TABLE_PREFIX: &str = "bet:table:";
    pub const BET_USER_PREFIX: &str = "bet:user:";
    pub const STATS_PREFIX: &str = "stats:";

    pub fn wallet(user_id: &str) -> Vec<u8> {
        format!("{}{}", WALLET_PREFIX, user_id).into_bytes()
    }

    pub fn ledger_entry(user_id: &str, seq: u64) -> Vec<u8> {
        format!("{}{}:{}", LEDGER_PREFIX, user_id, inverted_seq(seq)).into_bytes()
    }

    pub fn ledger_scan(user_id: &str) -> Vec<u8> {
        format!("{}{}:", LEDGER_PREFIX, user_id).into_bytes()
    }

    pub fn card(card_id: &str) -> Vec<u8> {
        format!("{}{}", CARD_PREFIX, card_id).into_bytes()
    }

    pub fn holding(user_id: &str, card_id: &str) -> Vec<u8> {
        format!("{}{}:{}", HOLDING_PREFIX, user_id, card_id).into_bytes()
    }

    pub fn holding_scan(user_id: &str) -> Vec<u8> {
        format!("{}{}:", HOLDING_PREFIX, user_id).into_bytes()
    }

    pub fn table(table_id: &str) -> Vec<u8> {
        format!("{}{}", TABLE_PREFIX, table_id).into_bytes()
    }

    pub fn table_by_match(match_id: &str) -> Vec<u8> {
        format!("{}{}", TABLE_MATCH_PREFIX, match_id).into_bytes()
    }

    pub fn bet(bet_id: &str) -> Vec<u8> {
        format!("{}{}", BET_PREFIX, bet_id).into_bytes()
    }

    pub fn bet_table_index(table_id: &str, bet_id: &str) -> Vec<u8> {
        format!("{}{}:{}", BET_TABLE_PREFIX, table_id, bet_id).into_bytes()
    }

    pub fn bet_table_scan(table_id: &str) -> Vec<u8> {
        format!("{}{}:", BET_TABLE_PREFIX, table_id).into_bytes()
    }

    pub fn bet_user_index(user_id: &str, seq: u64, bet_id: &str) -> Vec<u8> {
        format!(
            "{}{}:{}:{}",
            BET_USER_PREFIX,
            user_id,
            inverted_seq(seq),
            bet_id
        )
        .into_bytes()
    }

    pub fn bet_user_scan(user_id: &str) -> Vec<u8> {
        format!("{}{}:", BET_USER_PREFIX, user_id).into_bytes()
    }

    pub fn stats(user_id: &str) -> Vec<u8> {
        format!("{}{}", STATS_PREFIX, user_id).into_bytes()
    }

    /// Trailing id segment of an index key (`prefix...:id`).
    pub fn id_suffix(key: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(key).ok()?;
        text.rsplit(':').next().map(|s| s.to_string())
    }
}
