//! cardroom - chip-betting ledger and settlement engine.
//!
//! Users spend chips on cards, wager chips on the outcomes of external
//! matches, and have wagers settled against a scoring oracle. The core is
//! the ledger and settlement machinery: every chip movement is atomic,
//! auditable, and exactly-once even when the oracle fails mid-settlement.
//!
//! Layering, leaves first:
//!
//! - [`store`]: transactional key-value state (RocksDB optimistic
//!   transactions) — the only synchronization boundary in the system.
//! - [`wallet`]: chip balances with an append-only, replayable ledger.
//! - [`catalog`]: purchasable cards and consumable holdings.
//! - [`bets`]: betting tables and the wager lifecycle.
//! - [`settlement`]: per-table batch resolution against the oracle.
//! - [`stats`]: derived per-user rollups, rebuildable from history.
//! - [`api`]: thin HTTP presentation adapter over the library.

pub mod api;
pub mod bets;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod oracle;
pub mod settlement;
pub mod stats;
pub mod store;
pub mod wallet;

pub use bets::{settle_one, Bet, BetRegistry, BetStatus, BettingTable, TableStatus};
pub use catalog::{Card, CardCatalog, Holding};
pub use config::{ConfigLoader, CoreConfig};
pub use errors::{CoreError, CoreResult};
pub use oracle::{HttpOracle, OracleResponse, ScoringOracle};
pub use settlement::{SettlementEngine, SettlementReport};
pub use stats::{StatsAggregator, UserStatistics};
pub use store::LedgerStore;
pub use wallet::{from_amount, to_amount, Amount, LedgerEntry, Wallet, WalletAccessor};
