//! Card catalog and per-user holdings.
//!
//! A card is a consumable right to wager under a specific scoring rule at a
//! frozen multiplier. The catalog supplies `{card, scoring rule, multiplier}`
//! at placement time; holdings are decremented on wager placement and removed
//! outright when the quantity reaches zero.

use crate::errors::{CoreError, CoreResult, StorageError};
use crate::store::{keys, LedgerStore, LedgerTxn};
use crate::wallet::{to_amount, Amount, EntryReference, TransactionKind, WalletAccessor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub card_id: String,
    pub name: String,
    /// Scoring-rule identifier handed to the oracle at settlement time.
    pub scoring_rule: String,
    pub description: String,
    pub rarity: Rarity,
    /// Payout ratio snapshotted into bets at placement; catalog edits never
    /// touch already-placed bets.
    pub multiplier: f64,
    pub chip_cost: Amount,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acquisition {
    Purchase,
    Grant,
}

/// One user's stock of a card. Quantity is always >= 1; a holding that would
/// drop to zero is deleted instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub user_id: String,
    pub card_id: String,
    pub quantity: u32,
    pub acquired_at: DateTime<Utc>,
    pub acquisition: Acquisition,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub card_id: String,
    pub card_name: String,
    pub cost: Amount,
    pub new_balance: Amount,
}

#[derive(Clone)]
pub struct CardCatalog {
    store: LedgerStore,
    wallets: WalletAccessor,
}

impl CardCatalog {
    pub fn new(store: LedgerStore, wallets: WalletAccessor) -> Self {
        Self { store, wallets }
    }

    /// Install the default deck when the catalog is empty. Returns the
    /// number of cards written.
    pub fn ensure_seeded(&self) -> CoreResult<usize> {
        let existing = self.store.scan_prefix(keys::CARD_PREFIX.as_bytes(), None, 1);
        if !existing.is_empty() {
            return Ok(0);
        }

        let deck = default_deck();
        let count = deck.len();
        self.store.with_txn(|txn| {
            for card in &deck {
                txn.put(&keys::card(&card.card_id), card)?;
            }
            Ok(())
        })?;
        tracing::info!(cards = count, "seeded default card catalog");
        Ok(count)
    }

    pub fn upsert_card(&self, card: &Card) -> CoreResult<()> {
        self.store.with_txn(|txn| txn.put(&keys::card(&card.card_id), card))
    }

    pub fn card(&self, card_id: &str) -> CoreResult<Card> {
        self.store
            .get::<Card>(&keys::card(card_id))?
            .ok_or_else(|| CoreError::CardNotFound(card_id.to_string()))
    }

    /// Active cards, cheapest within each rarity tier first.
    pub fn shop(&self) -> CoreResult<Vec<Card>> {
        let mut cards = self.all_cards()?;
        cards.retain(|c| c.active);
        cards.sort_by(|a, b| a.rarity.cmp(&b.rarity).then(a.chip_cost.cmp(&b.chip_cost)));
        Ok(cards)
    }

    /// Everything the user holds, joined with card metadata. Rarest first.
    pub fn inventory(&self, user_id: &str) -> CoreResult<Vec<(Holding, Card)>> {
        let rows = self
            .store
            .scan_prefix(&keys::holding_scan(user_id), None, usize::MAX);

        let mut out = Vec::with_capacity(rows.len());
        for (_, value) in rows {
            let holding: Holding = serde_json::from_slice(&value).map_err(|e| {
                StorageError::CorruptedData(format!("failed to decode holding: {}", e))
            })?;
            let card = self.card(&holding.card_id)?;
            out.push((holding, card));
        }
        out.sort_by(|a, b| b.1.rarity.cmp(&a.1.rarity));
        Ok(out)
    }

    /// Buy one unit of a card: chip debit, purchase ledger entry, and holding
    /// increment in a single transaction.
    pub fn purchase(&self, user_id: &str, card_id: &str) -> CoreResult<PurchaseReceipt> {
        self.store.with_txn(|txn| {
            let card = txn
                .get::<Card>(&keys::card(card_id))?
                .ok_or_else(|| CoreError::CardNotFound(card_id.to_string()))?;

            if !card.active {
                return Err(CoreError::InvalidState(format!(
                    "card {} is not available for purchase",
                    card_id
                )));
            }

            let entry = self.wallets.debit_in(
                txn,
                user_id,
                card.chip_cost,
                TransactionKind::CardPurchase,
                &format!("Purchased card: {}", card.name),
                Some(EntryReference::Card(card.card_id.clone())),
            )?;

            self.add_holding_in(txn, user_id, card_id, 1, Acquisition::Purchase)?;

            Ok(PurchaseReceipt {
                card_id: card.card_id.clone(),
                card_name: card.name.clone(),
                cost: card.chip_cost,
                new_balance: entry.balance_after,
            })
        })
    }

    /// Hand a user cards without payment (onboarding packs, promotions).
    pub fn grant(&self, user_id: &str, card_id: &str, quantity: u32) -> CoreResult<Holding> {
        if quantity == 0 {
            return Err(CoreError::InvalidAmount);
        }
        // Reject unknown cards up front.
        self.card(card_id)?;
        self.store
            .with_txn(|txn| self.add_holding_in(txn, user_id, card_id, quantity, Acquisition::Grant))
    }

    fn add_holding_in(
        &self,
        txn: &LedgerTxn<'_>,
        user_id: &str,
        card_id: &str,
        quantity: u32,
        acquisition: Acquisition,
    ) -> CoreResult<Holding> {
        let key = keys::holding(user_id, card_id);
        let holding = match txn.get_for_update::<Holding>(&key)? {
            Some(mut existing) => {
                existing.quantity += quantity;
                existing
            }
            None => Holding {
                user_id: user_id.to_string(),
                card_id: card_id.to_string(),
                quantity,
                acquired_at: Utc::now(),
                acquisition,
            },
        };
        txn.put(&key, &holding)?;
        Ok(holding)
    }

    /// Consume one unit of a held card inside the caller's transaction and
    /// return the card metadata. The zero-quantity row is deleted, not kept.
    pub(crate) fn consume_in(
        &self,
        txn: &LedgerTxn<'_>,
        user_id: &str,
        card_id: &str,
    ) -> CoreResult<Card> {
        let card = txn
            .get::<Card>(&keys::card(card_id))?
            .ok_or_else(|| CoreError::CardNotFound(card_id.to_string()))?;

        let key = keys::holding(user_id, card_id);
        let mut holding = txn
            .get_for_update::<Holding>(&key)?
            .ok_or_else(|| CoreError::AssetNotOwned(card_id.to_string()))?;

        if holding.quantity > 1 {
            holding.quantity -= 1;
            txn.put(&key, &holding)?;
        } else {
            txn.delete(&key)?;
        }

        Ok(card)
    }

    fn all_cards(&self) -> CoreResult<Vec<Card>> {
        let rows = self
            .store
            .scan_prefix(keys::CARD_PREFIX.as_bytes(), None, usize::MAX);
        let mut cards = Vec::with_capacity(rows.len());
        for (_, value) in rows {
            cards.push(serde_json::from_slice(&value).map_err(|e| {
                StorageError::CorruptedData(format!("failed to decode card: {}", e))
            })?);
        }
        Ok(cards)
    }
}

/// Starter catalog installed on first boot.
fn default_deck() -> Vec<Card> {
    vec![
        Card {
            card_id: "first-goal".to_string(),
            name: "First Goal".to_string(),
            scoring_rule: "first-goal".to_string(),
            description: "Pays when the match opens with a goal event".to_string(),
            rarity: Rarity::Common,
            multiplier: 1.5,
            chip_cost: to_amount(100.0),
            active: true,
        },
        Card {
            card_id: "both-teams-score".to_string(),
            name: "Both Teams Score".to_string(),
            scoring_rule: "both-teams-score".to_string(),
            description: "Pays when both sides register a goal".to_string(),
            rarity: Rarity::Common,
            multiplier: 1.8,
            chip_cost: to_amount(150.0),
            active: true,
        },
        Card {
            card_id: "clean-sheet".to_string(),
            name: "Clean Sheet".to_string(),
            scoring_rule: "clean-sheet".to_string(),
            description: "Pays when a side concedes nothing".to_string(),
            rarity: Rarity::Rare,
            multiplier: 2.5,
            chip_cost: to_amount(250.0),
            active: true,
        },
        Card {
            card_id: "hat-trick".to_string(),
            name: "Hat Trick".to_string(),
            scoring_rule: "hat-trick".to_string(),
            description: "Pays when one player scores three".to_string(),
            rarity: Rarity::Epic,
            multiplier: 5.0,
            chip_cost: to_amount(400.0),
            active: true,
        },
        Card {
            card_id: "upset-win".to_string(),
            name: "Underdog Victory".to_string(),
            scoring_rule: "upset-win".to_string(),
            description: "Pays when the outsider takes the match".to_string(),
            rarity: Rarity::Legendary,
            multiplier: 10.0,
            chip_cost: to_amount(750.0),
            active: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EconomyConfig;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, WalletAccessor, CardCatalog) {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path(), 3).unwrap();
        let wallets = WalletAccessor::new(
            store.clone(),
            &EconomyConfig {
                initial_chip_grant: 1000.0,
            },
        );
        let catalog = CardCatalog::new(store, wallets.clone());
        catalog.ensure_seeded().unwrap();
        (dir, wallets, catalog)
    }

    #[test]
    fn seeding_is_idempotent() {
        let (_dir, _wallets, catalog) = fixture();
        assert_eq!(catalog.ensure_seeded().unwrap(), 0);
        assert!(!catalog.shop().unwrap().is_empty());
    }

    #[test]
    fn shop_orders_by_rarity_then_cost() {
        let (_dir, _wallets, catalog) = fixture();
        let shop = catalog.shop().unwrap();

        let mut sorted = shop.clone();
        sorted.sort_by(|a, b| a.rarity.cmp(&b.rarity).then(a.chip_cost.cmp(&b.chip_cost)));
        let ids: Vec<&str> = shop.iter().map(|c| c.card_id.as_str()).collect();
        let expected: Vec<&str> = sorted.iter().map(|c| c.card_id.as_str()).collect();
        assert_eq!(ids, expected);
        assert_eq!(shop[0].rarity, Rarity::Common);
    }

    #[test]
    fn purchase_debits_and_adds_holding() {
        let (_dir, wallets, catalog) = fixture();
        wallets.open_wallet("u1").unwrap();

        let receipt = catalog.purchase("u1", "clean-sheet").unwrap();
        assert_eq!(receipt.cost, to_amount(250.0));
        assert_eq!(receipt.new_balance, to_amount(750.0));

        let inventory = catalog.inventory("u1").unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].0.quantity, 1);

        // Second copy stacks on the same row.
        catalog.purchase("u1", "clean-sheet").unwrap();
        let inventory = catalog.inventory("u1").unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].0.quantity, 2);
    }

    #[test]
    fn purchase_without_funds_leaves_nothing_behind() {
        let (_dir, wallets, catalog) = fixture();
        wallets.open_wallet("u1").unwrap();
        wallets
            .debit(
                "u1",
                to_amount(900.0),
                TransactionKind::BetPlaced,
                "drain",
                None,
            )
            .unwrap();

        let err = catalog.purchase("u1", "clean-sheet").unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
        assert!(catalog.inventory("u1").unwrap().is_empty());
        assert_eq!(wallets.wallet("u1").unwrap().chip_balance, to_amount(100.0));
    }

    #[test]
    fn inactive_card_cannot_be_purchased() {
        let (_dir, wallets, catalog) = fixture();
        wallets.open_wallet("u1").unwrap();

        let mut card = catalog.card("hat-trick").unwrap();
        card.active = false;
        catalog.upsert_card(&card).unwrap();

        let err = catalog.purchase("u1", "hat-trick").unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn consume_deletes_zero_quantity_holdings() {
        let (_dir, wallets, catalog) = fixture();
        wallets.open_wallet("u1").unwrap();
        catalog.grant("u1", "first-goal", 2).unwrap();

        let store = catalog.store.clone();
        store
            .with_txn(|txn| catalog.consume_in(txn, "u1", "first-goal").map(|_| ()))
            .unwrap();
        assert_eq!(catalog.inventory("u1").unwrap()[0].0.quantity, 1);

        store
            .with_txn(|txn| catalog.consume_in(txn, "u1", "first-goal").map(|_| ()))
            .unwrap();
        assert!(catalog.inventory("u1").unwrap().is_empty());

        let err = store
            .with_txn(|txn| catalog.consume_in(txn, "u1", "first-goal").map(|_| ()))
            .unwrap_err();
        assert!(matches!(err, CoreError::AssetNotOwned(_)));
    }

    #[test]
    fn unknown_card_is_not_found() {
        let (_dir, _wallets, catalog) = fixture();
        assert!(matches!(
            catalog.card("no-such-card").unwrap_err(),
            CoreError::CardNotFound(_)
        ));
        assert!(matches!(
            catalog.grant("u1", "no-such-card", 1).unwrap_err(),
            CoreError::CardNotFound(_)
        ));
    }
}
