//! In-memory book state for a single symbol
//!
//! Uses `BTreeMap` keyed by scaled price for deterministic sorted
//! iteration; bids iterate descending, asks ascending, so `top(n)` is
//! O(n) off the map ends rather than a full sort.
//!
//! Diff semantics: a delta quantity is the new absolute level size, not
//! an increment. `quantity > 0` replaces the level, `quantity == 0`
//! removes it. Levels with zero or negative quantity are never resident.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::events::{BookUpdate, DiffEvent, PriceLevel, ProductType, Side, Snapshot};
use crate::events::compute_checksum;
use crate::fixed_point::ScaledInt;
use crate::sync::SyncError;

/// Ordered price → quantity store for one side of a book.
#[derive(Debug, Clone)]
pub struct PriceLevelStore {
    side: Side,
    levels: BTreeMap<ScaledInt, ScaledInt>,
}

impl PriceLevelStore {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Insert or replace the level at `price`.
    ///
    /// Quantities must be positive; non-positive input is dropped so the
    /// store invariant holds even against a misbehaving caller.
    pub fn upsert(&mut self, price: ScaledInt, quantity: ScaledInt) {
        if quantity <= 0 {
            return;
        }
        self.levels.insert(price, quantity);
    }

    /// Remove the level at `price`. No-op if absent.
    pub fn remove(&mut self, price: ScaledInt) {
        self.levels.remove(&price);
    }

    /// Up to `n` levels in store order (best first).
    pub fn top(&self, n: usize) -> Vec<PriceLevel> {
        let to_level = |(&price, &quantity): (&ScaledInt, &ScaledInt)| PriceLevel { price, quantity };
        match self.side {
            Side::Bid => self.levels.iter().rev().take(n).map(to_level).collect(),
            Side::Ask => self.levels.iter().take(n).map(to_level).collect(),
        }
    }

    /// Best level, if any (highest bid / lowest ask).
    pub fn best(&self) -> Option<PriceLevel> {
        let entry = match self.side {
            Side::Bid => self.levels.iter().next_back(),
            Side::Ask => self.levels.iter().next(),
        };
        entry.map(|(&price, &quantity)| PriceLevel { price, quantity })
    }

    /// Quantity resident at `price`, if the level exists.
    pub fn get(&self, price: ScaledInt) -> Option<ScaledInt> {
        self.levels.get(&price).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }
}

/// Synchronization metadata for one symbol's book.
///
/// Mutated only by the symbol's owning worker; everyone else reads the
/// atomic mirror in [`crate::sync::SymbolStatus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolSyncState {
    pub last_applied_update_id: u64,
    pub initialized: bool,
}

/// One symbol's order book: both sides plus synchronization metadata.
#[derive(Debug, Clone)]
pub struct SymbolBook {
    symbol: String,
    bids: PriceLevelStore,
    asks: PriceLevelStore,
    sync: SymbolSyncState,
}

impl SymbolBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: PriceLevelStore::new(Side::Bid),
            asks: PriceLevelStore::new(Side::Ask),
            sync: SymbolSyncState::default(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn sync(&self) -> &SymbolSyncState {
        &self.sync
    }

    pub fn bids(&self) -> &PriceLevelStore {
        &self.bids
    }

    pub fn asks(&self) -> &PriceLevelStore {
        &self.asks
    }

    /// Replace all book state with the snapshot's levels.
    ///
    /// Does not mark the book initialized; that happens when the anchor
    /// event is applied on top (see [`crate::sync::synchronize`]).
    pub fn load_snapshot(&mut self, snapshot: &Snapshot) {
        self.bids.clear();
        self.asks.clear();
        apply_deltas(&mut self.bids, &snapshot.bids);
        apply_deltas(&mut self.asks, &snapshot.asks);
        self.sync.last_applied_update_id = snapshot.last_update_id;
        self.sync.initialized = false;
    }

    /// Apply the first event after a snapshot without a sequence check.
    ///
    /// Valid only for an event overlapping the snapshot's
    /// `last_update_id` (`U <= L <= u`); the caller establishes that.
    /// Marks the book initialized.
    pub fn apply_anchor(&mut self, event: &DiffEvent) {
        apply_deltas(&mut self.bids, &event.bid_deltas);
        apply_deltas(&mut self.asks, &event.ask_deltas);
        self.sync.last_applied_update_id = event.final_update_id;
        self.sync.initialized = true;
    }

    /// Steady-state apply: requires `pu` to match the last applied `u`.
    ///
    /// On a sequence gap the book is invalidated and the caller must
    /// resynchronize before applying further events.
    pub fn apply_event(&mut self, event: &DiffEvent) -> Result<(), SyncError> {
        if event.previous_final_update_id != self.sync.last_applied_update_id {
            self.sync.initialized = false;
            return Err(SyncError::OutOfSync {
                expected: self.sync.last_applied_update_id,
                actual: event.previous_final_update_id,
            });
        }

        apply_deltas(&mut self.bids, &event.bid_deltas);
        apply_deltas(&mut self.asks, &event.ask_deltas);
        self.sync.last_applied_update_id = event.final_update_id;
        Ok(())
    }

    /// Build a top-`depth` projection of the current book state.
    pub fn snapshot_view(
        &self,
        depth: usize,
        product_type: ProductType,
        snapshot_time: i64,
    ) -> BookUpdate {
        let bids = self.bids.top(depth);
        let asks = self.asks.top(depth);
        let checksum = compute_checksum(&bids, &asks, self.sync.last_applied_update_id);

        BookUpdate {
            event_id: Uuid::now_v7(),
            symbol: self.symbol.clone(),
            product_type,
            bids,
            asks,
            last_update_id: self.sync.last_applied_update_id,
            snapshot_time,
            checksum,
        }
    }
}

/// Uniform delta rule: positive quantity upserts, zero removes.
fn apply_deltas(store: &mut PriceLevelStore, deltas: &[PriceLevel]) {
    for level in deltas {
        if level.quantity > 0 {
            store.upsert(level.price, level.quantity);
        } else {
            store.remove(level.price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: ScaledInt, quantity: ScaledInt) -> PriceLevel {
        PriceLevel { price, quantity }
    }

    fn diff(symbol: &str, first: u64, last: u64, prev: u64) -> DiffEvent {
        DiffEvent {
            symbol: symbol.to_string(),
            event_time: 0,
            transaction_time: 0,
            first_update_id: first,
            final_update_id: last,
            previous_final_update_id: prev,
            bid_deltas: vec![],
            ask_deltas: vec![],
        }
    }

    #[test]
    fn test_upsert_replaces_not_adds() {
        let mut store = PriceLevelStore::new(Side::Bid);
        store.upsert(5_000_000, 100);
        store.upsert(5_000_000, 250);

        assert_eq!(store.get(5_000_000), Some(250));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_upsert_rejects_non_positive() {
        let mut store = PriceLevelStore::new(Side::Ask);
        store.upsert(5_000_000, 0);
        store.upsert(5_000_100, -5);

        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut store = PriceLevelStore::new(Side::Bid);
        store.upsert(5_000_000, 100);

        store.remove(5_000_000);
        store.remove(5_000_000); // absent, must not raise
        store.remove(4_999_999); // never existed

        assert!(store.is_empty());
    }

    #[test]
    fn test_bid_store_descending_order() {
        let mut store = PriceLevelStore::new(Side::Bid);
        store.upsert(4_990_000, 1);
        store.upsert(5_000_000, 2);
        store.upsert(4_995_000, 3);

        let top = store.top(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].price, 5_000_000);
        assert_eq!(top[1].price, 4_995_000);
        assert_eq!(store.best().unwrap().price, 5_000_000);
    }

    #[test]
    fn test_ask_store_ascending_order() {
        let mut store = PriceLevelStore::new(Side::Ask);
        store.upsert(5_010_000, 1);
        store.upsert(5_005_000, 2);
        store.upsert(5_020_000, 3);

        let top = store.top(2);
        assert_eq!(top[0].price, 5_005_000);
        assert_eq!(top[1].price, 5_010_000);
        assert_eq!(store.best().unwrap().price, 5_005_000);
    }

    #[test]
    fn test_top_with_fewer_levels_than_requested() {
        let mut store = PriceLevelStore::new(Side::Ask);
        store.upsert(5_005_000, 2);

        assert_eq!(store.top(10).len(), 1);
    }

    #[test]
    fn test_load_snapshot_replaces_partial_state() {
        let mut book = SymbolBook::new("BTCUSDT");
        book.apply_anchor(&DiffEvent {
            bid_deltas: vec![level(4_000_000, 5)],
            ..diff("BTCUSDT", 1, 2, 0)
        });

        let snapshot = Snapshot {
            symbol: "BTCUSDT".to_string(),
            last_update_id: 103,
            message_time: 0,
            transaction_time: 0,
            bids: vec![level(5_000_000, 10)],
            asks: vec![level(5_000_100, 20)],
        };
        book.load_snapshot(&snapshot);

        assert_eq!(book.bids().get(4_000_000), None);
        assert_eq!(book.bids().get(5_000_000), Some(10));
        assert_eq!(book.asks().get(5_000_100), Some(20));
        assert_eq!(book.sync().last_applied_update_id, 103);
        assert!(!book.sync().initialized);
    }

    #[test]
    fn test_apply_event_in_sequence() {
        let mut book = SymbolBook::new("BTCUSDT");
        book.apply_anchor(&diff("BTCUSDT", 100, 105, 99));

        let event = DiffEvent {
            bid_deltas: vec![level(5_000_000, 7)],
            ..diff("BTCUSDT", 106, 110, 105)
        };
        book.apply_event(&event).unwrap();

        assert_eq!(book.sync().last_applied_update_id, 110);
        assert!(book.sync().initialized);
        assert_eq!(book.bids().get(5_000_000), Some(7));
    }

    #[test]
    fn test_apply_event_gap_invalidates() {
        let mut book = SymbolBook::new("BTCUSDT");
        book.apply_anchor(&diff("BTCUSDT", 110, 115, 109));

        let stale = diff("BTCUSDT", 106, 112, 110);
        let err = book.apply_event(&stale).unwrap_err();

        assert_eq!(
            err,
            SyncError::OutOfSync {
                expected: 115,
                actual: 110
            }
        );
        assert!(!book.sync().initialized);
    }

    #[test]
    fn test_zero_quantity_delta_removes_level() {
        let mut book = SymbolBook::new("BTCUSDT");
        book.apply_anchor(&DiffEvent {
            bid_deltas: vec![level(5_000_000, 10)],
            ..diff("BTCUSDT", 1, 5, 0)
        });
        assert_eq!(book.bids().get(5_000_000), Some(10));

        let removal = DiffEvent {
            bid_deltas: vec![level(5_000_000, 0)],
            ..diff("BTCUSDT", 6, 8, 5)
        };
        book.apply_event(&removal).unwrap();

        assert_eq!(book.bids().get(5_000_000), None);
    }

    #[test]
    fn test_snapshot_view_projection() {
        let mut book = SymbolBook::new("BTCUSDT");
        book.apply_anchor(&DiffEvent {
            bid_deltas: vec![level(4_990_000, 1), level(5_000_000, 2), level(4_995_000, 3)],
            ask_deltas: vec![level(5_010_000, 1), level(5_005_000, 2)],
            ..diff("BTCUSDT", 1, 42, 0)
        });

        let view = book.snapshot_view(2, ProductType::UsdFutures, 1_700_000_001_000);

        assert_eq!(view.symbol, "BTCUSDT");
        assert_eq!(view.last_update_id, 42);
        assert_eq!(view.bids.len(), 2);
        assert_eq!(view.bids[0].price, 5_000_000);
        assert_eq!(view.asks[0].price, 5_005_000);
        assert!(crate::events::verify_update_integrity(&view));
    }
}
