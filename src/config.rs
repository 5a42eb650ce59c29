//! Engine configuration
//!
//! The symbol set, the per-symbol precision table, projection depth and
//! the snapshot retry policy are all fixed at construction; symbols are
//! never added or removed at runtime.

use std::collections::HashMap;
use std::time::Duration;

use crate::events::ProductType;

/// Decimal precision for one symbol: `tick_size` scales prices,
/// `step_size` scales quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolPrecision {
    pub tick_size: u32,
    pub step_size: u32,
}

/// Retry policy for snapshot fetching during initialization and resync.
///
/// `max_fetch_attempts` bounds transient request failures (each retried
/// with exponential backoff starting at `initial_backoff`);
/// `max_init_attempts` bounds how many stale snapshots are discarded
/// before the symbol is declared unsynchronizable.
#[derive(Debug, Clone)]
pub struct SnapshotPolicy {
    /// Max REST request attempts per snapshot before giving up.
    pub max_fetch_attempts: u32,
    /// Max stale-snapshot rounds per initialization before giving up.
    pub max_init_attempts: u32,
    /// Backoff before the first retry; doubles per attempt.
    pub initial_backoff: Duration,
    /// Per-request timeout for the REST round trip.
    pub fetch_timeout: Duration,
    /// Depth requested from the REST endpoint. Deeper than the published
    /// projection so the snapshot covers the levels diffs will touch.
    pub fetch_depth: usize,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            max_fetch_attempts: 5,
            max_init_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(5),
            fetch_depth: 1000,
        }
    }
}

/// Top-level configuration for the synchronization engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Symbols to maintain books for.
    pub symbols: Vec<String>,
    /// Per-symbol precision table. Every entry in `symbols` must have one.
    pub precisions: HashMap<String, SymbolPrecision>,
    /// Levels per side in published projections.
    pub depth: usize,
    /// Product tag carried on every published update.
    pub product_type: ProductType,
    /// Snapshot retry policy.
    pub snapshot: SnapshotPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            precisions: HashMap::new(),
            depth: 20,
            product_type: ProductType::UsdFutures,
            snapshot: SnapshotPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Add a symbol together with its precision entry.
    pub fn with_symbol(
        mut self,
        symbol: impl Into<String>,
        tick_size: u32,
        step_size: u32,
    ) -> Self {
        let symbol = symbol.into();
        self.precisions.insert(
            symbol.clone(),
            SymbolPrecision {
                tick_size,
                step_size,
            },
        );
        self.symbols.push(symbol);
        self
    }

    /// Precision entry for a symbol, if configured.
    pub fn precision(&self, symbol: &str) -> Option<&SymbolPrecision> {
        self.precisions.get(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.depth, 20);
        assert_eq!(config.snapshot.max_fetch_attempts, 5);
        assert_eq!(config.snapshot.max_init_attempts, 3);
        assert!(config.symbols.is_empty());
    }

    #[test]
    fn test_with_symbol() {
        let config = EngineConfig::default()
            .with_symbol("BTCUSDT", 2, 3)
            .with_symbol("ETHUSDT", 2, 4);

        assert_eq!(config.symbols, vec!["BTCUSDT", "ETHUSDT"]);
        let prec = config.precision("BTCUSDT").unwrap();
        assert_eq!(prec.tick_size, 2);
        assert_eq!(prec.step_size, 3);
        assert!(config.precision("XRPUSDT").is_none());
    }
}
