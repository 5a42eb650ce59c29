//! Multi-symbol book registry and inbound routing
//!
//! Owns one [`SymbolBook`] and one inbound diff queue per configured
//! symbol. The symbol set is fixed at construction and every symbol
//! must have a precision entry; a missing entry fails construction
//! rather than the first update.
//!
//! Queues are multi-producer single-consumer: the transport enqueues
//! through a cheap [`BookRouter`] handle while exactly one worker (see
//! [`crate::builder`]) drains each queue. Workers take exclusive
//! ownership of their book via [`MultiSymbolBook::take_parts`], so no
//! lock ever guards book state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::events::DiffEvent;
use crate::order_book::SymbolBook;
use crate::sync::SymbolStatus;

/// Errors from registry construction and routing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("no precision configured for symbol: {0}")]
    MissingPrecision(String),
}

/// Everything a symbol's worker takes exclusive ownership of.
pub struct SymbolParts {
    pub book: SymbolBook,
    pub queue: mpsc::UnboundedReceiver<DiffEvent>,
    pub status: Arc<SymbolStatus>,
}

#[derive(Debug)]
struct SymbolEntry {
    parts: Option<(SymbolBook, mpsc::UnboundedReceiver<DiffEvent>)>,
    status: Arc<SymbolStatus>,
}

/// Clonable handle the transport uses to push diff events into the
/// per-symbol queues. Never reads or mutates book state.
#[derive(Debug, Clone)]
pub struct BookRouter {
    channels: Arc<HashMap<String, mpsc::UnboundedSender<DiffEvent>>>,
    unknown_routed: Arc<AtomicU64>,
}

impl BookRouter {
    /// Enqueue a diff event for its symbol's worker.
    ///
    /// Unknown symbols are counted and rejected; a closed queue (seen
    /// during shutdown) is not an error.
    pub fn route(&self, event: DiffEvent) -> Result<(), RegistryError> {
        let Some(sender) = self.channels.get(&event.symbol) else {
            self.unknown_routed.fetch_add(1, Ordering::Relaxed);
            warn!(symbol = %event.symbol, "dropping event for unknown symbol");
            return Err(RegistryError::UnknownSymbol(event.symbol));
        };

        if sender.send(event).is_err() {
            debug!("inbound queue closed, dropping event");
        }
        Ok(())
    }

    /// Events dropped because their symbol is not configured.
    pub fn unknown_routed(&self) -> u64 {
        self.unknown_routed.load(Ordering::Relaxed)
    }
}

/// Registry of all symbol books and their inbound queues.
#[derive(Debug)]
pub struct MultiSymbolBook {
    entries: HashMap<String, SymbolEntry>,
    router: BookRouter,
}

impl MultiSymbolBook {
    /// Build books and queues for every configured symbol.
    ///
    /// Fails fast with [`RegistryError::MissingPrecision`] if a symbol
    /// has no tick/step entry.
    pub fn new(config: &EngineConfig) -> Result<Self, RegistryError> {
        let mut entries = HashMap::new();
        let mut channels = HashMap::new();

        for symbol in &config.symbols {
            if config.precision(symbol).is_none() {
                return Err(RegistryError::MissingPrecision(symbol.clone()));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            channels.insert(symbol.clone(), tx);
            entries.insert(
                symbol.clone(),
                SymbolEntry {
                    parts: Some((SymbolBook::new(symbol.clone()), rx)),
                    status: Arc::new(SymbolStatus::new()),
                },
            );
        }

        Ok(Self {
            entries,
            router: BookRouter {
                channels: Arc::new(channels),
                unknown_routed: Arc::new(AtomicU64::new(0)),
            },
        })
    }

    /// Handle for the transport to push events through.
    pub fn router(&self) -> BookRouter {
        self.router.clone()
    }

    /// Enqueue a diff event for its symbol's worker.
    pub fn route(&self, event: DiffEvent) -> Result<(), RegistryError> {
        self.router.route(event)
    }

    /// Configured symbols.
    pub fn symbols(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Read-only sync status for a symbol.
    pub fn status(&self, symbol: &str) -> Option<Arc<SymbolStatus>> {
        self.entries.get(symbol).map(|entry| entry.status.clone())
    }

    /// Transfer a symbol's book and queue to its worker. Each symbol's
    /// parts can be taken exactly once.
    pub(crate) fn take_parts(&mut self, symbol: &str) -> Option<SymbolParts> {
        let entry = self.entries.get_mut(symbol)?;
        let (book, queue) = entry.parts.take()?;
        Some(SymbolParts {
            book,
            queue,
            status: entry.status.clone(),
        })
    }
}
