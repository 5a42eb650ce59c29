//! Book builder: per-symbol worker orchestration
//!
//! `start()` claims each symbol's book and queue from the registry and
//! spawns one worker task per symbol. Workers initialize concurrently,
//! so total startup latency is bounded by the slowest symbol's snapshot
//! handshake, not the sum.
//!
//! Each worker loop awaits its queue under `tokio::select!` together
//! with the shutdown signal; there is no spin-wait. On every applied
//! event (and after every completed resync) the worker publishes a
//! fresh top-N projection to the sink. Sequence gaps are handled inline
//! by the owning worker; other symbols are never touched.
//!
//! Per-symbol failures never cascade: a symbol whose snapshot retries
//! are exhausted stops its own worker and the rest keep running.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, SnapshotPolicy};
use crate::events::{DiffEvent, ProductType};
use crate::fetcher::SnapshotFetcher;
use crate::metrics::EngineMetrics;
use crate::multi_book::{BookRouter, MultiSymbolBook};
use crate::order_book::SymbolBook;
use crate::sink::EventSink;
use crate::sync::{self, SyncAttempt, SyncError, SyncPhase, SymbolStatus};

/// Orchestrates one worker task per symbol.
pub struct BookBuilder<F, S> {
    books: MultiSymbolBook,
    fetcher: Arc<F>,
    sink: Arc<S>,
    config: EngineConfig,
    metrics: Arc<EngineMetrics>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl<F, S> BookBuilder<F, S>
where
    F: SnapshotFetcher + 'static,
    S: EventSink + 'static,
{
    pub fn new(
        books: MultiSymbolBook,
        fetcher: Arc<F>,
        sink: Arc<S>,
        config: EngineConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            books,
            fetcher,
            sink,
            config,
            metrics: Arc::new(EngineMetrics::new()),
            shutdown_tx,
            shutdown_rx,
            workers: Vec::new(),
        }
    }

    /// Spawn one worker per symbol. Workers begin initializing
    /// immediately and concurrently. Calling `start` twice is a no-op
    /// for symbols whose worker is already running.
    pub fn start(&mut self) {
        let mut symbols = self.books.symbols();
        symbols.sort();

        for symbol in symbols {
            let Some(parts) = self.books.take_parts(&symbol) else {
                continue;
            };

            info!(symbol, "starting book worker");
            let ctx = WorkerCtx {
                symbol,
                book: parts.book,
                queue: parts.queue,
                status: parts.status,
                fetcher: self.fetcher.clone(),
                sink: self.sink.clone(),
                metrics: self.metrics.clone(),
                depth: self.config.depth,
                product_type: self.config.product_type,
                policy: self.config.snapshot.clone(),
                shutdown: self.shutdown_rx.clone(),
            };
            self.workers.push(tokio::spawn(run_worker(ctx)));
        }
    }

    /// Signal all workers to exit and wait for them. Idempotent and
    /// safe to call from any task; shutdown latency is bounded by one
    /// queue-poll interval.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
        info!("book builder stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    /// Routing handle for the transport collaborator.
    pub fn router(&self) -> BookRouter {
        self.books.router()
    }

    /// Read-only sync status for a symbol.
    pub fn status(&self, symbol: &str) -> Option<Arc<SymbolStatus>> {
        self.books.status(symbol)
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }
}

struct WorkerCtx<F, S> {
    symbol: String,
    book: SymbolBook,
    queue: mpsc::UnboundedReceiver<DiffEvent>,
    status: Arc<SymbolStatus>,
    fetcher: Arc<F>,
    sink: Arc<S>,
    metrics: Arc<EngineMetrics>,
    depth: usize,
    product_type: ProductType,
    policy: SnapshotPolicy,
    shutdown: watch::Receiver<bool>,
}

impl<F, S> WorkerCtx<F, S>
where
    F: SnapshotFetcher,
    S: EventSink,
{
    fn publish(&self) {
        let view = self
            .book
            .snapshot_view(self.depth, self.product_type, unix_millis());
        self.sink.publish(view);
        self.metrics.record_update_published();
        debug!(
            symbol = %self.symbol,
            last_update_id = self.book.sync().last_applied_update_id,
            "published book update"
        );
    }
}

async fn run_worker<F, S>(mut ctx: WorkerCtx<F, S>)
where
    F: SnapshotFetcher,
    S: EventSink,
{
    match initialize(&mut ctx).await {
        Ok(()) => ctx.publish(),
        Err(SyncError::QueueClosed) => {
            debug!(symbol = %ctx.symbol, "shutdown during initialization");
            return;
        }
        Err(err) => {
            error!(symbol = %ctx.symbol, error = %err, "initialization failed, stopping worker");
            ctx.status.set_phase(SyncPhase::Failed);
            return;
        }
    }

    loop {
        tokio::select! {
            _ = ctx.shutdown.changed() => break,
            event = ctx.queue.recv() => {
                let Some(event) = event else {
                    debug!(symbol = %ctx.symbol, "inbound queue closed");
                    break;
                };
                match ctx.book.apply_event(&event) {
                    Ok(()) => {
                        ctx.metrics.record_event_applied();
                        ctx.status.record_applied(ctx.book.sync().last_applied_update_id);
                        ctx.publish();
                    }
                    Err(SyncError::OutOfSync { expected, actual }) => {
                        warn!(
                            symbol = %ctx.symbol,
                            expected, actual,
                            "sequence gap detected, resynchronizing"
                        );
                        ctx.metrics.record_resync();
                        ctx.status.record_resync();
                        match initialize(&mut ctx).await {
                            Ok(()) => ctx.publish(),
                            Err(SyncError::QueueClosed) => break,
                            Err(err) => {
                                error!(
                                    symbol = %ctx.symbol,
                                    error = %err,
                                    "resynchronization failed, stopping worker"
                                );
                                ctx.status.set_phase(SyncPhase::Failed);
                                return;
                            }
                        }
                    }
                    Err(_) => {}
                }
            }
        }
    }

    info!(symbol = %ctx.symbol, "book worker stopped");
}

/// Run the initialization procedure until the symbol is synced or the
/// configured snapshot attempts are exhausted.
async fn initialize<F, S>(ctx: &mut WorkerCtx<F, S>) -> Result<(), SyncError>
where
    F: SnapshotFetcher,
    S: EventSink,
{
    ctx.status.set_phase(SyncPhase::Initializing);
    let mut buffer = std::collections::VecDeque::new();

    for attempt in 1..=ctx.policy.max_init_attempts {
        let snapshot = fetch_snapshot(ctx).await?;

        loop {
            match sync::synchronize(&mut ctx.book, &snapshot, &mut buffer) {
                SyncAttempt::Synced => {
                    let last_update_id = ctx.book.sync().last_applied_update_id;
                    ctx.status.record_synced(last_update_id);
                    info!(
                        symbol = %ctx.symbol,
                        last_update_id,
                        attempt,
                        "book synchronized"
                    );
                    return Ok(());
                }
                SyncAttempt::SnapshotStale => {
                    warn!(
                        symbol = %ctx.symbol,
                        snapshot_update_id = snapshot.last_update_id,
                        attempt,
                        "snapshot stale, refetching"
                    );
                    break;
                }
                SyncAttempt::NeedMoreEvents => {
                    tokio::select! {
                        _ = ctx.shutdown.changed() => return Err(SyncError::QueueClosed),
                        event = ctx.queue.recv() => match event {
                            Some(event) => buffer.push_back(event),
                            None => return Err(SyncError::QueueClosed),
                        }
                    }
                }
            }
        }
    }

    Err(SyncError::SnapshotUnavailable {
        symbol: ctx.symbol.clone(),
        attempts: ctx.policy.max_init_attempts,
    })
}

/// Fetch a snapshot with bounded retries and exponential backoff.
async fn fetch_snapshot<F, S>(ctx: &mut WorkerCtx<F, S>) -> Result<crate::events::Snapshot, SyncError>
where
    F: SnapshotFetcher,
    S: EventSink,
{
    let mut backoff = ctx.policy.initial_backoff;

    for attempt in 1..=ctx.policy.max_fetch_attempts {
        match ctx.fetcher.fetch(&ctx.symbol, ctx.policy.fetch_depth).await {
            Ok(snapshot) => {
                ctx.metrics.record_snapshot_fetched();
                return Ok(snapshot);
            }
            Err(err) => {
                ctx.metrics.record_snapshot_failure();
                warn!(
                    symbol = %ctx.symbol,
                    attempt,
                    error = %err,
                    "snapshot fetch failed"
                );
                if attempt < ctx.policy.max_fetch_attempts {
                    tokio::select! {
                        _ = ctx.shutdown.changed() => return Err(SyncError::QueueClosed),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }

    Err(SyncError::SnapshotUnavailable {
        symbol: ctx.symbol.clone(),
        attempts: ctx.policy.max_fetch_attempts,
    })
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
