//! Snapshot/diff reconciliation
//!
//! A symbol's book moves through `Uninitialized → Initializing → Synced`
//! and drops back through `Resyncing` whenever a sequence gap is
//! detected. Synchronization anchors a REST snapshot against the
//! buffered diff stream: the first buffered event whose id range
//! straddles the snapshot's `last_update_id` is applied without a
//! sequence check, and everything after it replays through the normal
//! gap-checked path.
//!
//! [`synchronize`] is a pure state transition over the book and buffer;
//! the async worker in [`crate::builder`] drives it, fetching fresh
//! snapshots when the current one turns out to be stale.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::events::{DiffEvent, Snapshot};
use crate::order_book::SymbolBook;

/// Errors surfaced by the reconciliation state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("out of sync: expected pu {expected}, got {actual}")]
    OutOfSync { expected: u64, actual: u64 },

    #[error("snapshot unavailable for {symbol} after {attempts} attempts")]
    SnapshotUnavailable { symbol: String, attempts: u32 },

    #[error("inbound queue closed")]
    QueueClosed,
}

/// Reconciliation phase of one symbol, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncPhase {
    Uninitialized = 0,
    Initializing = 1,
    Synced = 2,
    Resyncing = 3,
    /// Snapshot retries exhausted; the symbol's worker has stopped.
    Failed = 4,
}

impl SyncPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncPhase::Initializing,
            2 => SyncPhase::Synced,
            3 => SyncPhase::Resyncing,
            4 => SyncPhase::Failed,
            _ => SyncPhase::Uninitialized,
        }
    }
}

/// Shared read-only mirror of a symbol's sync state.
///
/// The owning worker writes; diagnostics and tests read. The book
/// itself is never shared.
#[derive(Debug)]
pub struct SymbolStatus {
    phase: AtomicU8,
    last_update_id: AtomicU64,
    resyncs: AtomicU64,
}

impl SymbolStatus {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(SyncPhase::Uninitialized as u8),
            last_update_id: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
        }
    }

    pub fn set_phase(&self, phase: SyncPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn phase(&self) -> SyncPhase {
        SyncPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == SyncPhase::Synced
    }

    /// Record a successful synchronization at `last_update_id`.
    pub fn record_synced(&self, last_update_id: u64) {
        self.last_update_id.store(last_update_id, Ordering::Release);
        self.set_phase(SyncPhase::Synced);
    }

    /// Record a steady-state apply advancing to `last_update_id`.
    pub fn record_applied(&self, last_update_id: u64) {
        self.last_update_id.store(last_update_id, Ordering::Release);
    }

    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
        self.set_phase(SyncPhase::Resyncing);
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id.load(Ordering::Acquire)
    }

    pub fn resyncs(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }
}

impl Default for SymbolStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one synchronization pass over the current buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAttempt {
    /// Book loaded, anchor applied, buffer replayed; symbol is synced.
    Synced,
    /// Buffer holds nothing usable yet; wait for more diff events.
    NeedMoreEvents,
    /// Every buffered event is newer than the snapshot, or replay hit a
    /// gap; fetch a fresh snapshot.
    SnapshotStale,
}

/// Index of the first buffered event straddling `last_update_id`
/// (`U <= L <= u`), scanning in arrival order.
pub fn find_anchor(buffer: &VecDeque<DiffEvent>, last_update_id: u64) -> Option<usize> {
    buffer.iter().position(|event| {
        event.first_update_id <= last_update_id && event.final_update_id >= last_update_id
    })
}

/// Attempt to synchronize `book` from `snapshot` and the buffered events.
///
/// Drops buffered events wholly older than the snapshot, anchors on the
/// first straddling event, then replays the remainder through the
/// gap-checked apply. Events consumed by the replay are removed from the
/// buffer; on [`SyncAttempt::SnapshotStale`] the unconsumed tail is kept
/// for the next round.
pub fn synchronize(
    book: &mut SymbolBook,
    snapshot: &Snapshot,
    buffer: &mut VecDeque<DiffEvent>,
) -> SyncAttempt {
    buffer.retain(|event| event.final_update_id >= snapshot.last_update_id);

    let Some(anchor_idx) = find_anchor(buffer, snapshot.last_update_id) else {
        // Everything remaining has U > L: the snapshot predates the
        // buffered stream and cannot be stitched to it.
        if buffer.is_empty() {
            return SyncAttempt::NeedMoreEvents;
        }
        return SyncAttempt::SnapshotStale;
    };

    buffer.drain(..anchor_idx);
    let Some(anchor) = buffer.pop_front() else {
        return SyncAttempt::NeedMoreEvents;
    };

    book.load_snapshot(snapshot);
    book.apply_anchor(&anchor);

    // Replay whatever arrived after the anchor; a gap here means events
    // were lost between buffered entries and a fresh snapshot is needed.
    loop {
        let Some(next) = buffer.front() else {
            break;
        };
        if book.apply_event(next).is_err() {
            return SyncAttempt::SnapshotStale;
        }
        buffer.pop_front();
    }

    SyncAttempt::Synced
}
