//! Order Book Synchronization Engine
//!
//! Consumes an exchange depth feed (REST snapshots + incremental diff
//! events) and maintains a causally consistent limit order book per
//! subscribed symbol:
//! - Fixed-point price/quantity codec (per-symbol tick/step precision)
//! - Per-side price level stores with ranked retrieval
//! - Snapshot/diff reconciliation with automatic per-symbol resync
//! - One worker task per symbol, decoupled from the transport by
//!   multi-producer single-consumer queues
//! - Normalized top-N book updates published to a downstream sink
//!
//! # Architecture
//!
//! ```text
//! Transport (diff events)
//!        │  route()
//!    ┌───▼──────────┐
//!    │MultiSymbolBook│  ← per-symbol inbound queues
//!    └───┬──────────┘
//!        │ one queue per symbol
//!    ┌───▼───────┐     ┌────────────────┐
//!    │BookBuilder│────▶│SnapshotFetcher │  (REST, on init/resync)
//!    │ workers   │     └────────────────┘
//!    └───┬───────┘
//!        │ BookUpdate (top-N projection)
//!    ┌───▼─────┐
//!    │EventSink│  → queue / DB writer / multicast publisher
//!    └─────────┘
//! ```
//!
//! Sequencing follows the exchange contract: each diff event carries
//! `first_update_id` (U), `final_update_id` (u) and
//! `previous_final_update_id` (pu); a book is in sync only while each
//! applied event's `pu` equals the previously applied `u`.

pub mod builder;
pub mod config;
pub mod events;
pub mod fetcher;
pub mod fixed_point;
pub mod metrics;
pub mod multi_book;
pub mod order_book;
pub mod sink;
pub mod sync;

// Library version
pub const ENGINE_VERSION: &str = "0.1.0";
