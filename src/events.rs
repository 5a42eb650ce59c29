//! Event and book data models
//!
//! Defines the typed events flowing through the engine (`DiffEvent`,
//! `Snapshot`, `BookUpdate`) and the raw wire models the exchange feed
//! actually serves. The wire payloads carry prices and quantities as
//! decimal strings; conversion into scaled integers happens here, next
//! to the precision table, so the transport collaborator stays a dumb
//! pipe.
//!
//! Wire formats (exchange JSON):
//! - diff stream: `{"e","E","T","s","U","u","pu","b","a"}` with levels
//!   as 2-element string arrays
//! - REST depth snapshot: `{"lastUpdateId","E","T","bids","asks"}`

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::SymbolPrecision;
use crate::fixed_point::{self, CodecError, ScaledInt};

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Bid,
    Ask,
}

/// Product class of the feed, carried on every published update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Spot,
    UsdFutures,
}

/// One price level: scaled price and scaled aggregate quantity.
///
/// A resident level always has `quantity > 0`; a zero quantity appears
/// only inside diff deltas, where it marks removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: ScaledInt,
    pub quantity: ScaledInt,
}

/// An atomic batch of level changes between two sequence points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEvent {
    pub symbol: String,
    /// Exchange event time (ms).
    pub event_time: i64,
    /// Exchange transaction time (ms).
    pub transaction_time: i64,
    /// First update id covered by this event (`U`).
    pub first_update_id: u64,
    /// Final update id covered by this event (`u`).
    pub final_update_id: u64,
    /// Final update id of the previous event (`pu`).
    pub previous_final_update_id: u64,
    /// Absolute new sizes per bid level; zero quantity removes the level.
    pub bid_deltas: Vec<PriceLevel>,
    /// Absolute new sizes per ask level; zero quantity removes the level.
    pub ask_deltas: Vec<PriceLevel>,
}

/// A full point-in-time book state tagged with the sequence id it reflects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub symbol: String,
    pub last_update_id: u64,
    /// Exchange message time (ms).
    pub message_time: i64,
    /// Exchange transaction time (ms).
    pub transaction_time: i64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Normalized book-changed event published to the sink.
///
/// A derived top-N projection, never the source of truth. The checksum
/// covers levels and sequence so downstream consumers on lossy
/// transports can verify integrity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    /// Unique update identifier (UUID v7, time-sortable).
    pub event_id: Uuid,
    pub symbol: String,
    pub product_type: ProductType,
    /// Bids in descending price order (best first).
    pub bids: Vec<PriceLevel>,
    /// Asks in ascending price order (best first).
    pub asks: Vec<PriceLevel>,
    /// Last applied update id at projection time.
    pub last_update_id: u64,
    /// Unix milliseconds when the projection was taken.
    pub snapshot_time: i64,
    /// SHA-256 over levels and sequence.
    pub checksum: String,
}

/// Raw diff event as served on the depth stream.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDepthUpdate {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "pu")]
    pub previous_final_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<(String, String)>,
    #[serde(rename = "a")]
    pub asks: Vec<(String, String)>,
}

/// Raw REST depth snapshot payload. The endpoint does not echo the
/// symbol; the caller supplies it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSnapshot {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    #[serde(rename = "E")]
    pub message_time: i64,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
}

fn convert_levels(
    raw: &[(String, String)],
    precision: &SymbolPrecision,
) -> Result<Vec<PriceLevel>, CodecError> {
    raw.iter()
        .map(|(price, quantity)| {
            Ok(PriceLevel {
                price: fixed_point::encode(price, precision.tick_size)?,
                quantity: fixed_point::encode(quantity, precision.step_size)?,
            })
        })
        .collect()
}

impl RawDepthUpdate {
    /// Convert into a typed event, scaling levels by the symbol's precision.
    pub fn into_event(self, precision: &SymbolPrecision) -> Result<DiffEvent, CodecError> {
        Ok(DiffEvent {
            bid_deltas: convert_levels(&self.bids, precision)?,
            ask_deltas: convert_levels(&self.asks, precision)?,
            symbol: self.symbol,
            event_time: self.event_time,
            transaction_time: self.transaction_time,
            first_update_id: self.first_update_id,
            final_update_id: self.final_update_id,
            previous_final_update_id: self.previous_final_update_id,
        })
    }
}

impl RawSnapshot {
    /// Convert into a typed snapshot, scaling levels by the symbol's precision.
    pub fn into_snapshot(
        self,
        symbol: impl Into<String>,
        precision: &SymbolPrecision,
    ) -> Result<Snapshot, CodecError> {
        Ok(Snapshot {
            bids: convert_levels(&self.bids, precision)?,
            asks: convert_levels(&self.asks, precision)?,
            symbol: symbol.into(),
            last_update_id: self.last_update_id,
            message_time: self.message_time,
            transaction_time: self.transaction_time,
        })
    }
}

/// Compute a SHA-256 checksum over book levels and sequence.
pub fn compute_checksum(bids: &[PriceLevel], asks: &[PriceLevel], last_update_id: u64) -> String {
    let mut hasher = Sha256::new();

    for level in bids {
        hasher.update(level.price.to_le_bytes());
        hasher.update(level.quantity.to_le_bytes());
    }
    hasher.update(b"---");

    for level in asks {
        hasher.update(level.price.to_le_bytes());
        hasher.update(level.quantity.to_le_bytes());
    }
    hasher.update(b"---");

    hasher.update(last_update_id.to_le_bytes());

    format!("{:x}", hasher.finalize())
}

/// Verify that a published update's checksum matches its content.
pub fn verify_update_integrity(update: &BookUpdate) -> bool {
    update.checksum == compute_checksum(&update.bids, &update.asks, update.last_update_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn precision() -> SymbolPrecision {
        SymbolPrecision {
            tick_size: 2,
            step_size: 3,
        }
    }

    #[test]
    fn test_raw_depth_update_decodes_and_scales() {
        let json = r#"{
            "e": "depthUpdate",
            "E": 1700000001000,
            "T": 1700000000995,
            "s": "BTCUSDT",
            "U": 100,
            "u": 105,
            "pu": 99,
            "b": [["50000.10", "1.500"], ["49999.00", "0.000"]],
            "a": [["50001.25", "2.250"]]
        }"#;

        let raw: RawDepthUpdate = serde_json::from_str(json).unwrap();
        let event = raw.into_event(&precision()).unwrap();

        assert_eq!(event.symbol, "BTCUSDT");
        assert_eq!(event.first_update_id, 100);
        assert_eq!(event.final_update_id, 105);
        assert_eq!(event.previous_final_update_id, 99);
        assert_eq!(event.bid_deltas[0].price, 5_000_010);
        assert_eq!(event.bid_deltas[0].quantity, 1_500);
        // Zero quantity survives conversion as a removal marker
        assert_eq!(event.bid_deltas[1].quantity, 0);
        assert_eq!(event.ask_deltas[0].price, 5_000_125);
        assert_eq!(event.ask_deltas[0].quantity, 2_250);
    }

    #[test]
    fn test_raw_snapshot_decodes() {
        let json = r#"{
            "lastUpdateId": 103,
            "E": 1700000001000,
            "T": 1700000000995,
            "bids": [["50000.00", "1.000"]],
            "asks": [["50001.00", "2.000"]]
        }"#;

        let raw: RawSnapshot = serde_json::from_str(json).unwrap();
        let snapshot = raw.into_snapshot("BTCUSDT", &precision()).unwrap();

        assert_eq!(snapshot.symbol, "BTCUSDT");
        assert_eq!(snapshot.last_update_id, 103);
        assert_eq!(snapshot.bids[0].price, 5_000_000);
        assert_eq!(snapshot.asks[0].quantity, 2_000);
    }

    #[test]
    fn test_malformed_level_is_rejected() {
        let raw = RawDepthUpdate {
            event_type: "depthUpdate".to_string(),
            event_time: 0,
            transaction_time: 0,
            symbol: "BTCUSDT".to_string(),
            first_update_id: 1,
            final_update_id: 2,
            previous_final_update_id: 0,
            bids: vec![("garbage".to_string(), "1.0".to_string())],
            asks: vec![],
        };

        assert!(matches!(
            raw.into_event(&precision()),
            Err(CodecError::MalformedNumber(_))
        ));
    }

    #[test]
    fn test_checksum_deterministic_and_sensitive() {
        let bids = vec![PriceLevel {
            price: 5_000_000,
            quantity: 1_000,
        }];
        let asks = vec![PriceLevel {
            price: 5_000_100,
            quantity: 2_000,
        }];

        let c1 = compute_checksum(&bids, &asks, 42);
        let c2 = compute_checksum(&bids, &asks, 42);
        assert_eq!(c1, c2);

        let c3 = compute_checksum(&bids, &asks, 43);
        assert_ne!(c1, c3);

        // Swapping sides must change the checksum
        let c4 = compute_checksum(&asks, &bids, 42);
        assert_ne!(c1, c4);
    }

    #[test]
    fn test_book_update_serialization_roundtrip() {
        let bids = vec![PriceLevel {
            price: 5_000_000,
            quantity: 1_000,
        }];
        let update = BookUpdate {
            event_id: Uuid::now_v7(),
            symbol: "BTCUSDT".to_string(),
            product_type: ProductType::UsdFutures,
            checksum: compute_checksum(&bids, &[], 7),
            bids,
            asks: vec![],
            last_update_id: 7,
            snapshot_time: 1_700_000_001_000,
        };

        assert!(verify_update_integrity(&update));

        let json = serde_json::to_string(&update).unwrap();
        let decoded: BookUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(update, decoded);

        let mut tampered = decoded;
        tampered.checksum = "corrupted".to_string();
        assert!(!verify_update_integrity(&tampered));
    }
}
