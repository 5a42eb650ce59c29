//! Fixed-point codec for textual exchange prices and quantities
//!
//! The exchange encodes prices and quantities as decimal strings. Inside
//! the book they are scaled integers (`value * 10^precision`, rounded to
//! nearest) so that level matching is exact integer comparison with no
//! floating-point equality hazards. Parsing goes through `rust_decimal`
//! to avoid round-off before scaling.
//!
//! `decode` exists only for the system boundary (publication, storage);
//! the reconciliation path never converts back to floats.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Scaled integer representation of a decimal price or quantity.
pub type ScaledInt = i64;

/// Errors from fixed-point conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed number: {0:?}")]
    MalformedNumber(String),

    #[error("value {text:?} does not fit at precision {precision}")]
    Overflow { text: String, precision: u32 },
}

/// Parse a decimal string and scale it to an integer at the given precision.
///
/// Rounds to nearest (ties away from zero), matching the exchange's own
/// tick rounding.
pub fn encode(text: &str, precision: u32) -> Result<ScaledInt, CodecError> {
    let value = Decimal::from_str(text.trim())
        .map_err(|_| CodecError::MalformedNumber(text.to_string()))?;

    let factor = 10_i64
        .checked_pow(precision)
        .ok_or_else(|| CodecError::Overflow {
            text: text.to_string(),
            precision,
        })?;

    let scaled = value
        .checked_mul(Decimal::from(factor))
        .ok_or_else(|| CodecError::Overflow {
            text: text.to_string(),
            precision,
        })?;

    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| CodecError::Overflow {
            text: text.to_string(),
            precision,
        })
}

/// Convert a scaled integer back to a float. Boundary use only.
pub fn decode(value: ScaledInt, precision: u32) -> f64 {
    value as f64 / 10_f64.powi(precision as i32)
}
