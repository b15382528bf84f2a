//! Serde adapter for JWT `NumericDate` values with millisecond precision
//!
//! Timestamps are written as seconds since the epoch with a fractional part,
//! so validities shorter than a second survive the round trip. Integer
//! values issued by other tools are accepted as well.

use chrono::{DateTime, Utc};
use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

/// Serialize a timestamp as fractional epoch seconds
///
/// # Errors
///
/// Returns the serializer's error if writing the number fails
pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    #[allow(clippy::cast_precision_loss)]
    let seconds = value.timestamp_millis() as f64 / 1000.0;
    serializer.serialize_f64(seconds)
}

/// Deserialize fractional or integral epoch seconds
///
/// # Errors
///
/// Returns an error for non-finite or out of range values
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let seconds = f64::deserialize(deserializer)?;
    if !seconds.is_finite() {
        return Err(D::Error::custom("NumericDate must be a finite number"));
    }

    #[allow(clippy::cast_possible_truncation)]
    let millis = (seconds * 1000.0).round() as i64;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| D::Error::custom("NumericDate is out of range"))
}
