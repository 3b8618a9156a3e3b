use billing_client::domain::MeterReading;
use chrono_tz::Tz;
use time::{macros::datetime, OffsetDateTime};

use crate::normalize::{self, NormalizationError};
use crate::sources::RawRow;

/// Why a single row was dropped from an otherwise valid upload.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RowRejection {
    #[error(transparent)]
    Timestamp(#[from] NormalizationError),
    #[error("timestamp is empty")]
    MissingTimestamp,
    #[error("energy must be non-negative, got {0}")]
    NegativeEnergy(f64),
    #[error("timestamp {0} out of allowed range")]
    OutOfRange(OffsetDateTime),
}

/// Strict decimal parse accepting a decimal comma. Non-finite values are
/// treated as unparsable.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let value: f64 = if trimmed.contains(',') {
        trimmed.replace(',', ".").parse().ok()?
    } else {
        trimmed.parse().ok()?
    };

    value.is_finite().then_some(value)
}

/// Lenient numeric coercion: anything [`parse_decimal`] rejects becomes `0.0`.
/// Every coercion is counted.
pub fn coerce_decimal(raw: &str, column: &'static str, line: u64) -> f64 {
    match parse_decimal(raw) {
        Some(v) => v,
        None => {
            metrics::counter!("import_numeric_coercions_total", "column" => column).increment(1);
            tracing::debug!(line, column, value = raw, "unparsable numeric cell coerced to 0");
            0.0
        }
    }
}

/// Turn one raw row into a reading: normalize the timestamp in `zone`,
/// coerce the numeric cells, then apply the sanity rules of
/// [`validate_reading`].
pub fn row_to_reading(row: &RawRow, zone: Tz) -> Result<MeterReading, RowRejection> {
    let ts = normalize::normalize(Some(row.timestamp.as_str()), zone)?.ok_or(RowRejection::MissingTimestamp)?;

    let reading = MeterReading {
        ts,
        kwh: coerce_decimal(&row.energy, "energy", row.line),
        price_eur_per_kwh: coerce_decimal(&row.price, "price", row.line),
    };

    validate_reading(reading)
}

/// Pure validation of a `MeterReading`.
///
/// Rules:
/// - kWh must be non-negative (prices may be negative under dynamic tariffs).
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_reading(reading: MeterReading) -> Result<MeterReading, RowRejection> {
    if reading.kwh < 0.0 {
        return Err(RowRejection::NegativeEnergy(reading.kwh));
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if reading.ts < min_ts || reading.ts > max_ts {
        return Err(RowRejection::OutOfRange(reading.ts));
    }

    Ok(reading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::DEFAULT_LOCAL_ZONE;

    fn row(timestamp: &str, energy: &str, price: &str) -> RawRow {
        RawRow {
            line: 2,
            timestamp: timestamp.to_string(),
            energy: energy.to_string(),
            price: price.to_string(),
        }
    }

    #[test]
    fn decimal_comma_and_point_both_parse() {
        assert_eq!(parse_decimal("0,20"), Some(0.2));
        assert_eq!(parse_decimal(" 1.5 "), Some(1.5));
        assert_eq!(parse_decimal("-0,05"), Some(-0.05));
        assert_eq!(parse_decimal("12"), Some(12.0));
    }

    #[test]
    fn malformed_numbers_do_not_parse() {
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("n/a"), None);
        assert_eq!(parse_decimal("1.234,5"), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn row_converts_to_canonical_reading() {
        let reading = row_to_reading(&row("2025-08-01 02:00:00", "1,5", "0,20"), DEFAULT_LOCAL_ZONE).unwrap();

        assert_eq!(reading.ts, datetime!(2025-08-01 00:00:00 UTC));
        assert_eq!(reading.kwh, 1.5);
        assert_eq!(reading.price_eur_per_kwh, 0.2);
    }

    #[test]
    fn empty_or_garbage_energy_is_stored_as_zero() {
        let empty = row_to_reading(&row("2025-08-01 02:00", "", "0,20"), DEFAULT_LOCAL_ZONE).unwrap();
        assert_eq!(empty.kwh, 0.0);
        assert_eq!(empty.price_eur_per_kwh, 0.2);

        let garbage = row_to_reading(&row("2025-08-01 02:00", "abc", "x"), DEFAULT_LOCAL_ZONE).unwrap();
        assert_eq!(garbage.kwh, 0.0);
        assert_eq!(garbage.price_eur_per_kwh, 0.0);
    }

    #[test]
    fn negative_prices_are_kept() {
        let reading = row_to_reading(&row("2025-08-01 02:00", "1", "-0,01"), DEFAULT_LOCAL_ZONE).unwrap();
        assert_eq!(reading.price_eur_per_kwh, -0.01);
    }

    #[test]
    fn negative_energy_rejects_row() {
        assert_eq!(
            row_to_reading(&row("2025-08-01 02:00", "-1", "0,2"), DEFAULT_LOCAL_ZONE),
            Err(RowRejection::NegativeEnergy(-1.0))
        );
    }

    #[test]
    fn timestamp_problems_reject_row() {
        assert_eq!(
            row_to_reading(&row(" ", "1", "0,2"), DEFAULT_LOCAL_ZONE),
            Err(RowRejection::MissingTimestamp)
        );
        assert!(matches!(
            row_to_reading(&row("2025-03-30 02:30", "1", "0,2"), DEFAULT_LOCAL_ZONE),
            Err(RowRejection::Timestamp(NormalizationError::NonexistentLocalTime { .. }))
        ));
        assert!(matches!(
            row_to_reading(&row("1999-12-31 12:00 UTC", "1", "0,2"), DEFAULT_LOCAL_ZONE),
            Err(RowRejection::OutOfRange(_))
        ));
    }
}
