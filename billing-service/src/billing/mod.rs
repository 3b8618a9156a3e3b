//! Period-bounded billing totals over the canonical reading store.

use billing_client::domain::Reading;
use chrono_tz::Tz;
use time::{macros::format_description, Date, OffsetDateTime};

use crate::normalize::{self, NormalizationError};
use crate::store::{BillingStore, StoreError};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("degenerate billing period: start {start} is not before end {end}")]
    DegeneratePeriod {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },
    #[error("invalid billing period '{0}'")]
    InvalidPeriod(String),
    #[error("billing period boundary: {0}")]
    Boundary(#[from] NormalizationError),
    #[error("unknown customer {0}")]
    UnknownCustomer(i64),
    #[error("no readings for customer {customer_id} in [{start}, {end})")]
    NoReadings {
        customer_id: i64,
        start: OffsetDateTime,
        end: OffsetDateTime,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Half-open `[start, end)` period of canonical UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl BillingPeriod {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, AggregationError> {
        if start >= end {
            return Err(AggregationError::DegeneratePeriod { start, end });
        }
        Ok(Self { start, end })
    }

    /// Calendar month `YYYY-MM` in `zone`, from local midnight of the first day
    /// to local midnight of the first day of the next month.
    pub fn month(zone: Tz, text: &str) -> Result<Self, AggregationError> {
        let first = Date::parse(
            &format!("{}-01", text.trim()),
            format_description!("[year]-[month]-[day]"),
        )
        .map_err(|_| AggregationError::InvalidPeriod(text.to_string()))?;

        let next = match first.month() {
            time::Month::December => Date::from_calendar_date(first.year() + 1, time::Month::January, 1),
            month => Date::from_calendar_date(first.year(), month.next(), 1),
        }
        .map_err(|_| AggregationError::InvalidPeriod(text.to_string()))?;

        Self::new(
            normalize::local_midnight(zone, first)?,
            normalize::local_midnight(zone, next)?,
        )
    }

    /// Explicit bounds as written by a person. Each bound goes through the
    /// reading normalizer, so a bare date means local midnight in `zone` and an
    /// explicit offset is honoured. `end` stays exclusive.
    pub fn local_bounds(zone: Tz, start: &str, end: &str) -> Result<Self, AggregationError> {
        let bound = |text: &str| -> Result<OffsetDateTime, AggregationError> {
            normalize::normalize(Some(text), zone)?
                .ok_or_else(|| AggregationError::InvalidPeriod(text.to_string()))
        };

        Self::new(bound(start)?, bound(end)?)
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Unrounded total and the number of readings that contributed to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BillingTotal {
    pub total_eur: f64,
    pub line_count: usize,
}

/// Sum `kwh * price` over the readings inside `period`, in input order.
///
/// Readings whose cost is not finite are skipped and not counted.
pub fn sum_readings<'a, I>(period: &BillingPeriod, readings: I) -> BillingTotal
where
    I: IntoIterator<Item = &'a Reading>,
{
    let mut total = BillingTotal {
        total_eur: 0.0,
        line_count: 0,
    };

    for reading in readings.into_iter().filter(|r| period.contains(r.ts)) {
        let cost = reading.cost_eur();
        if !cost.is_finite() {
            tracing::warn!(
                customer_id = reading.customer_id,
                ts = %reading.ts,
                "skipping reading with non-numeric values"
            );
            continue;
        }
        total.total_eur += cost;
        total.line_count += 1;
    }

    total
}

/// Compute the billing total for a customer over `period`. Persists nothing.
pub async fn compute_total<S>(
    store: &S,
    customer_id: i64,
    period: &BillingPeriod,
) -> Result<BillingTotal, AggregationError>
where
    S: BillingStore + ?Sized,
{
    let readings = store
        .readings_in_range(customer_id, period.start(), period.end())
        .await?;

    let total = sum_readings(period, &readings);
    tracing::debug!(
        customer_id,
        lines = total.line_count,
        total_eur = total.total_eur,
        "billing total computed"
    );
    Ok(total)
}
