use time::OffsetDateTime;

/// A stored consumption record. `(customer_id, ts)` is unique.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Reading {
    pub customer_id: i64,
    /// Canonical UTC instant of the meter reading.
    pub ts: OffsetDateTime,
    pub kwh: f64,
    pub price_eur_per_kwh: f64,
}

/// A reading that has not been attached to a customer yet.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MeterReading {
    pub ts: OffsetDateTime,
    pub kwh: f64,
    pub price_eur_per_kwh: f64,
}

impl MeterReading {
    pub fn for_customer(&self, customer_id: i64) -> Reading {
        Reading {
            customer_id,
            ts: self.ts,
            kwh: self.kwh,
            price_eur_per_kwh: self.price_eur_per_kwh,
        }
    }
}

impl Reading {
    /// Cost of this line in EUR.
    pub fn cost_eur(&self) -> f64 {
        self.kwh * self.price_eur_per_kwh
    }
}
