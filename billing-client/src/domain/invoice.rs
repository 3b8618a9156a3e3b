use time::OffsetDateTime;

/// Persisted billing snapshot for `[period_start, period_end)`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Invoice {
    pub id: i64,
    pub customer_id: i64,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub total_eur: f64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub customer_id: i64,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    pub total_eur: f64,
}
