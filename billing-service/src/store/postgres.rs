use std::time::Duration;

use billing_client::{
    db::{customer_queries, invoice_queries, reading_queries},
    domain::{Customer, Invoice, MeterReading, NewInvoice, Reading},
};
use sqlx::postgres::PgPool;
use time::OffsetDateTime;

use super::{BillingStore, StoreError};

/// Postgres-backed store. Schema lives in `sql/schema/01_billing.sql`.
pub struct PgBillingStore {
    pool: PgPool,
    chunk_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PgBillingStore {
    pub fn new(pool: PgPool, chunk_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            chunk_size,
            max_retries,
            retry_backoff,
        }
    }
}

fn read_err(e: anyhow::Error) -> StoreError {
    StoreError::Read(e.to_string())
}

fn write_err(e: anyhow::Error) -> StoreError {
    StoreError::Write(e.to_string())
}

#[async_trait::async_trait]
impl BillingStore for PgBillingStore {
    async fn get_customer_by_name(&self, name: &str) -> Result<Option<Customer>, StoreError> {
        customer_queries::customer_by_name(&self.pool, name)
            .await
            .map_err(read_err)
    }

    async fn get_customer(&self, id: i64) -> Result<Option<Customer>, StoreError> {
        customer_queries::customer_by_id(&self.pool, id)
            .await
            .map_err(read_err)
    }

    async fn create_customer(&self, name: &str) -> Result<Customer, StoreError> {
        customer_queries::insert_or_fetch_customer(&self.pool, name)
            .await
            .map_err(write_err)
    }

    /// The whole slice is one transaction. A failed attempt rolls back, so the
    /// batch is retried as a unit with linear backoff.
    async fn bulk_upsert_readings(
        &self,
        customer_id: i64,
        readings: &[MeterReading],
    ) -> Result<u64, StoreError> {
        if readings.is_empty() {
            return Ok(0);
        }

        let mut attempt: u32 = 0;
        loop {
            let res =
                reading_queries::upsert_readings(&self.pool, customer_id, readings, self.chunk_size).await;
            match res {
                Ok(written) => {
                    metrics::counter!("store_upserted_readings_total").increment(written);
                    return Ok(written);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        customer_id,
                        attempt,
                        "reading upsert failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, customer_id, "reading upsert failed, giving up");
                    metrics::counter!("store_upsert_errors_total").increment(1);
                    return Err(write_err(e));
                }
            }
        }
    }

    async fn readings_in_range(
        &self,
        customer_id: i64,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        reading_queries::readings_in_range(&self.pool, customer_id, start, end)
            .await
            .map_err(read_err)
    }

    async fn count_readings(&self, customer_id: i64) -> Result<u64, StoreError> {
        reading_queries::count_readings(&self.pool, customer_id)
            .await
            .map_err(read_err)
    }

    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, StoreError> {
        invoice_queries::insert_invoice(&self.pool, invoice)
            .await
            .map_err(write_err)
    }
}
