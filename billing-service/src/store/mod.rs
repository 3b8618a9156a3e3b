pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use billing_client::domain::{Customer, Invoice, MeterReading, NewInvoice, Reading};
use time::OffsetDateTime;

pub use memory::MemoryBillingStore;
pub use postgres::PgBillingStore;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store write failed: {0}")]
    Write(String),
    #[error("store read failed: {0}")]
    Read(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Persistence seam for customers, readings and invoices.
///
/// Implementations must back `create_customer` with a uniqueness constraint on
/// the name and make `bulk_upsert_readings` atomic per call.
#[async_trait::async_trait]
pub trait BillingStore: Send + Sync {
    async fn get_customer_by_name(&self, name: &str) -> Result<Option<Customer>, StoreError>;

    async fn get_customer(&self, id: i64) -> Result<Option<Customer>, StoreError>;

    /// Insert-or-fetch: returns the existing customer when the name is taken.
    async fn create_customer(&self, name: &str) -> Result<Customer, StoreError>;

    /// Write all readings or none. `(customer_id, ts)` collisions overwrite
    /// energy and price. Callers pass distinct `ts` values (see [`fold_batch`]).
    async fn bulk_upsert_readings(
        &self,
        customer_id: i64,
        readings: &[MeterReading],
    ) -> Result<u64, StoreError>;

    /// Readings in `[start, end)`, ordered by `ts`.
    async fn readings_in_range(
        &self,
        customer_id: i64,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>, StoreError>;

    async fn count_readings(&self, customer_id: i64) -> Result<u64, StoreError>;

    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, StoreError>;
}

/// Collapse readings sharing a `ts`; the last one in input order wins.
///
/// Output keeps the position of each instant's first occurrence.
pub fn fold_batch(readings: impl IntoIterator<Item = MeterReading>) -> Vec<MeterReading> {
    let mut folded: Vec<MeterReading> = Vec::new();
    let mut index: HashMap<OffsetDateTime, usize> = HashMap::new();

    for reading in readings {
        match index.get(&reading.ts) {
            Some(&at) => folded[at] = reading,
            None => {
                index.insert(reading.ts, folded.len());
                folded.push(reading);
            }
        }
    }

    folded
}

/// Idempotent upsert of one customer's readings.
///
/// Empty input is a no-op. Duplicated instants within the batch are folded
/// before the single atomic write, so re-running the same import converges.
/// Returns the number of distinct readings written.
pub async fn upsert_readings<S>(
    store: &S,
    customer_id: i64,
    readings: &[MeterReading],
) -> Result<u64, StoreError>
where
    S: BillingStore + ?Sized,
{
    if readings.is_empty() {
        return Ok(0);
    }

    let folded = fold_batch(readings.iter().copied());
    if folded.len() < readings.len() {
        tracing::debug!(
            customer_id,
            duplicates = readings.len() - folded.len(),
            "folded duplicate instants in batch"
        );
    }

    store.bulk_upsert_readings(customer_id, &folded).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn reading(ts: OffsetDateTime, kwh: f64) -> MeterReading {
        MeterReading {
            ts,
            kwh,
            price_eur_per_kwh: 0.1,
        }
    }

    #[test]
    fn fold_batch_keeps_last_value_per_instant() {
        let t0 = datetime!(2025-08-01 00:00:00 UTC);
        let t1 = datetime!(2025-08-01 01:00:00 UTC);

        let folded = fold_batch([reading(t0, 1.0), reading(t1, 2.0), reading(t0, 3.0)]);

        assert_eq!(folded, vec![reading(t0, 3.0), reading(t1, 2.0)]);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = MemoryBillingStore::new();
        store.set_fail_writes(true);

        assert_eq!(upsert_readings(&store, 1, &[]).await, Ok(0));
    }

    #[tokio::test]
    async fn upsert_twice_is_idempotent() {
        let store = MemoryBillingStore::new();
        let customer = store.create_customer("Acme").await.unwrap();
        let batch = [
            reading(datetime!(2025-08-01 00:00:00 UTC), 1.0),
            reading(datetime!(2025-08-01 01:00:00 UTC), 2.0),
        ];

        assert_eq!(upsert_readings(&store, customer.id, &batch).await, Ok(2));
        let once = store
            .readings_in_range(customer.id, datetime!(2025-08-01 00:00:00 UTC), datetime!(2025-08-02 00:00:00 UTC))
            .await
            .unwrap();

        assert_eq!(upsert_readings(&store, customer.id, &batch).await, Ok(2));
        let twice = store
            .readings_in_range(customer.id, datetime!(2025-08-01 00:00:00 UTC), datetime!(2025-08-02 00:00:00 UTC))
            .await
            .unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.count_readings(customer.id).await, Ok(2));
    }

    #[tokio::test]
    async fn reimport_overwrites_energy_and_price() {
        let store = MemoryBillingStore::new();
        let ts = datetime!(2025-08-01 00:00:00 UTC);

        upsert_readings(&store, 7, &[reading(ts, 1.0)]).await.unwrap();
        let corrected = MeterReading {
            ts,
            kwh: 4.0,
            price_eur_per_kwh: 0.3,
        };
        upsert_readings(&store, 7, &[corrected]).await.unwrap();

        let rows = store
            .readings_in_range(7, ts, datetime!(2025-08-01 01:00:00 UTC))
            .await
            .unwrap();
        assert_eq!(rows, vec![corrected.for_customer(7)]);
    }

    #[tokio::test]
    async fn duplicate_instants_in_one_batch_store_one_row() {
        let store = MemoryBillingStore::new();
        let ts = datetime!(2025-08-01 00:00:00 UTC);

        let written = upsert_readings(&store, 1, &[reading(ts, 1.0), reading(ts, 5.0)])
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(store.count_readings(1).await, Ok(1));
        let rows = store
            .readings_in_range(1, ts, datetime!(2025-08-01 01:00:00 UTC))
            .await
            .unwrap();
        assert_eq!(rows[0].kwh, 5.0);
    }

    #[tokio::test]
    async fn failed_batch_leaves_prior_state() {
        let store = MemoryBillingStore::new();
        let ts = datetime!(2025-08-01 00:00:00 UTC);
        upsert_readings(&store, 1, &[reading(ts, 1.0)]).await.unwrap();

        store.set_fail_writes(true);
        let res = upsert_readings(
            &store,
            1,
            &[reading(ts, 9.0), reading(datetime!(2025-08-01 01:00:00 UTC), 9.0)],
        )
        .await;

        assert!(matches!(res, Err(StoreError::Write(_))));
        assert_eq!(store.count_readings(1).await, Ok(1));
        let rows = store
            .readings_in_range(1, ts, datetime!(2025-08-02 00:00:00 UTC))
            .await
            .unwrap();
        assert_eq!(rows[0].kwh, 1.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_overlapping_upserts_keep_one_row_per_instant() {
        let store = std::sync::Arc::new(MemoryBillingStore::new());
        let start = datetime!(2025-08-01 00:00:00 UTC);
        let instants: Vec<OffsetDateTime> = (0..24).map(|h| start + time::Duration::hours(h)).collect();

        let handles: Vec<_> = (0..8)
            .map(|writer| {
                let store = store.clone();
                let batch: Vec<MeterReading> = instants.iter().map(|ts| reading(*ts, writer as f64)).collect();
                tokio::spawn(async move { upsert_readings(store.as_ref(), 1, &batch).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(24));
        }

        assert_eq!(store.count_readings(1).await, Ok(24));
        let rows = store
            .readings_in_range(1, start, start + time::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 24);
        // whole batches land atomically, so one writer's values cover every instant
        assert!(rows.iter().all(|r| r.kwh == rows[0].kwh));
    }
}
