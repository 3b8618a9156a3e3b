use billing_client::domain::MeterReading;
use chrono_tz::Tz;
use time::OffsetDateTime;

use crate::customers;
use crate::sources::{self, ColumnSchema, ValidationError};
use crate::store::{self, BillingStore, StoreError};
use crate::transform;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("upload rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("import not applied: {0}")]
    Store(#[from] StoreError),
    #[error("all {rejected} rows were rejected, first reason: {first_reason}")]
    NoAcceptedRows { rejected: usize, first_reason: String },
}

/// A row dropped from an otherwise valid upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub line: u64,
    pub reason: String,
}

/// What a commit would do, computed without touching the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPreview {
    pub rows: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub first_ts: Option<OffsetDateTime>,
    pub last_ts: Option<OffsetDateTime>,
    /// blake3 hex digest of the upload bytes.
    pub digest: String,
    pub rejections: Vec<RejectedRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub customer_id: i64,
    pub written: u64,
    pub rejected: usize,
    pub rejections: Vec<RejectedRow>,
}

struct PreparedBatch {
    rows: usize,
    readings: Vec<MeterReading>,
    rejections: Vec<RejectedRow>,
}

/// Upload bytes to stored readings: parse, normalize per row, resolve the
/// customer, then one atomic upsert.
#[derive(Debug, Clone)]
pub struct ImportPipeline {
    zone: Tz,
    schema: ColumnSchema,
}

impl ImportPipeline {
    pub fn new(zone: Tz, schema: ColumnSchema) -> Self {
        Self { zone, schema }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Structural validation is all-or-nothing; row problems drop the row.
    fn prepare(&self, bytes: &[u8]) -> Result<PreparedBatch, ValidationError> {
        let raw_rows = sources::parse(bytes, &self.schema)?;

        let mut readings = Vec::with_capacity(raw_rows.len());
        let mut rejections = Vec::new();
        for row in &raw_rows {
            match transform::row_to_reading(row, self.zone) {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    tracing::debug!(line = row.line, error = %e, "row rejected");
                    rejections.push(RejectedRow {
                        line: row.line,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !rejections.is_empty() {
            metrics::counter!("import_rows_rejected_total").increment(rejections.len() as u64);
        }

        Ok(PreparedBatch {
            rows: raw_rows.len(),
            readings,
            rejections,
        })
    }

    pub fn preview(&self, bytes: &[u8]) -> Result<ImportPreview, ValidationError> {
        let batch = self.prepare(bytes)?;

        Ok(ImportPreview {
            rows: batch.rows,
            accepted: batch.readings.len(),
            rejected: batch.rejections.len(),
            first_ts: batch.readings.iter().map(|r| r.ts).min(),
            last_ts: batch.readings.iter().map(|r| r.ts).max(),
            digest: blake3::hash(bytes).to_hex().to_string(),
            rejections: batch.rejections,
        })
    }

    /// Import an upload for the customer named `customer_label`.
    ///
    /// Nothing is written (not even the customer) when the upload is
    /// structurally invalid or no row survives normalization. A store failure
    /// leaves the previous readings intact and the whole call can be retried.
    pub async fn commit<S>(
        &self,
        store: &S,
        customer_label: &str,
        bytes: &[u8],
    ) -> Result<ImportOutcome, ImportError>
    where
        S: BillingStore + ?Sized,
    {
        let batch = self.prepare(bytes)?;
        if batch.readings.is_empty() {
            let first_reason = batch
                .rejections
                .first()
                .map(|r| format!("line {}: {}", r.line, r.reason))
                .unwrap_or_default();
            return Err(ImportError::NoAcceptedRows {
                rejected: batch.rejections.len(),
                first_reason,
            });
        }

        let customer_id = customers::resolve_or_create(store, customer_label).await?;
        let written = store::upsert_readings(store, customer_id, &batch.readings).await?;

        metrics::counter!("import_rows_written_total").increment(written);
        tracing::info!(
            customer_id,
            rows = batch.rows,
            written,
            rejected = batch.rejections.len(),
            "import committed"
        );

        Ok(ImportOutcome {
            customer_id,
            written,
            rejected: batch.rejections.len(),
            rejections: batch.rejections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{compute_total, BillingPeriod};
    use crate::normalize::DEFAULT_LOCAL_ZONE;
    use crate::store::MemoryBillingStore;
    use time::macros::datetime;

    const HEADER: &str = "Časovna Značka (CEST/CET);Poraba [kWh];Dinamične Cene [EUR/kWh]";

    fn upload(lines: &[&str]) -> Vec<u8> {
        let mut out = String::from(HEADER);
        for line in lines {
            out.push('\n');
            out.push_str(line);
        }
        out.into_bytes()
    }

    fn pipeline() -> ImportPipeline {
        ImportPipeline::new(DEFAULT_LOCAL_ZONE, ColumnSchema::default())
    }

    fn sample() -> Vec<u8> {
        upload(&[
            "2025-08-01 02:00:00;10;0,20",
            "2025-08-01 03:00:00;5;0,30",
            "2025-03-30 02:30:00;1;1",
            "not a time;1;1",
        ])
    }

    #[test]
    fn preview_reports_counts_and_range() {
        let preview = pipeline().preview(&sample()).unwrap();

        assert_eq!(preview.rows, 4);
        assert_eq!(preview.accepted, 2);
        assert_eq!(preview.rejected, 2);
        assert_eq!(preview.first_ts, Some(datetime!(2025-08-01 00:00:00 UTC)));
        assert_eq!(preview.last_ts, Some(datetime!(2025-08-01 01:00:00 UTC)));
        assert_eq!(preview.rejections[0].line, 4);
        assert_eq!(preview.rejections[1].line, 5);
        assert_eq!(preview.digest, blake3::hash(&sample()).to_hex().to_string());
    }

    #[tokio::test]
    async fn commit_writes_accepted_rows_and_counts_rejects() {
        let store = MemoryBillingStore::new();

        let outcome = pipeline().commit(&store, "ACME d.o.o.", &sample()).await.unwrap();

        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.rejected, 2);
        let period =
            BillingPeriod::new(datetime!(2025-08-01 00:00:00 UTC), datetime!(2025-08-02 00:00:00 UTC)).unwrap();
        let total = compute_total(&store, outcome.customer_id, &period).await.unwrap();
        assert!((total.total_eur - 3.5).abs() < 1e-9);
        assert_eq!(total.line_count, 2);
    }

    #[tokio::test]
    async fn recommitting_the_same_file_converges() {
        let store = MemoryBillingStore::new();
        let p = pipeline();

        let first = p.commit(&store, "Acme", &sample()).await.unwrap();
        let second = p.commit(&store, "Acme", &sample()).await.unwrap();

        assert_eq!(first.customer_id, second.customer_id);
        assert_eq!(store.count_readings(first.customer_id).await, Ok(2));
        assert_eq!(store.customer_count().await, 1);
    }

    #[tokio::test]
    async fn same_instant_twice_in_file_keeps_last() {
        let store = MemoryBillingStore::new();
        // the same instant written as local wall time and as UTC
        let bytes = upload(&["2025-08-01 02:00:00;1;1", "2025-08-01T00:00:00Z;7;1"]);

        let outcome = pipeline().commit(&store, "Acme", &bytes).await.unwrap();

        assert_eq!(outcome.written, 1);
        let rows = store
            .readings_in_range(
                outcome.customer_id,
                datetime!(2025-08-01 00:00:00 UTC),
                datetime!(2025-08-01 01:00:00 UTC),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kwh, 7.0);
    }

    #[tokio::test]
    async fn invalid_upload_writes_nothing() {
        let store = MemoryBillingStore::new();

        let res = pipeline().commit(&store, "Acme", b"a;b\n1;2").await;

        assert!(matches!(
            res,
            Err(ImportError::Validation(ValidationError::MissingColumns(_)))
        ));
        assert_eq!(store.customer_count().await, 0);
    }

    #[tokio::test]
    async fn blank_timestamp_rejects_upload_instead_of_row() {
        let store = MemoryBillingStore::new();
        let bytes = upload(&["2025-08-01 02:00:00;1;1", ";2;1"]);

        assert!(matches!(
            pipeline().preview(&bytes),
            Err(ValidationError::MissingValue { line: 3, .. })
        ));
        let res = pipeline().commit(&store, "Acme", &bytes).await;
        assert!(matches!(
            res,
            Err(ImportError::Validation(ValidationError::MissingValue { line: 3, .. }))
        ));
        assert_eq!(store.customer_count().await, 0);
    }

    #[tokio::test]
    async fn all_rows_rejected_writes_nothing() {
        let store = MemoryBillingStore::new();
        let bytes = upload(&["garbage;1;1", "2025-03-30 02:15;1;1"]);

        let res = pipeline().commit(&store, "Acme", &bytes).await;

        assert!(matches!(res, Err(ImportError::NoAcceptedRows { rejected: 2, .. })));
        assert_eq!(store.customer_count().await, 0);
    }

    #[tokio::test]
    async fn store_failure_fails_the_commit() {
        let store = MemoryBillingStore::new();
        store.set_fail_writes(true);

        let res = pipeline().commit(&store, "Acme", &sample()).await;

        assert!(matches!(res, Err(ImportError::Store(StoreError::Write(_)))));
    }

    #[tokio::test]
    async fn lenient_cells_are_stored_as_zero() {
        let store = MemoryBillingStore::new();
        let bytes = upload(&["2025-08-01 02:00:00;;0,20", "2025-08-01 03:00:00;n/a;0,20"]);

        let outcome = pipeline().commit(&store, "Acme", &bytes).await.unwrap();

        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.rejected, 0);
        let rows = store
            .readings_in_range(
                outcome.customer_id,
                datetime!(2025-08-01 00:00:00 UTC),
                datetime!(2025-08-02 00:00:00 UTC),
            )
            .await
            .unwrap();
        assert!(rows.iter().all(|r| r.kwh == 0.0));
    }
}
