use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::domain::{MeterReading, Reading};

/// Upsert readings for one customer inside a single transaction.
///
/// Rows are sent in statements of at most `chunk_size` rows to stay under the
/// bind-parameter limit; the transaction still covers the whole slice. The
/// caller must ensure `ts` values are distinct: Postgres refuses to update the
/// same row twice within one `ON CONFLICT` statement.
pub async fn upsert_readings(
    pool: &PgPool,
    customer_id: i64,
    readings: &[MeterReading],
    chunk_size: usize,
) -> Result<u64> {
    if readings.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut affected = 0;

    for chunk in readings.chunks(chunk_size.max(1)) {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO consumption_records (customer_id, ts, kwh, price_eur_per_kwh) ",
        );

        builder.push_values(chunk, |mut b, r| {
            b.push_bind(customer_id)
                .push_bind(r.ts)
                .push_bind(r.kwh)
                .push_bind(r.price_eur_per_kwh);
        });
        builder.push(
            " ON CONFLICT (customer_id, ts) DO UPDATE SET \
             kwh = EXCLUDED.kwh, \
             price_eur_per_kwh = EXCLUDED.price_eur_per_kwh",
        );

        affected += builder.build().execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(affected)
}

/// Fetch a customer's readings in `[start, end)`, ordered by instant.
pub async fn readings_in_range(
    pool: &PgPool,
    customer_id: i64,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<Reading>> {
    let rows = sqlx::query_as::<_, Reading>(
        r#"
        SELECT
            customer_id,
            ts,
            kwh,
            price_eur_per_kwh
        FROM consumption_records
        WHERE customer_id = $1
          AND ts >= $2
          AND ts <  $3
        ORDER BY ts
        "#,
    )
    .bind(customer_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn count_readings(pool: &PgPool, customer_id: i64) -> Result<u64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM consumption_records WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_one(pool)
            .await?;

    Ok(count.max(0) as u64)
}
