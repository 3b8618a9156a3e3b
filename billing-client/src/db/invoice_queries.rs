use anyhow::Result;
use sqlx::PgPool;

use crate::domain::{Invoice, NewInvoice};

pub async fn insert_invoice(pool: &PgPool, invoice: &NewInvoice) -> Result<Invoice> {
    let row = sqlx::query_as::<_, Invoice>(
        r#"
        INSERT INTO invoices (customer_id, period_start, period_end, total_eur)
        VALUES ($1, $2, $3, $4)
        RETURNING id, customer_id, period_start, period_end, total_eur, created_at
        "#,
    )
    .bind(invoice.customer_id)
    .bind(invoice.period_start)
    .bind(invoice.period_end)
    .bind(invoice.total_eur)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
