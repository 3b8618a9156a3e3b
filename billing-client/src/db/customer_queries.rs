use anyhow::Result;
use sqlx::PgPool;

use crate::domain::Customer;

pub async fn customer_by_name(pool: &PgPool, name: &str) -> Result<Option<Customer>> {
    let row = sqlx::query_as::<_, Customer>("SELECT id, name FROM customers WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn customer_by_id(pool: &PgPool, id: i64) -> Result<Option<Customer>> {
    let row = sqlx::query_as::<_, Customer>("SELECT id, name FROM customers WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Insert a customer or return the existing row with the same name.
///
/// Relies on the unique constraint on `customers.name`. The no-op update makes
/// `RETURNING` yield the existing row on conflict, so two concurrent callers
/// racing on a new name both get the same id.
pub async fn insert_or_fetch_customer(pool: &PgPool, name: &str) -> Result<Customer> {
    let row = sqlx::query_as::<_, Customer>(
        r#"
        INSERT INTO customers (name)
        VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, name
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
