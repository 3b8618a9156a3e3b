use anyhow::{bail, Result};
use billing_service::{
    billing::BillingPeriod,
    config::AppConfig,
    invoice::{issue_invoice, InvoiceContext},
    observability,
    store::{BillingStore, PgBillingStore},
};
use sqlx::postgres::PgPoolOptions;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if !matches!(args.len(), 3 | 4) {
        bail!("usage: create_invoice <customer_name> <YYYY-MM | period_start period_end>");
    }

    let cfg = AppConfig::load()?;
    let zone = cfg.billing.zone()?;

    let customer_name = &args[1];
    let period = match &args[2..] {
        [month] => BillingPeriod::month(zone, month)?,
        [start, end] => BillingPeriod::local_bounds(zone, start, end)?,
        _ => bail!("expected a month or a start and end"),
    };

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;
    let store = PgBillingStore::new(
        pool,
        cfg.store.chunk_size,
        cfg.store.max_retries,
        cfg.store.retry_backoff(),
    );

    let Some(customer) = store.get_customer_by_name(customer_name).await? else {
        bail!("unknown customer '{customer_name}'");
    };

    let invoice = issue_invoice(&store, customer.id, &period).await?;
    let context = InvoiceContext::new(&invoice, &customer, zone)?;
    println!("{}", serde_json::to_string_pretty(&context)?);

    Ok(())
}
