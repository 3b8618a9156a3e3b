use anyhow::{bail, Context, Result};
use billing_service::{
    config::AppConfig,
    customers::customer_label_from_filename,
    observability,
    store::{BillingStore, MemoryBillingStore, PgBillingStore},
    ImportPipeline,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, fs};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let dry_run = args.iter().any(|a| a == "--dry-run");
    args.retain(|a| a != "--dry-run");
    if args.is_empty() {
        bail!("usage: import_readings <csv_path> [customer_name] [--dry-run]");
    }
    let file_path = &args[0];

    let customer = match args.get(1) {
        Some(name) => name.clone(),
        None => customer_label_from_filename(file_path)
            .with_context(|| format!("cannot derive a customer name from '{file_path}'"))?,
    };

    let bytes = fs::read(file_path).with_context(|| format!("reading {file_path}"))?;

    // Load configuration (point BILLING_CONFIG elsewhere for a different deployment).
    let cfg = AppConfig::load()?;
    let pipeline = ImportPipeline::new(cfg.billing.zone()?, cfg.import.schema());

    let store: Box<dyn BillingStore> = if dry_run {
        Box::new(MemoryBillingStore::new())
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.database.max_connections)
            .connect(&cfg.database.uri)
            .await?;
        Box::new(PgBillingStore::new(
            pool,
            cfg.store.chunk_size,
            cfg.store.max_retries,
            cfg.store.retry_backoff(),
        ))
    };

    let outcome = pipeline.commit(store.as_ref(), &customer, &bytes).await?;

    for rejection in &outcome.rejections {
        tracing::warn!(line = rejection.line, reason = %rejection.reason, "row rejected");
    }
    tracing::info!(
        customer = %customer,
        customer_id = outcome.customer_id,
        written = outcome.written,
        rejected = outcome.rejected,
        dry_run,
        "import finished"
    );

    Ok(())
}
