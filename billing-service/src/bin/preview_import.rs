use anyhow::{bail, Context, Result};
use billing_service::{config::AppConfig, normalize, observability, ImportPipeline};
use std::{env, fs};
use time::format_description::well_known::Rfc3339;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: preview_import <csv_path>");
    }
    let file_path = &args[1];
    let bytes = fs::read(file_path).with_context(|| format!("reading {file_path}"))?;

    let cfg = AppConfig::load()?;
    let zone = cfg.billing.zone()?;
    let pipeline = ImportPipeline::new(zone, cfg.import.schema());

    let preview = pipeline.preview(&bytes)?;

    let local = |ts: Option<time::OffsetDateTime>| -> Result<Option<String>> {
        ts.map(|t| -> Result<String> { Ok(normalize::to_local(zone, t)?.format(&Rfc3339)?) })
            .transpose()
    };
    let rejections: Vec<_> = preview
        .rejections
        .iter()
        .map(|r| serde_json::json!({ "line": r.line, "reason": r.reason }))
        .collect();

    let out = serde_json::json!({
        "rows": preview.rows,
        "accepted": preview.accepted,
        "rejected": preview.rejected,
        "first_ts": local(preview.first_ts)?,
        "last_ts": local(preview.last_ts)?,
        "digest": preview.digest,
        "rejections": rejections,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(())
}
