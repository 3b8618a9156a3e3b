use billing_client::domain::{Customer, Invoice, NewInvoice};
use chrono_tz::Tz;
use serde::Serialize;
use time::macros::format_description;

use crate::billing::{compute_total, AggregationError, BillingPeriod};
use crate::normalize::{self, NormalizationError};
use crate::store::BillingStore;

/// Aggregate a customer's readings over `period` and persist the result as a
/// new invoice snapshot.
///
/// Fails without writing anything when the customer is unknown or the period
/// holds no readings; a zero invoice is never produced silently.
pub async fn issue_invoice<S>(
    store: &S,
    customer_id: i64,
    period: &BillingPeriod,
) -> Result<Invoice, AggregationError>
where
    S: BillingStore + ?Sized,
{
    if store.get_customer(customer_id).await?.is_none() {
        return Err(AggregationError::UnknownCustomer(customer_id));
    }

    let total = compute_total(store, customer_id, period).await?;
    if total.line_count == 0 {
        return Err(AggregationError::NoReadings {
            customer_id,
            start: period.start(),
            end: period.end(),
        });
    }

    let invoice = store
        .insert_invoice(&NewInvoice {
            customer_id,
            period_start: period.start(),
            period_end: period.end(),
            total_eur: total.total_eur,
        })
        .await?;

    metrics::counter!("invoices_issued_total").increment(1);
    tracing::info!(
        invoice_id = invoice.id,
        customer_id,
        lines = total.line_count,
        total_eur = invoice.total_eur,
        "invoice issued"
    );
    Ok(invoice)
}

/// Flat context handed to the invoice renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceContext {
    pub invoice_number: i64,
    pub customer_name: String,
    /// First billed local day, `YYYY-MM-DD`.
    pub period_start: String,
    /// Last billed local day, `YYYY-MM-DD` (the day before the exclusive end).
    pub period_end: String,
    /// Total rounded to cents.
    pub total: f64,
}

impl InvoiceContext {
    pub fn new(invoice: &Invoice, customer: &Customer, zone: Tz) -> Result<Self, NormalizationError> {
        let day = format_description!("[year]-[month]-[day]");
        let last_billed = invoice.period_end - time::Duration::nanoseconds(1);

        let local_day = |instant| -> Result<String, NormalizationError> {
            let local = normalize::to_local(zone, instant)?;
            local
                .format(day)
                .map_err(|e| NormalizationError::Unparsable(e.to_string()))
        };

        Ok(Self {
            invoice_number: invoice.id,
            customer_name: customer.name.clone(),
            period_start: local_day(invoice.period_start)?,
            period_end: local_day(last_billed)?,
            total: round_cents(invoice.total_eur),
        })
    }
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
