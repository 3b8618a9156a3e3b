use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicBool, Ordering},
};

use billing_client::domain::{Customer, Invoice, MeterReading, NewInvoice, Reading};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::{BillingStore, StoreError};

#[derive(Default)]
struct State {
    customers: Vec<Customer>,
    customer_ids: HashMap<String, i64>,
    readings: BTreeMap<(i64, OffsetDateTime), Reading>,
    invoices: Vec<Invoice>,
}

/// In-process store with the same uniqueness and atomicity rules as the
/// Postgres schema. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryBillingStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

impl MemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail without touching state.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("store is failing writes".to_string()));
        }
        Ok(())
    }

    pub async fn invoices(&self) -> Vec<Invoice> {
        self.state.lock().await.invoices.clone()
    }

    pub async fn customer_count(&self) -> usize {
        self.state.lock().await.customers.len()
    }
}

#[async_trait::async_trait]
impl BillingStore for MemoryBillingStore {
    async fn get_customer_by_name(&self, name: &str) -> Result<Option<Customer>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.customer_ids.get(name).map(|&id| Customer {
            id,
            name: name.to_string(),
        }))
    }

    async fn get_customer(&self, id: i64) -> Result<Option<Customer>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.customers.iter().find(|c| c.id == id).cloned())
    }

    async fn create_customer(&self, name: &str) -> Result<Customer, StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;

        if let Some(&id) = state.customer_ids.get(name) {
            return Ok(Customer {
                id,
                name: name.to_string(),
            });
        }

        let customer = Customer {
            id: state.customers.len() as i64 + 1,
            name: name.to_string(),
        };
        state.customer_ids.insert(customer.name.clone(), customer.id);
        state.customers.push(customer.clone());
        Ok(customer)
    }

    async fn bulk_upsert_readings(
        &self,
        customer_id: i64,
        readings: &[MeterReading],
    ) -> Result<u64, StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;

        for reading in readings {
            state
                .readings
                .insert((customer_id, reading.ts), reading.for_customer(customer_id));
        }

        Ok(readings.len() as u64)
    }

    async fn readings_in_range(
        &self,
        customer_id: i64,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Reading>, StoreError> {
        if start >= end {
            return Ok(Vec::new());
        }

        let state = self.state.lock().await;
        Ok(state
            .readings
            .range((customer_id, start)..(customer_id, end))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn count_readings(&self, customer_id: i64) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.readings.keys().filter(|(c, _)| *c == customer_id).count() as u64)
    }

    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, StoreError> {
        self.check_writable()?;
        if invoice.period_start >= invoice.period_end {
            return Err(StoreError::InvalidInput(
                "invoice period_start must precede period_end".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let row = Invoice {
            id: state.invoices.len() as i64 + 1,
            customer_id: invoice.customer_id,
            period_start: invoice.period_start,
            period_end: invoice.period_end,
            total_eur: invoice.total_eur,
            created_at: OffsetDateTime::now_utc(),
        };
        state.invoices.push(row.clone());
        Ok(row)
    }
}
