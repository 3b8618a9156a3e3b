use std::path::Path;

use crate::store::{BillingStore, StoreError};

/// Get-or-create a customer by display name and return its id.
///
/// Surrounding whitespace is trimmed before the exact-match lookup, so
/// `"Acme "` and `"Acme"` are the same customer. Case and inner spacing are
/// significant.
///
/// The lookup is only a fast path; creation goes through the store's atomic
/// insert-or-fetch, so concurrent first imports of the same name converge on
/// one row.
pub async fn resolve_or_create<S>(store: &S, name: &str) -> Result<i64, StoreError>
where
    S: BillingStore + ?Sized,
{
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidInput("customer name must not be empty".to_string()));
    }

    if let Some(existing) = store.get_customer_by_name(name).await? {
        return Ok(existing.id);
    }

    let customer = store.create_customer(name).await?;
    tracing::info!(customer_id = customer.id, name, "customer resolved");
    Ok(customer.id)
}

/// Customer label claimed by an upload: the file name without its extension.
pub fn customer_label_from_filename(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
