pub mod customer_queries;
pub mod invoice_queries;
pub mod reading_queries;
