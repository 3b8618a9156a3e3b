pub mod customer;
pub mod invoice;
pub mod reading;

pub use customer::Customer;
pub use invoice::{Invoice, NewInvoice};
pub use reading::{MeterReading, Reading};
