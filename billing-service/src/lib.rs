pub mod billing;
pub mod config;
pub mod customers;
pub mod invoice;
pub mod normalize;
pub mod observability;
pub mod pipeline;
pub mod sources;
pub mod store;
pub mod transform;

pub use pipeline::{ImportOutcome, ImportPipeline, ImportPreview};
