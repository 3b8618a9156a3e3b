pub mod consumption_csv;

pub use consumption_csv::{parse, ColumnSchema, RawRow, ValidationError};
