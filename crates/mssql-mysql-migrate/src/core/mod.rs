//! Core data structures shared by the source, target and transfer modules.

pub mod schema;
pub mod value;

pub use schema::{ColumnDescriptor, TableSchema};
pub use value::SqlValue;
