// Shared types for the broadcast workspace: cell values, rows, batches and
// the resolved configuration.

pub mod config;
pub mod value;

pub use value::{parse_number, Batch, Row, Scalar};
