//! Record → row projection contract

use serde_json::Value;

/// One output row: text fields in header order
pub type Row = Vec<String>;

/// Projects decoded records onto a fixed column layout.
///
/// Implementations must be pure: no I/O, same input → same output.
/// `header()` and every row returned by `to_row()` share the same column order.
pub trait RowCodec: Send + Sync {
    /// Column names, in output order
    fn header(&self) -> Vec<String>;

    /// Convert one record, or `None` to skip it
    fn to_row(&self, record: &Value) -> Option<Row>;
}
