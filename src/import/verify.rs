//! Post-run verification: diff the persisted table against the expected values
//! declared on the column specs.

use crate::column::{Row, TableDescriptor};
use crate::types::Value;

/// One cell that came back different from the column's expected value.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    /// Index into the persisted rows, not the source order. Readers run in
    /// parallel, so there is no global source order to refer to.
    pub row: usize,
    pub column: String,
    pub expected: Value,
    pub actual: Value,
}

/// Compare every persisted row against the expected values. Returns the full
/// list of mismatches, never just the first. Since each column expects the same
/// value in every row, comparing row-wise is equivalent to comparing value
/// multisets and needs no ordering guarantee across readers.
pub fn verify(descriptor: &TableDescriptor, persisted: &[Row]) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    for (row_index, row) in persisted.iter().enumerate() {
        for column in descriptor.columns() {
            let actual = row.get(column.name()).cloned().unwrap_or(Value::Null);
            let expected = column.expected_value();
            if actual != *expected {
                mismatches.push(Mismatch {
                    row: row_index,
                    column: column.name().to_owned(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
    }
    mismatches
}
