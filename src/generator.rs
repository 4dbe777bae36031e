//! Row generation for verification runs: turns the generated values declared on
//! a descriptor's column specs into source rows, and seeds them into a source.

use crate::column::TableDescriptor;
use crate::source::MemorySource;
use crate::types::Value;

/// Materialize `count` source rows from the descriptor's generated values, in
/// declaration order.
pub fn generate_rows(descriptor: &TableDescriptor, count: u64) -> Vec<Vec<Value>> {
    let template: Vec<Value> = descriptor
        .columns()
        .iter()
        .map(|c| c.generated_value().clone())
        .collect();
    (0..count).map(|_| template.clone()).collect()
}

/// Create the source table named by the descriptor and fill it with `count`
/// generated rows.
pub fn seed_source(source: &MemorySource, descriptor: &TableDescriptor, count: u64) {
    let names = descriptor
        .columns()
        .iter()
        .map(|c| c.name().to_owned())
        .collect();
    source.load_table(descriptor.name(), names, generate_rows(descriptor, count));
}
