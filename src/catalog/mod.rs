//! Destination catalog contract: schema-typed tables, partitioned storage,
//! table auto-creation. The pipeline calls a catalog, it does not implement
//! one; the filesystem-backed implementation in [`fs`] is the one the harness
//! and tests run against.

pub mod fs;
pub mod sequence;
pub mod text;

use std::io::Read;

use crate::column::{Row, TableDescriptor};
use crate::error::Result;
use crate::types::{CatalogFieldType, DecimalEncoding};

use self::text::{DelimiterPolicy, TextFormat};

/// On-disk layout of a table's data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageFormat {
    #[default]
    TextFile,
    SequenceFile,
}

/// Options for [`Catalog::create_table`].
#[derive(Debug, Clone, Default)]
pub struct CreateTableOptions {
    /// Replace a pre-existing table of the same name. Without this flag a
    /// pre-existing table fails the run before any data moves.
    pub overwrite_existing: bool,
    pub storage_format: StorageFormat,
    /// Only consulted for text storage.
    pub delimiter_policy: DelimiterPolicy,
    /// How decimal columns are registered, see [`DecimalEncoding`].
    pub decimal_encoding: DecimalEncoding,
}

/// Catalog/schema service consumed by the orchestrator.
pub trait Catalog: Send + Sync {
    fn table_exists(&self, table: &str) -> bool;

    /// Register the table's schema and prepare its storage location.
    fn create_table(&self, descriptor: &TableDescriptor, options: &CreateTableOptions)
        -> Result<()>;

    /// Field types as registered, in declaration order.
    fn field_types(&self, table: &str) -> Result<Vec<(String, CatalogFieldType)>>;

    /// Registered partitions, as `key=value` path segments joined by `/`.
    /// Unpartitioned tables report a single empty string.
    fn partitions(&self, table: &str) -> Result<Vec<String>>;

    /// Open a writer for one import run. Static partition values cover every
    /// static key column of the descriptor for the whole run.
    fn writer(
        &self,
        descriptor: &TableDescriptor,
        static_partition: &[(String, String)],
    ) -> Result<Box<dyn CatalogWriter>>;

    /// Every persisted row of the table, partition columns merged back in at
    /// their declared positions. No cross-partition ordering guarantee.
    fn read_all(&self, table: &str) -> Result<Vec<Row>>;
}

/// Append-only writer for one run. Writes become durable in batches: rows
/// buffered since the last flush are lost on abort, flushed rows stay.
pub trait CatalogWriter: Send {
    /// Persist one typed row. Dynamic partition keys are derived from the row
    /// and must be present in the row's actual schema.
    fn write_row(&mut self, row: &Row) -> Result<()>;

    /// Bulk-load entry point for the direct path: decode the engine's export
    /// stream chunk-wise and persist it. Returns the number of rows loaded.
    fn write_bulk(&mut self, stream: &mut dyn Read, wire: &TextFormat) -> Result<u64>;

    /// Make everything buffered so far durable.
    fn flush_batch(&mut self) -> Result<()>;

    /// Rows known durable so far.
    fn rows_committed(&self) -> u64;

    /// Final flush plus partition registration. Must be called exactly once on
    /// the success path; an uncommitted writer keeps its flushed rows but
    /// registers nothing new on drop.
    fn commit(&mut self) -> Result<u64>;
}
