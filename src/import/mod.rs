//! The import orchestrator: drives one run through its state machine from
//! compatibility checks to verification.
//!
//! ```text
//! Idle -> ConnectionEstablished -> Extracting -> Writing -> Verifying
//!                                                             |
//!                                                 {Succeeded, Failed}
//! ```
//!
//! Feature checks happen at `Idle`, before any connection exists. Extracted
//! rows are handed to the catalog writer as they arrive; only one batch per
//! reader is ever in flight. Verification mismatches are data in the result,
//! not errors.

mod batch_size_limit;
mod verify;

pub use batch_size_limit::{estimated_bytes_per_row, BatchSizeLimit};
pub use verify::{verify, Mismatch};

use log::{info, warn};

use crate::catalog::{Catalog, CatalogWriter, CreateTableOptions};
use crate::column::TableDescriptor;
use crate::connector::{self, compat, ConnectorConfig, ConnectorHandle, Extraction};
use crate::error::{ImportError, Result};
use crate::source::SourceProvider;

/// Everything one run needs besides the connector configuration.
pub struct ImportRequest {
    pub table: TableDescriptor,
    /// Column subset to import, `None` for all columns.
    pub projection: Option<Vec<String>>,
    /// Values for the static partition key columns, fixed for the whole run.
    pub static_partition: Vec<(String, String)>,
    pub create: CreateTableOptions,
    /// Row count the verification step holds the run to.
    pub expected_rows: u64,
    pub batch_size: BatchSizeLimit,
}

impl ImportRequest {
    pub fn new(table: TableDescriptor, expected_rows: u64) -> Self {
        ImportRequest {
            table,
            projection: None,
            static_partition: Vec::new(),
            create: CreateTableOptions::default(),
            expected_rows,
            batch_size: BatchSizeLimit::default(),
        }
    }
}

/// Verdict of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

/// Outcome of one run, finalized exactly once. A failed verification still
/// yields an `ImportResult`; only aborted runs surface an error instead.
#[derive(Debug)]
pub struct ImportResult {
    pub rows_written: u64,
    pub mismatches: Vec<Mismatch>,
    pub outcome: RunOutcome,
}

impl ImportResult {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    ConnectionEstablished,
    Extracting,
    Writing,
    Verifying,
}

/// Drives import runs against one source provider and one catalog. Holds no
/// per-run state; every run gets its own configuration and request.
pub struct Importer<'a> {
    provider: &'a dyn SourceProvider,
    catalog: &'a dyn Catalog,
}

impl<'a> Importer<'a> {
    pub fn new(provider: &'a dyn SourceProvider, catalog: &'a dyn Catalog) -> Self {
        Importer { provider, catalog }
    }

    /// Execute one import run to completion.
    ///
    /// Returns `Ok` with a finalized [`ImportResult`] whenever the run reached
    /// the verifying state, even if the data came back wrong. Returns `Err` for
    /// configuration rejections (nothing happened) and aborted runs
    /// ([`ImportError::PartialWrite`] states how many rows are known durable).
    pub fn run(&self, config: &ConnectorConfig, request: &ImportRequest) -> Result<ImportResult> {
        let mut state = RunState::Idle;

        // Everything rejectable without I/O is rejected here.
        compat::check(
            config.mode,
            &compat::RequestedFeatures {
                table: &request.table,
                projection: request.projection.as_deref(),
                static_partition: &request.static_partition,
            },
        )?;
        let effective = match &request.projection {
            Some(names) => request.table.project(names)?,
            None => request.table.clone(),
        };

        self.catalog.create_table(&effective, &request.create)?;

        let mut handle = connector::open(self.provider, config)?;
        advance(&mut state, RunState::ConnectionEstablished);

        let result = self.extract_and_write(request, &effective, handle.as_mut(), state);

        // The drop guard would catch this as well, closing explicitly keeps
        // the close on the happy path observable in logs and tests.
        handle.close()?;
        result
    }

    fn extract_and_write(
        &self,
        request: &ImportRequest,
        effective: &TableDescriptor,
        handle: &mut dyn ConnectorHandle,
        mut state: RunState,
    ) -> Result<ImportResult> {
        let bytes_per_row = estimated_bytes_per_row(effective);
        let batch_rows = request.batch_size.batch_size_in_rows(bytes_per_row)?;
        info!(
            "Memory usage per row is {} bytes, batch size set to {} rows.",
            bytes_per_row, batch_rows
        );

        let mut writer = self
            .catalog
            .writer(effective, &request.static_partition)?;

        advance(&mut state, RunState::Extracting);
        let extraction = handle.extract(effective, batch_rows)?;

        advance(&mut state, RunState::Writing);
        match extraction {
            Extraction::Rows(stream) => {
                let mut rows_since_flush = 0usize;
                for item in stream {
                    let row = item.map_err(|e| partial(writer.as_ref(), e))?;
                    writer
                        .write_row(&row)
                        .map_err(|e| partial(writer.as_ref(), e))?;
                    rows_since_flush += 1;
                    if rows_since_flush >= batch_rows {
                        writer
                            .flush_batch()
                            .map_err(|e| partial(writer.as_ref(), e))?;
                        rows_since_flush = 0;
                    }
                }
            }
            Extraction::Bulk { mut stream, wire } => {
                writer
                    .write_bulk(stream.as_mut(), &wire)
                    .map_err(|e| partial(writer.as_ref(), e))?;
            }
        }
        let rows_written = writer
            .commit()
            .map_err(|e| partial(writer.as_ref(), e))?;

        advance(&mut state, RunState::Verifying);
        let persisted = self.catalog.read_all(effective.name())?;
        let mismatches = verify(effective, &persisted);
        let row_count_ok =
            rows_written == request.expected_rows && persisted.len() as u64 == rows_written;
        if !row_count_ok {
            warn!(
                "Row count off for '{}': expected {}, wrote {}, read back {}.",
                effective.name(),
                request.expected_rows,
                rows_written,
                persisted.len()
            );
        }
        if !mismatches.is_empty() {
            warn!(
                "{} value mismatches in '{}', first: {:?}.",
                mismatches.len(),
                effective.name(),
                mismatches[0]
            );
        }
        let outcome = if row_count_ok && mismatches.is_empty() {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed
        };
        info!("Run for '{}' finished: {:?}.", effective.name(), outcome);
        Ok(ImportResult {
            rows_written,
            mismatches,
            outcome,
        })
    }
}

fn advance(state: &mut RunState, to: RunState) {
    info!("Run state {:?} -> {:?}.", state, to);
    *state = to;
}

/// Wrap an extract/write error with the number of rows that made it to durable
/// storage before the abort.
fn partial(writer: &dyn CatalogWriter, cause: ImportError) -> ImportError {
    ImportError::PartialWrite {
        rows_committed: writer.rows_committed(),
        message: cause.to_string(),
    }
}
