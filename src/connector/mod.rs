//! Connector variants over the source engine, polymorphic over the capability
//! set {generic row read, direct bulk load}. Which variant may serve a given
//! request is decided by the pure checks in [`compat`] before any connection is
//! opened.

pub mod compat;
mod direct;
mod generic;

use std::io::Read;
use std::num::NonZeroUsize;

use crate::catalog::text::TextFormat;
use crate::column::TableDescriptor;
use crate::error::{ImportError, Result};
use crate::source::{Credentials, Endpoint, SourceProvider};

pub use self::generic::RowStream;

/// Execution mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Row-at-a-time readers over a generic connection. Portable, full feature
    /// set.
    Generic,
    /// The source engine's native bulk export piped straight into the catalog
    /// writer. Higher throughput, restricted feature subset.
    Direct,
}

/// Per-run connector configuration. Torn down when the run ends, never shared
/// across runs.
#[derive(Clone)]
pub struct ConnectorConfig {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
    pub mode: Mode,
    /// Number of parallel readers on the generic path.
    pub mapper_count: NonZeroUsize,
}

/// What an extraction yields: typed rows on the generic path, the engine's
/// opaque export stream on the direct path.
pub enum Extraction {
    Rows(RowStream),
    Bulk {
        stream: Box<dyn Read + Send>,
        wire: TextFormat,
    },
}

/// One open connector. The row sequence behind [`ConnectorHandle::extract`] is
/// finite and not restartable: a handle serves exactly one extraction.
pub trait ConnectorHandle: Send {
    /// Begin extracting the table. `batch_rows` bounds how many rows a reader
    /// fetches per round trip.
    fn extract(&mut self, table: &TableDescriptor, batch_rows: usize) -> Result<Extraction>;

    /// Idempotent. Also invoked on drop, so every exit path releases the
    /// connection exactly once.
    fn close(&mut self) -> Result<()>;
}

/// Open a connector of the configured mode against the source.
pub fn open(
    provider: &dyn SourceProvider,
    config: &ConnectorConfig,
) -> Result<Box<dyn ConnectorHandle>> {
    let connection = provider.open(&config.endpoint, &config.credentials)?;
    let handle: Box<dyn ConnectorHandle> = match config.mode {
        Mode::Generic => Box::new(generic::GenericHandle::new(
            connection,
            config.mapper_count,
        )),
        Mode::Direct => Box::new(direct::DirectHandle::new(
            connection,
            config.credentials.clone(),
        )),
    };
    Ok(handle)
}

fn already_extracted() -> ImportError {
    ImportError::Handle {
        message: "extraction sequence is not restartable".to_owned(),
    }
}

fn closed_handle() -> ImportError {
    ImportError::Handle {
        message: "handle is closed".to_owned(),
    }
}
