//! Direct connector: delegates extraction to the source engine's native bulk
//! export tool and hands its byte stream through untouched. Feature gaps of
//! this path are enforced in [`super::compat`] before a handle ever exists.

use std::sync::Arc;

use log::info;

use crate::column::TableDescriptor;
use crate::error::Result;
use crate::source::{Credentials, SourceConnection};

use super::{already_extracted, closed_handle, ConnectorHandle, Extraction};

pub(super) struct DirectHandle {
    connection: Option<Arc<dyn SourceConnection>>,
    /// The native export tool authenticates on its own, so the credentials are
    /// carried here as a side channel next to the open connection.
    credentials: Credentials,
    extracted: bool,
}

impl DirectHandle {
    pub(super) fn new(connection: Arc<dyn SourceConnection>, credentials: Credentials) -> Self {
        DirectHandle {
            connection: Some(connection),
            credentials,
            extracted: false,
        }
    }
}

impl ConnectorHandle for DirectHandle {
    fn extract(&mut self, table: &TableDescriptor, _batch_rows: usize) -> Result<Extraction> {
        let connection = self.connection.as_ref().ok_or_else(closed_handle)?;
        if self.extracted {
            return Err(already_extracted());
        }
        self.extracted = true;
        info!("Starting native bulk export of '{}'.", table.name());
        let (stream, wire) = connection.bulk_export(table, &self.credentials)?;
        Ok(Extraction::Bulk { stream, wire })
    }

    fn close(&mut self) -> Result<()> {
        self.connection = None;
        Ok(())
    }
}

impl Drop for DirectHandle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
