//! Generic row-at-a-time connector. One worker thread per logical reader, each
//! owning a disjoint row range split over the source's ordering key. Rows flow
//! through a bounded channel so extraction never runs far ahead of the writer.

use std::num::NonZeroUsize;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info};

use crate::column::{Row, TableDescriptor};
use crate::error::Result;
use crate::source::SourceConnection;

use super::{already_extracted, closed_handle, ConnectorHandle, Extraction};

pub(super) struct GenericHandle {
    connection: Option<Arc<dyn SourceConnection>>,
    mapper_count: NonZeroUsize,
    extracted: bool,
}

impl GenericHandle {
    pub(super) fn new(connection: Arc<dyn SourceConnection>, mapper_count: NonZeroUsize) -> Self {
        GenericHandle {
            connection: Some(connection),
            mapper_count,
            extracted: false,
        }
    }
}

impl ConnectorHandle for GenericHandle {
    fn extract(&mut self, table: &TableDescriptor, batch_rows: usize) -> Result<Extraction> {
        let connection = self.connection.as_ref().ok_or_else(closed_handle)?.clone();
        if self.extracted {
            return Err(already_extracted());
        }
        self.extracted = true;
        let total = connection.row_count(table.name())?;
        let stream = RowStream::spawn(
            connection,
            table.clone(),
            total,
            self.mapper_count.get(),
            batch_rows.max(1),
        )?;
        Ok(Extraction::Rows(stream))
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the last reference releases the connection. Workers of a
        // still-running extraction keep theirs until they finish.
        self.connection = None;
        Ok(())
    }
}

impl Drop for GenericHandle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Lazily extracted rows of one run. Finite; iterating to the end joins the
/// reader threads. Within one reader source order is preserved, across readers
/// no order is guaranteed.
pub struct RowStream {
    receiver: Option<Receiver<Result<Row>>>,
    readers: Vec<JoinHandle<()>>,
}

impl RowStream {
    fn spawn(
        connection: Arc<dyn SourceConnection>,
        table: TableDescriptor,
        total_rows: u64,
        mapper_count: usize,
        batch_rows: usize,
    ) -> Result<Self> {
        // Bounded to one batch in flight per reader.
        let (sender, receiver) = sync_channel(batch_rows * mapper_count);
        info!(
            "Extracting {} rows from '{}' with {} readers, {} rows per fetch.",
            total_rows,
            table.name(),
            mapper_count,
            batch_rows
        );
        let base = total_rows / mapper_count as u64;
        let remainder = total_rows % mapper_count as u64;
        let mut readers = Vec::with_capacity(mapper_count);
        let mut offset = 0;
        for index in 0..mapper_count {
            let len = base + if (index as u64) < remainder { 1 } else { 0 };
            let reader = std::thread::Builder::new()
                .name(format!("reader-{index}"))
                .spawn(reader_loop(
                    connection.clone(),
                    table.clone(),
                    offset,
                    len,
                    batch_rows as u64,
                    sender.clone(),
                ))?;
            readers.push(reader);
            offset += len;
        }
        drop(sender);
        Ok(RowStream {
            receiver: Some(receiver),
            readers,
        })
    }

    fn join_readers(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
    }
}

/// Body of one reader thread: fetch the assigned range batch-wise and push rows
/// downstream in source order. A send failure means the consumer is gone, so
/// the reader just stops.
fn reader_loop(
    connection: Arc<dyn SourceConnection>,
    table: TableDescriptor,
    range_start: u64,
    range_len: u64,
    batch_rows: u64,
    sender: SyncSender<Result<Row>>,
) -> impl FnOnce() + Send + 'static {
    move || {
        let range_end = range_start + range_len;
        let mut offset = range_start;
        while offset < range_end {
            let len = batch_rows.min(range_end - offset);
            match connection.fetch_range(&table, offset, len) {
                Ok(rows) => {
                    debug!("Fetched {} rows at offset {}.", rows.len(), offset);
                    for row in rows {
                        if sender.send(Ok(row)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = sender.send(Err(e));
                    return;
                }
            }
            offset += len;
        }
    }
}

impl Iterator for RowStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.receiver.as_ref()?.recv() {
            Ok(item) => Some(item),
            Err(_) => {
                // All senders dropped, the sequence is exhausted.
                self.receiver = None;
                self.join_readers();
                None
            }
        }
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        // Drop the channel first so readers blocked on a full channel wake up
        // and exit, then wait for them.
        self.receiver = None;
        self.join_readers();
    }
}
