//! Limits on how many rows a reader keeps in flight between fetch and write.

use std::cmp::min;

use bytesize::ByteSize;

use crate::column::TableDescriptor;
use crate::error::{ImportError, Result};
use crate::types::{CanonicalType, SourceType};

#[cfg(target_pointer_width = "64")]
const DEFAULT_BATCH_SIZE_BYTES: ByteSize = ByteSize::mib(256);
#[cfg(target_pointer_width = "32")]
const DEFAULT_BATCH_SIZE_BYTES: ByteSize = ByteSize::mib(64);

/// Default upper bound on rows per fetch. Sources with narrow rows hit the
/// memory bound first anyway; this keeps per-fetch latency sane for wide ones.
const DEFAULT_BATCH_SIZE_ROWS: usize = u16::MAX as usize;

/// Batches can be limited by row count, by the memory the rows occupy, or both.
pub enum BatchSizeLimit {
    Rows(usize),
    Bytes(ByteSize),
    Both { rows: usize, memory: ByteSize },
}

impl BatchSizeLimit {
    pub fn new(num_rows_limit: Option<usize>, memory_limit: Option<ByteSize>) -> Self {
        match (num_rows_limit, memory_limit) {
            (Some(rows), None) => BatchSizeLimit::Rows(rows),
            (None, Some(memory)) => BatchSizeLimit::Bytes(memory),
            (None, None) => BatchSizeLimit::Both {
                rows: DEFAULT_BATCH_SIZE_ROWS,
                memory: DEFAULT_BATCH_SIZE_BYTES,
            },
            (Some(rows), Some(memory)) => BatchSizeLimit::Both { rows, memory },
        }
    }

    pub fn batch_size_in_rows(&self, mem_usage_per_row: usize) -> Result<usize> {
        let to_num_rows = |num_bytes: usize| {
            let rows = num_bytes / mem_usage_per_row.max(1);
            if rows == 0 {
                return Err(ImportError::Handle {
                    message: format!(
                        "memory limit of {num_bytes} bytes is smaller than a single row \
                        ({mem_usage_per_row} bytes); raise the batch memory limit"
                    ),
                });
            }
            Ok(rows)
        };

        match self {
            BatchSizeLimit::Rows(rows) => Ok(*rows),
            BatchSizeLimit::Bytes(memory) => to_num_rows(memory.as_u64() as usize),
            BatchSizeLimit::Both { rows, memory } => {
                let limit_rows = to_num_rows(memory.as_u64() as usize)?;
                Ok(min(limit_rows, *rows))
            }
        }
    }
}

impl Default for BatchSizeLimit {
    fn default() -> Self {
        BatchSizeLimit::new(None, None)
    }
}

/// Worst-case in-flight bytes for one row of the descriptor. Variable-length
/// columns count their declared source length.
pub fn estimated_bytes_per_row(descriptor: &TableDescriptor) -> usize {
    const ROW_OVERHEAD: usize = 48;
    descriptor
        .columns()
        .iter()
        .map(|column| match column.canonical_type() {
            CanonicalType::Boolean => 1,
            CanonicalType::Int | CanonicalType::Float | CanonicalType::Date => 4,
            CanonicalType::BigInt | CanonicalType::Double | CanonicalType::Timestamp => 8,
            CanonicalType::Decimal { .. } => 16,
            CanonicalType::Str | CanonicalType::Binary => match column.source_type() {
                SourceType::Char(len)
                | SourceType::Varchar(len)
                | SourceType::Binary(len)
                | SourceType::Varbinary(len) => *len,
                _ => 256,
            },
        })
        .sum::<usize>()
        + ROW_OVERHEAD
}
