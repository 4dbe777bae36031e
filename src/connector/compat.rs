//! Pure compatibility checks over (mode, requested features). Evaluated while
//! the run is still idle: nothing is connected, nothing is written, so a
//! rejected request costs nothing.

use crate::column::{PartitionRole, TableDescriptor};
use crate::error::{ImportError, Result};

use super::Mode;

/// Everything a run asks of its connector, before any resource is acquired.
pub struct RequestedFeatures<'a> {
    /// Full table descriptor, partition roles included.
    pub table: &'a TableDescriptor,
    /// Requested column subset, `None` for all columns.
    pub projection: Option<&'a [String]>,
    /// Run-level values for the static partition keys.
    pub static_partition: &'a [(String, String)],
}

impl RequestedFeatures<'_> {
    fn projected(&self, column: &str) -> bool {
        match self.projection {
            None => true,
            Some(names) => names.iter().any(|n| n == column),
        }
    }
}

/// Reject unsupported (mode, feature) combinations. Everything this accepts
/// must be servable without a mid-run surprise.
pub fn check(mode: Mode, features: &RequestedFeatures) -> Result<()> {
    let table = features.table;

    // Partition sanity holds for both modes.
    for column in table.partition_columns() {
        if !features.projected(column.name()) {
            return Err(ImportError::Catalog {
                table: table.name().to_owned(),
                message: format!(
                    "partition key '{}' is not part of the projected schema",
                    column.name()
                ),
            });
        }
    }
    for column in table.columns() {
        let has_value = features
            .static_partition
            .iter()
            .any(|(name, _)| name == column.name());
        match column.partition_role() {
            PartitionRole::StaticKey if !has_value => {
                return Err(ImportError::Catalog {
                    table: table.name().to_owned(),
                    message: format!(
                        "no static partition value supplied for key column '{}'",
                        column.name()
                    ),
                });
            }
            PartitionRole::NotAKey | PartitionRole::DynamicKey if has_value => {
                return Err(ImportError::Catalog {
                    table: table.name().to_owned(),
                    message: format!(
                        "static partition value supplied for non-static column '{}'",
                        column.name()
                    ),
                });
            }
            _ => {}
        }
    }

    if mode == Mode::Generic {
        return Ok(());
    }

    // The native bulk path moves whole tables in the engine's wire format.
    // Everything below silently degrades or corrupts there, so it is rejected
    // up front.
    if table.has_binary_columns() {
        return Err(unsupported("binary/BLOB columns"));
    }
    if features.projection.is_some() {
        return Err(unsupported("column projection"));
    }
    if table.dynamic_key_columns().next().is_some() {
        return Err(unsupported("dynamic partitioning"));
    }
    Ok(())
}

fn unsupported(feature: &str) -> ImportError {
    ImportError::UnsupportedDirectModeFeature {
        feature: feature.to_owned(),
    }
}
