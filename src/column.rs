//! Column and table descriptions driving an import run.
//!
//! A [`ColumnSpec`] describes one column: its source type, the canonical type it
//! maps to, the value generated into the source for harness runs and the value
//! expected back out of the catalog. Descriptors are built before a run starts
//! and never mutated while it is in flight.

use std::sync::Arc;

use crate::error::{ImportError, Result};
use crate::types::{to_canonical, CanonicalType, SourceType, Value};

/// Role a column plays in partitioning the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
    NotAKey,
    /// Partition value fixed for the entire run, supplied by the caller.
    StaticKey,
    /// Partition value derived from this column's value in each row.
    DynamicKey,
}

/// Declarative description of a single import column.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    name: String,
    source_type: SourceType,
    canonical_type: CanonicalType,
    generated_value: Value,
    expected_value: Value,
    partition_role: PartitionRole,
}

impl ColumnSpec {
    /// Start building a column description. The canonical type is derived from
    /// the source type when the builder finishes; an unmapped source type fails
    /// the build, not the run.
    pub fn builder(name: impl Into<String>, source_type: SourceType) -> ColumnSpecBuilder {
        ColumnSpecBuilder {
            name: name.into(),
            source_type,
            generated_value: Value::Null,
            expected_value: Value::Null,
            partition_role: PartitionRole::NotAKey,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_type(&self) -> &SourceType {
        &self.source_type
    }

    pub fn canonical_type(&self) -> CanonicalType {
        self.canonical_type
    }

    pub fn generated_value(&self) -> &Value {
        &self.generated_value
    }

    pub fn expected_value(&self) -> &Value {
        &self.expected_value
    }

    pub fn partition_role(&self) -> PartitionRole {
        self.partition_role
    }
}

pub struct ColumnSpecBuilder {
    name: String,
    source_type: SourceType,
    generated_value: Value,
    expected_value: Value,
    partition_role: PartitionRole,
}

impl ColumnSpecBuilder {
    /// Value written into the source table for each generated row.
    pub fn generated(mut self, value: Value) -> Self {
        self.generated_value = value;
        self
    }

    /// Value expected back from the catalog after the round trip.
    pub fn expected(mut self, value: Value) -> Self {
        self.expected_value = value;
        self
    }

    pub fn partition_role(mut self, role: PartitionRole) -> Self {
        self.partition_role = role;
        self
    }

    pub fn build(self) -> Result<ColumnSpec> {
        let canonical_type = to_canonical(&self.name, &self.source_type)?;
        if !self.generated_value.fits(canonical_type) && !self.generated_value.is_null() {
            // Generated values are fed through the source as canonical values,
            // so a mismatch here is a harness bug surfaced early.
            return Err(ImportError::ValueOutOfRange {
                column: self.name,
                field_type: canonical_type,
            });
        }
        Ok(ColumnSpec {
            name: self.name,
            source_type: self.source_type,
            canonical_type,
            generated_value: self.generated_value,
            expected_value: self.expected_value,
            partition_role: self.partition_role,
        })
    }
}

/// Ordered description of a source table and its partitioning columns.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    name: String,
    columns: Arc<[ColumnSpec]>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        TableDescriptor {
            name: name.into(),
            columns: columns.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Columns taking part in partitioning, in declaration order.
    pub fn partition_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns
            .iter()
            .filter(|c| c.partition_role() != PartitionRole::NotAKey)
    }

    pub fn dynamic_key_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns
            .iter()
            .filter(|c| c.partition_role() == PartitionRole::DynamicKey)
    }

    /// `true` if any column carries binary data. Direct mode cannot move these.
    pub fn has_binary_columns(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.canonical_type() == CanonicalType::Binary)
    }

    /// Restrict the descriptor to the named columns, preserving their original
    /// order. Fails if a requested column does not exist.
    pub fn project(&self, names: &[String]) -> Result<TableDescriptor> {
        for name in names {
            if self.column(name).is_none() {
                return Err(ImportError::Catalog {
                    table: self.name.clone(),
                    message: format!("projected column '{name}' does not exist"),
                });
            }
        }
        let columns: Vec<ColumnSpec> = self
            .columns
            .iter()
            .filter(|c| names.iter().any(|n| n == c.name()))
            .cloned()
            .collect();
        Ok(TableDescriptor::new(self.name.clone(), columns))
    }
}

/// One extracted row together with the schema it was projected under. Carrying
/// the column names lets the writer validate dynamic partition keys against the
/// row's actual shape at write time.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    names: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(names: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Row { names, values }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.values[idx])
    }
}

/// Column names of a descriptor, shared across every row of a run.
pub fn shared_names(descriptor: &TableDescriptor) -> Arc<[String]> {
    descriptor
        .columns()
        .iter()
        .map(|c| c.name().to_owned())
        .collect()
}
