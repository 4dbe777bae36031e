//! Bulk import of typed rows from a relational source into a partitioned,
//! schema-typed catalog.
//!
//! The pipeline translates each column through three type systems (source SQL
//! type, canonical type, catalog field type), extracts rows either through
//! generic parallel readers or the source engine's native bulk export, persists
//! them partitioned, and verifies the round trip.
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//!
//! use sql2catalog::catalog::fs::FsCatalog;
//! use sql2catalog::column::{ColumnSpec, TableDescriptor};
//! use sql2catalog::connector::{ConnectorConfig, Mode};
//! use sql2catalog::generator::seed_source;
//! use sql2catalog::import::{ImportRequest, Importer};
//! use sql2catalog::source::{Credentials, Endpoint, MemorySource};
//! use sql2catalog::types::{SourceType, Value};
//!
//! # fn main() -> Result<(), sql2catalog::error::ImportError> {
//! let table = TableDescriptor::new(
//!     "orders",
//!     vec![ColumnSpec::builder("id", SourceType::Integer)
//!         .generated(Value::Int(1000))
//!         .expected(Value::Int(1000))
//!         .build()?],
//! );
//! let source = MemorySource::new(Endpoint("nz://db1".to_owned()));
//! seed_source(&source, &table, 10);
//! let catalog = FsCatalog::new("/tmp/warehouse");
//!
//! let config = ConnectorConfig {
//!     endpoint: Endpoint("nz://db1".to_owned()),
//!     credentials: Credentials::new("admin", "secret"),
//!     mode: Mode::Generic,
//!     mapper_count: NonZeroUsize::new(1).unwrap(),
//! };
//! let result = Importer::new(&source, &catalog).run(&config, &ImportRequest::new(table, 10))?;
//! assert!(result.is_success());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod column;
pub mod connector;
pub mod error;
pub mod generator;
pub mod import;
pub mod source;
pub mod types;

pub use catalog::{Catalog, CatalogWriter, CreateTableOptions, StorageFormat};
pub use column::{ColumnSpec, PartitionRole, Row, TableDescriptor};
pub use connector::{ConnectorConfig, Mode};
pub use error::ImportError;
pub use import::{ImportRequest, ImportResult, Importer, RunOutcome};
pub use types::{CanonicalType, CatalogFieldType, DecimalEncoding, SourceType, Value};
