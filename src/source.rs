//! Contract towards the external relational source, plus an in-memory
//! implementation backing the verification harness and the test suite.
//!
//! The pipeline never resolves connection strings or credentials itself; it is
//! handed resolved values and a provider implementing this contract.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, RwLock};

use crate::catalog::text::{encode_field, TextFormat};
use crate::column::{shared_names, Row, TableDescriptor};
use crate::error::{ImportError, Result};
use crate::types::Value;

/// Resolved address of a source engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(pub String);

/// Resolved credentials. Direct mode hands these to the engine's native export
/// tool as a side channel; an open generic connection is not enough for it.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty()
    }
}

/// Factory for source connections.
pub trait SourceProvider: Send + Sync {
    fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Arc<dyn SourceConnection>>;
}

/// One open connection to the source engine. Implementations must be shareable
/// across the parallel readers of a run.
pub trait SourceConnection: Send + Sync {
    /// Total number of rows in the table. Used to split ranges across readers.
    fn row_count(&self, table: &str) -> Result<u64>;

    /// Fetch `len` rows starting at `offset` in the source's ordering key,
    /// projected to the descriptor's columns in declaration order. Blocking.
    fn fetch_range(&self, table: &TableDescriptor, offset: u64, len: u64) -> Result<Vec<Row>>;

    /// Start the engine's native bulk export of `table` and return its raw byte
    /// stream together with the wire format the engine emits. Credentials are
    /// passed explicitly because the native tool authenticates on its own.
    fn bulk_export(
        &self,
        table: &TableDescriptor,
        credentials: &Credentials,
    ) -> Result<(Box<dyn Read + Send>, TextFormat)>;
}

/// Rows of one in-memory table, keyed by column name.
struct MemoryTable {
    names: Vec<String>,
    rows: Vec<Vec<Value>>,
}

struct Inner {
    endpoint: Endpoint,
    tables: RwLock<HashMap<String, MemoryTable>>,
}

/// In-memory source engine. Accepts the endpoint it was created with, rejects
/// everything else with a connection error, like a real driver would.
#[derive(Clone)]
pub struct MemorySource {
    inner: Arc<Inner>,
}

impl MemorySource {
    pub fn new(endpoint: Endpoint) -> Self {
        MemorySource {
            inner: Arc::new(Inner {
                endpoint,
                tables: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create (or replace) a table and fill it with the given rows.
    pub fn load_table(&self, name: &str, names: Vec<String>, rows: Vec<Vec<Value>>) {
        let mut tables = self.inner.tables.write().unwrap();
        tables.insert(name.to_owned(), MemoryTable { names, rows });
    }
}

impl Inner {
    fn with_table<T>(&self, name: &str, f: impl FnOnce(&MemoryTable) -> Result<T>) -> Result<T> {
        let tables = self.tables.read().unwrap();
        let table = tables.get(name).ok_or_else(|| ImportError::Catalog {
            table: name.to_owned(),
            message: "source table does not exist".to_owned(),
        })?;
        f(table)
    }

    fn project_row(table: &MemoryTable, descriptor: &TableDescriptor, row: &[Value]) -> Vec<Value> {
        descriptor
            .columns()
            .iter()
            .map(|col| {
                table
                    .names
                    .iter()
                    .position(|n| n == col.name())
                    .map(|idx| row[idx].clone())
                    .unwrap_or(Value::Null)
            })
            .collect()
    }
}

impl SourceProvider for MemorySource {
    fn open(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Arc<dyn SourceConnection>> {
        if *endpoint != self.inner.endpoint {
            return Err(ImportError::Connection {
                endpoint: endpoint.0.clone(),
                message: "unknown endpoint".to_owned(),
            });
        }
        if credentials.is_empty() {
            return Err(ImportError::Connection {
                endpoint: endpoint.0.clone(),
                message: "missing credentials".to_owned(),
            });
        }
        Ok(Arc::new(MemoryConnection {
            inner: self.inner.clone(),
        }))
    }
}

struct MemoryConnection {
    inner: Arc<Inner>,
}

impl SourceConnection for MemoryConnection {
    fn row_count(&self, table: &str) -> Result<u64> {
        self.inner.with_table(table, |t| Ok(t.rows.len() as u64))
    }

    fn fetch_range(&self, table: &TableDescriptor, offset: u64, len: u64) -> Result<Vec<Row>> {
        let names = shared_names(table);
        self.inner.with_table(table.name(), |t| {
            let start = (offset as usize).min(t.rows.len());
            let end = ((offset + len) as usize).min(t.rows.len());
            Ok(t.rows[start..end]
                .iter()
                .map(|row| Row::new(names.clone(), Inner::project_row(t, table, row)))
                .collect())
        })
    }

    fn bulk_export(
        &self,
        table: &TableDescriptor,
        credentials: &Credentials,
    ) -> Result<(Box<dyn Read + Send>, TextFormat)> {
        if credentials.is_empty() {
            return Err(ImportError::Connection {
                endpoint: self.inner.endpoint.0.clone(),
                message: "bulk export tool requires explicit credentials".to_owned(),
            });
        }
        let format = TextFormat::bulk_wire();
        let mut out = String::new();
        self.inner.with_table(table.name(), |t| {
            for row in &t.rows {
                let projected = Inner::project_row(t, table, row);
                let fields: Vec<String> = projected
                    .iter()
                    .map(|value| encode_field(value, &format))
                    .collect();
                out.push_str(&fields.join(&format.field_delimiter.to_string()));
                out.push(format.record_delimiter);
            }
            Ok(())
        })?;
        Ok((Box::new(Cursor::new(out.into_bytes())), format))
    }
}
