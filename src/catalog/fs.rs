//! Filesystem-backed catalog. One directory per table, one subdirectory per
//! partition (`key=value` segments), data in numbered part files. Part files
//! are staged through temp files in the table directory and persisted with an
//! atomic rename, so readers never observe a half-written file.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::column::{PartitionRole, Row, TableDescriptor};
use crate::error::{ImportError, Result};
use crate::types::{to_catalog_field, CanonicalType, CatalogFieldType, Value};

use super::sequence;
use super::text::{decode_field, encode_field, DelimiterPolicy, TextFormat};
use super::{Catalog, CatalogWriter, CreateTableOptions, StorageFormat};

/// Rows decoded per chunk on the bulk-load path before flushing.
const BULK_CHUNK_ROWS: u64 = 4096;

#[derive(Debug, Clone)]
struct ColumnMeta {
    name: String,
    canonical: CanonicalType,
    field_type: CatalogFieldType,
    role: PartitionRole,
}

struct TableMeta {
    columns: Vec<ColumnMeta>,
    format: StorageFormat,
    policy: DelimiterPolicy,
    partitions: BTreeSet<String>,
}

struct Inner {
    root: PathBuf,
    tables: RwLock<HashMap<String, TableMeta>>,
}

impl Inner {
    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    fn catalog_err(table: &str, message: impl Into<String>) -> ImportError {
        ImportError::Catalog {
            table: table.to_owned(),
            message: message.into(),
        }
    }
}

/// Catalog rooted at a directory. Cloning shares the underlying registry.
#[derive(Clone)]
pub struct FsCatalog {
    inner: Arc<Inner>,
}

impl FsCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsCatalog {
            inner: Arc::new(Inner {
                root: root.into(),
                tables: RwLock::new(HashMap::new()),
            }),
        }
    }
}

impl Catalog for FsCatalog {
    fn table_exists(&self, table: &str) -> bool {
        self.inner.tables.read().unwrap().contains_key(table)
    }

    fn create_table(
        &self,
        descriptor: &TableDescriptor,
        options: &CreateTableOptions,
    ) -> Result<()> {
        let name = descriptor.name();
        let dir = self.inner.table_dir(name);
        {
            let mut tables = self.inner.tables.write().unwrap();
            if tables.contains_key(name) {
                if !options.overwrite_existing {
                    return Err(Inner::catalog_err(name, "table already exists"));
                }
                tables.remove(name);
                if dir.exists() {
                    fs::remove_dir_all(&dir)?;
                }
            }
            let columns: Vec<ColumnMeta> = descriptor
                .columns()
                .iter()
                .map(|col| ColumnMeta {
                    name: col.name().to_owned(),
                    canonical: col.canonical_type(),
                    field_type: to_catalog_field(col.canonical_type(), options.decimal_encoding),
                    role: col.partition_role(),
                })
                .collect();
            fs::create_dir_all(&dir)?;
            write_schema_file(&dir, &columns, options.storage_format)?;
            info!(
                "Created table '{}' with {} columns ({} partition keys).",
                name,
                columns.len(),
                columns
                    .iter()
                    .filter(|c| c.role != PartitionRole::NotAKey)
                    .count()
            );
            tables.insert(
                name.to_owned(),
                TableMeta {
                    columns,
                    format: options.storage_format,
                    policy: options.delimiter_policy.clone(),
                    partitions: BTreeSet::new(),
                },
            );
        }
        Ok(())
    }

    fn field_types(&self, table: &str) -> Result<Vec<(String, CatalogFieldType)>> {
        let tables = self.inner.tables.read().unwrap();
        let meta = tables
            .get(table)
            .ok_or_else(|| Inner::catalog_err(table, "no such table"))?;
        Ok(meta
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.field_type))
            .collect())
    }

    fn partitions(&self, table: &str) -> Result<Vec<String>> {
        let tables = self.inner.tables.read().unwrap();
        let meta = tables
            .get(table)
            .ok_or_else(|| Inner::catalog_err(table, "no such table"))?;
        Ok(meta.partitions.iter().cloned().collect())
    }

    fn writer(
        &self,
        descriptor: &TableDescriptor,
        static_partition: &[(String, String)],
    ) -> Result<Box<dyn CatalogWriter>> {
        let table = descriptor.name();
        let (columns, format, policy) = {
            let tables = self.inner.tables.read().unwrap();
            let meta = tables
                .get(table)
                .ok_or_else(|| Inner::catalog_err(table, "no such table"))?;
            (meta.columns.clone(), meta.format, meta.policy.clone())
        };
        for column in columns.iter().filter(|c| c.role == PartitionRole::StaticKey) {
            match static_partition.iter().find(|(name, _)| *name == column.name) {
                None => {
                    return Err(Inner::catalog_err(
                        table,
                        format!("no static partition value for key column '{}'", column.name),
                    ));
                }
                Some((_, value)) if value.contains(['/', '\\']) => {
                    return Err(Inner::catalog_err(
                        table,
                        format!(
                            "static partition value for '{}' contains a path separator",
                            column.name
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(Box::new(FsWriter {
            inner: self.inner.clone(),
            table: table.to_owned(),
            columns,
            format,
            policy,
            static_partition: static_partition.to_vec(),
            buffers: HashMap::new(),
            part_counter: 0,
            committed: 0,
            done: false,
        }))
    }

    fn read_all(&self, table: &str) -> Result<Vec<Row>> {
        let tables = self.inner.tables.read().unwrap();
        let meta = tables
            .get(table)
            .ok_or_else(|| Inner::catalog_err(table, "no such table"))?;
        let names: Arc<[String]> = meta.columns.iter().map(|c| c.name.clone()).collect();
        let data_columns: Vec<&ColumnMeta> = meta
            .columns
            .iter()
            .filter(|c| c.role == PartitionRole::NotAKey)
            .collect();
        let mut rows = Vec::new();
        for partition in &meta.partitions {
            let partition_values = decode_partition_values(table, &meta.columns, partition)?;
            let dir = partition_dir(&self.inner.table_dir(table), partition);
            let mut part_files: Vec<PathBuf> = fs::read_dir(&dir)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("part-"))
                })
                .collect();
            part_files.sort();
            for path in part_files {
                for data_values in read_part_file(&path, meta.format, &data_columns)? {
                    let mut data_iter = data_values.into_iter();
                    let values: Vec<Value> = meta
                        .columns
                        .iter()
                        .map(|column| {
                            if column.role == PartitionRole::NotAKey {
                                data_iter.next().expect("field count checked on decode")
                            } else {
                                partition_values[&column.name].clone()
                            }
                        })
                        .collect();
                    rows.push(Row::new(names.clone(), values));
                }
            }
        }
        Ok(rows)
    }
}

fn write_schema_file(dir: &Path, columns: &[ColumnMeta], format: StorageFormat) -> Result<()> {
    let mut out = String::new();
    for column in columns {
        let role = match column.role {
            PartitionRole::NotAKey => "data",
            PartitionRole::StaticKey | PartitionRole::DynamicKey => "partition",
        };
        out.push_str(&format!("{}\t{}\t{}\n", column.name, column.canonical, role));
    }
    out.push_str(&format!(
        "# storage: {}\n",
        match format {
            StorageFormat::TextFile => "text",
            StorageFormat::SequenceFile => "sequence",
        }
    ));
    fs::write(dir.join("_schema"), out)?;
    Ok(())
}

fn partition_dir(table_dir: &Path, partition: &str) -> PathBuf {
    if partition.is_empty() {
        table_dir.to_owned()
    } else {
        partition
            .split('/')
            .fold(table_dir.to_owned(), |dir, seg| dir.join(seg))
    }
}

fn decode_partition_values(
    table: &str,
    columns: &[ColumnMeta],
    partition: &str,
) -> Result<HashMap<String, Value>> {
    let mut values = HashMap::new();
    if partition.is_empty() {
        return Ok(values);
    }
    for segment in partition.split('/') {
        let (name, text) = segment
            .split_once('=')
            .ok_or_else(|| Inner::catalog_err(table, format!("malformed partition '{segment}'")))?;
        let column = columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Inner::catalog_err(table, format!("unknown partition key '{name}'")))?;
        values.insert(name.to_owned(), decode_field(text, column.canonical, name)?);
    }
    Ok(values)
}

fn read_part_file(
    path: &Path,
    format: StorageFormat,
    data_columns: &[&ColumnMeta],
) -> Result<Vec<Vec<Value>>> {
    match format {
        StorageFormat::TextFile => {
            let text_format = TextFormat::catalog();
            let content = fs::read_to_string(path)?;
            let mut rows = Vec::new();
            for record in content
                .split(text_format.record_delimiter)
                .filter(|r| !r.is_empty())
            {
                let fields: Vec<&str> = record.split(text_format.field_delimiter).collect();
                if fields.len() != data_columns.len() {
                    return Err(ImportError::Catalog {
                        table: String::new(),
                        message: format!(
                            "record in '{}' has {} fields, schema has {}",
                            path.display(),
                            fields.len(),
                            data_columns.len()
                        ),
                    });
                }
                let values = fields
                    .iter()
                    .zip(data_columns)
                    .map(|(field, column)| decode_field(field, column.canonical, &column.name))
                    .collect::<Result<Vec<Value>>>()?;
                rows.push(values);
            }
            Ok(rows)
        }
        StorageFormat::SequenceFile => {
            let columns: Vec<(String, CanonicalType)> = data_columns
                .iter()
                .map(|c| (c.name.clone(), c.canonical))
                .collect();
            let mut file = fs::File::open(path)?;
            sequence::read_records(&mut file, &columns)
        }
    }
}

/// Per-partition buffer of encoded rows not yet durable.
struct PartitionBuffer {
    bytes: Vec<u8>,
    rows: u64,
}

struct FsWriter {
    inner: Arc<Inner>,
    table: String,
    columns: Vec<ColumnMeta>,
    format: StorageFormat,
    policy: DelimiterPolicy,
    static_partition: Vec<(String, String)>,
    buffers: HashMap<String, PartitionBuffer>,
    part_counter: u64,
    committed: u64,
    done: bool,
}

impl FsWriter {
    /// Resolve the partition path segments for one row. Static keys come from
    /// the run-level assignment, dynamic keys from the row itself.
    fn partition_for(&self, row: &Row) -> Result<String> {
        let mut segments = Vec::new();
        for column in &self.columns {
            match column.role {
                PartitionRole::NotAKey => {}
                PartitionRole::StaticKey => {
                    let value = self
                        .static_partition
                        .iter()
                        .find(|(name, _)| *name == column.name)
                        .map(|(_, value)| value.clone())
                        .expect("checked when the writer was opened");
                    segments.push(format!("{}={}", column.name, value));
                }
                PartitionRole::DynamicKey => {
                    let value = row.get(&column.name).ok_or_else(|| {
                        Inner::catalog_err(
                            &self.table,
                            format!(
                                "dynamic partition key '{}' missing from row schema",
                                column.name
                            ),
                        )
                    })?;
                    if value.is_null() {
                        return Err(Inner::catalog_err(
                            &self.table,
                            format!("dynamic partition key '{}' is null", column.name),
                        ));
                    }
                    let text = encode_field(value, &TextFormat::catalog());
                    // Partition values become path segments, so a separator in
                    // the value would splinter the partition directory.
                    if text.contains(['/', '\\']) {
                        return Err(Inner::catalog_err(
                            &self.table,
                            format!(
                                "value of dynamic partition key '{}' contains a path separator",
                                column.name
                            ),
                        ));
                    }
                    segments.push(format!("{}={text}", column.name));
                }
            }
        }
        Ok(segments.join("/"))
    }

    /// Encode the row's data columns (partition keys live in the path, not in
    /// the file) into the partition's buffer.
    fn encode_row(&self, row: &Row, buffer: &mut Vec<u8>) -> Result<()> {
        let mut values = Vec::new();
        for column in self.columns.iter().filter(|c| c.role == PartitionRole::NotAKey) {
            let value = row.get(&column.name).cloned().unwrap_or(Value::Null);
            values.push(value);
        }
        match self.format {
            StorageFormat::TextFile => {
                let text_format = TextFormat::catalog();
                let mut fields = Vec::with_capacity(values.len());
                for (value, column) in values.iter().zip(
                    self.columns
                        .iter()
                        .filter(|c| c.role == PartitionRole::NotAKey),
                ) {
                    let field = match value {
                        Value::Str(s) => {
                            let sanitized = self.policy.apply(s, &text_format);
                            if sanitized.contains(text_format.field_delimiter)
                                || sanitized.contains(text_format.record_delimiter)
                            {
                                return Err(Inner::catalog_err(
                                    &self.table,
                                    format!(
                                        "value of column '{}' contains storage delimiters; \
                                        use a drop or replace delimiter policy",
                                        column.name
                                    ),
                                ));
                            }
                            sanitized
                        }
                        other => encode_field(other, &text_format),
                    };
                    fields.push(field);
                }
                buffer.extend_from_slice(
                    fields
                        .join(&text_format.field_delimiter.to_string())
                        .as_bytes(),
                );
                buffer.push(text_format.record_delimiter as u8);
            }
            StorageFormat::SequenceFile => {
                sequence::write_record(buffer, &values)?;
            }
        }
        Ok(())
    }
}

impl CatalogWriter for FsWriter {
    fn write_row(&mut self, row: &Row) -> Result<()> {
        let partition = self.partition_for(row)?;
        let mut encoded = Vec::new();
        self.encode_row(row, &mut encoded)?;
        let buffer = self
            .buffers
            .entry(partition)
            .or_insert_with(|| PartitionBuffer {
                bytes: Vec::new(),
                rows: 0,
            });
        buffer.bytes.extend_from_slice(&encoded);
        buffer.rows += 1;
        Ok(())
    }

    fn write_bulk(&mut self, stream: &mut dyn Read, wire: &TextFormat) -> Result<u64> {
        let names: Arc<[String]> = self.columns.iter().map(|c| c.name.clone()).collect();
        let canonicals: Vec<(String, CanonicalType)> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.canonical))
            .collect();
        let reader = BufReader::new(stream);
        let mut rows_loaded = 0u64;
        let mut in_chunk = 0u64;
        for record in reader.split(wire.record_delimiter as u8) {
            let record = record?;
            let record = String::from_utf8(record).map_err(|_| {
                Inner::catalog_err(&self.table, "bulk stream record is not valid UTF-8")
            })?;
            if record.is_empty() {
                continue;
            }
            let fields: Vec<&str> = record.split(wire.field_delimiter).collect();
            if fields.len() != canonicals.len() {
                return Err(Inner::catalog_err(
                    &self.table,
                    format!(
                        "bulk record has {} fields, table has {} columns",
                        fields.len(),
                        canonicals.len()
                    ),
                ));
            }
            let values = fields
                .iter()
                .zip(&canonicals)
                .map(|(field, (name, canonical))| {
                    if *field == wire.null_marker {
                        Ok(Value::Null)
                    } else {
                        decode_field(field, *canonical, name)
                    }
                })
                .collect::<Result<Vec<Value>>>()?;
            self.write_row(&Row::new(names.clone(), values))?;
            rows_loaded += 1;
            in_chunk += 1;
            if in_chunk >= BULK_CHUNK_ROWS {
                self.flush_batch()?;
                in_chunk = 0;
            }
        }
        Ok(rows_loaded)
    }

    fn flush_batch(&mut self) -> Result<()> {
        let table_dir = self.inner.table_dir(&self.table);
        for (partition, buffer) in std::mem::take(&mut self.buffers) {
            if buffer.rows == 0 {
                continue;
            }
            let dir = partition_dir(&table_dir, &partition);
            fs::create_dir_all(&dir)?;
            // Stage in the table directory so the rename stays on one
            // filesystem.
            let mut staged = NamedTempFile::new_in(&table_dir)?;
            staged.write_all(&buffer.bytes)?;
            staged.flush()?;
            let target = dir.join(format!("part-{:05}", self.part_counter));
            self.part_counter += 1;
            staged
                .persist(&target)
                .map_err(|e| ImportError::Io(e.error))?;
            debug!(
                "Flushed {} rows to '{}'.",
                buffer.rows,
                target.display()
            );
            self.committed += buffer.rows;
            // Register the partition as soon as rows in it are durable, so a
            // partially failed run reports what is actually committed.
            let mut tables = self.inner.tables.write().unwrap();
            if let Some(meta) = tables.get_mut(&self.table) {
                meta.partitions.insert(partition);
            }
        }
        Ok(())
    }

    fn rows_committed(&self) -> u64 {
        self.committed
    }

    fn commit(&mut self) -> Result<u64> {
        if !self.done {
            self.flush_batch()?;
            self.done = true;
            info!(
                "Committed {} rows into table '{}'.",
                self.committed, self.table
            );
        }
        Ok(self.committed)
    }
}
