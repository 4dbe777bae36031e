//! End-to-end runs against the in-memory source and a filesystem catalog,
//! covering both connector modes, partitioning variants and the delimiter
//! policies of text storage.

use std::num::NonZeroUsize;

use tempfile::tempdir;

use sql2catalog::catalog::fs::FsCatalog;
use sql2catalog::catalog::text::DelimiterPolicy;
use sql2catalog::column::{shared_names, ColumnSpec, PartitionRole, TableDescriptor};
use sql2catalog::connector::{self, ConnectorConfig, Mode};
use sql2catalog::generator::seed_source;
use sql2catalog::import::{BatchSizeLimit, ImportRequest, Importer};
use sql2catalog::source::{Credentials, Endpoint, MemorySource};
use sql2catalog::types::{CatalogFieldType, Decimal, DecimalEncoding, SourceType, Value};
use sql2catalog::{Catalog, ImportError, StorageFormat};

const ENDPOINT: &str = "nz://testserver/testdb";
const TOTAL_RECORDS: u64 = 10;

fn config(mode: Mode, mapper_count: usize) -> ConnectorConfig {
    ConnectorConfig {
        endpoint: Endpoint(ENDPOINT.to_owned()),
        credentials: Credentials::new("admin", "secret"),
        mode,
        mapper_count: NonZeroUsize::new(mapper_count).unwrap(),
    }
}

fn col(name: &str, source_type: SourceType, value: Value) -> ColumnSpec {
    ColumnSpec::builder(name, source_type)
        .generated(value.clone())
        .expected(value)
        .build()
        .unwrap()
}

fn int_types_table(name: &str) -> TableDescriptor {
    TableDescriptor::new(
        name,
        vec![
            col("col0", SourceType::Boolean, Value::Bool(true)),
            // The source dialect has no tinyint, smallint is the narrowest.
            col("col1", SourceType::SmallInt, Value::Int(100)),
            col("col2", SourceType::Integer, Value::Int(1000)),
            col("col3", SourceType::BigInt, Value::BigInt(10000)),
        ],
    )
}

/// Seed a source with generated rows and run one import against a fresh
/// catalog rooted in a temp directory.
fn run_import(
    mode: Mode,
    mapper_count: usize,
    request: ImportRequest,
) -> (
    Result<sql2catalog::ImportResult, ImportError>,
    FsCatalog,
    tempfile::TempDir,
) {
    let source = MemorySource::new(Endpoint(ENDPOINT.to_owned()));
    seed_source(&source, &request.table, TOTAL_RECORDS);
    let dir = tempdir().unwrap();
    let catalog = FsCatalog::new(dir.path());
    let result = Importer::new(&source, &catalog).run(&config(mode, mapper_count), &request);
    (result, catalog, dir)
}

#[test]
fn int_types_generic() {
    let request = ImportRequest::new(int_types_table("int_types"), TOTAL_RECORDS);
    let (result, _catalog, _dir) = run_import(Mode::Generic, 1, request);
    let result = result.unwrap();
    assert!(result.is_success());
    assert_eq!(result.rows_written, TOTAL_RECORDS);
    assert!(result.mismatches.is_empty());
}

#[test]
fn int_types_direct() {
    let request = ImportRequest::new(int_types_table("int_types"), TOTAL_RECORDS);
    let (result, _catalog, _dir) = run_import(Mode::Direct, 1, request);
    assert!(result.unwrap().is_success());
}

#[test]
fn string_types() {
    let table = TableDescriptor::new(
        "string_types",
        vec![
            col(
                "col0",
                SourceType::Char(14),
                Value::Str("string to test".to_owned()),
            ),
            col(
                "col1",
                SourceType::Varchar(20),
                Value::Str("string to test".to_owned()),
            ),
        ],
    );
    let (result, _catalog, _dir) =
        run_import(Mode::Generic, 1, ImportRequest::new(table, TOTAL_RECORDS));
    assert!(result.unwrap().is_success());
}

#[test]
fn number_types_round_trip_with_scale() {
    let table = TableDescriptor::new(
        "number_types",
        vec![
            col(
                "col0",
                SourceType::Numeric {
                    precision: 18,
                    scale: 2,
                },
                Value::Decimal(Decimal::parse("1000.00", 2).unwrap()),
            ),
            col(
                "col1",
                SourceType::Decimal {
                    precision: 18,
                    scale: 2,
                },
                Value::Decimal(Decimal::parse("2000.00", 2).unwrap()),
            ),
        ],
    );
    let (result, catalog, _dir) =
        run_import(Mode::Generic, 1, ImportRequest::new(table, TOTAL_RECORDS));
    assert!(result.unwrap().is_success());
    // Default policy registers decimals as catalog strings.
    let fields = catalog.field_types("number_types").unwrap();
    assert_eq!(fields[0].1, CatalogFieldType::Str);
    assert_eq!(fields[1].1, CatalogFieldType::Str);
}

#[test]
fn number_types_native_decimal_encoding() {
    let table = TableDescriptor::new(
        "number_types",
        vec![col(
            "col0",
            SourceType::Numeric {
                precision: 18,
                scale: 2,
            },
            Value::Decimal(Decimal::parse("1000.00", 2).unwrap()),
        )],
    );
    let mut request = ImportRequest::new(table, TOTAL_RECORDS);
    request.create.decimal_encoding = DecimalEncoding::Native;
    let (result, catalog, _dir) = run_import(Mode::Generic, 1, request);
    assert!(result.unwrap().is_success());
    let fields = catalog.field_types("number_types").unwrap();
    assert_eq!(
        fields[0].1,
        CatalogFieldType::Decimal {
            precision: 18,
            scale: 2
        }
    );
}

#[test]
fn number_types_direct() {
    let table = TableDescriptor::new(
        "number_types",
        vec![col(
            "col0",
            SourceType::Numeric {
                precision: 18,
                scale: 2,
            },
            Value::Decimal(Decimal::parse("1000.00", 2).unwrap()),
        )],
    );
    let (result, _catalog, _dir) =
        run_import(Mode::Direct, 1, ImportRequest::new(table, TOTAL_RECORDS));
    assert!(result.unwrap().is_success());
}

#[test]
fn row_count_off_fails_verification() {
    let mut request = ImportRequest::new(int_types_table("int_types"), TOTAL_RECORDS);
    request.expected_rows = TOTAL_RECORDS + 2;
    let (result, _catalog, _dir) = run_import(Mode::Generic, 1, request);
    let result = result.unwrap();
    assert!(!result.is_success());
    assert_eq!(result.rows_written, TOTAL_RECORDS);
}

#[test]
fn rows_split_across_readers_arrive_completely() {
    let request = ImportRequest::new(int_types_table("int_types"), TOTAL_RECORDS);
    let (result, _catalog, _dir) = run_import(Mode::Generic, 3, request);
    let result = result.unwrap();
    assert!(result.is_success());
    assert_eq!(result.rows_written, TOTAL_RECORDS);
}

#[test]
fn binary_types_rejected_in_direct_mode() {
    let table = TableDescriptor::new(
        "binary_types",
        vec![
            col("col0", SourceType::Integer, Value::Int(1)),
            col(
                "col1",
                SourceType::Varbinary(16),
                Value::Binary(vec![1, 2, 3]),
            ),
        ],
    );
    let (result, catalog, _dir) =
        run_import(Mode::Direct, 1, ImportRequest::new(table, TOTAL_RECORDS));
    assert!(matches!(
        result.unwrap_err(),
        ImportError::UnsupportedDirectModeFeature { .. }
    ));
    // Rejected at idle: the run never created the table, let alone wrote rows.
    assert!(!catalog.table_exists("binary_types"));
}

#[test]
fn binary_types_round_trip_in_generic_mode() {
    let table = TableDescriptor::new(
        "binary_types",
        vec![col(
            "col0",
            SourceType::Varbinary(16),
            Value::Binary(vec![0xca, 0xfe, 0x00, 0x01]),
        )],
    );
    let (result, _catalog, _dir) =
        run_import(Mode::Generic, 1, ImportRequest::new(table, TOTAL_RECORDS));
    assert!(result.unwrap().is_success());
}

#[test]
fn dynamic_partitioning_rejected_in_direct_mode() {
    let table = TableDescriptor::new(
        "dyn_part",
        vec![
            col("col0", SourceType::Integer, Value::Int(1)),
            ColumnSpec::builder("region", SourceType::Varchar(10))
                .generated(Value::Str("emea".to_owned()))
                .expected(Value::Str("emea".to_owned()))
                .partition_role(PartitionRole::DynamicKey)
                .build()
                .unwrap(),
        ],
    );
    let (result, catalog, _dir) =
        run_import(Mode::Direct, 1, ImportRequest::new(table, TOTAL_RECORDS));
    assert!(matches!(
        result.unwrap_err(),
        ImportError::UnsupportedDirectModeFeature { .. }
    ));
    assert!(!catalog.table_exists("dyn_part"));
}

#[test]
fn column_projection_rejected_in_direct_mode() {
    let mut request = ImportRequest::new(int_types_table("int_types"), TOTAL_RECORDS);
    request.projection = Some(vec!["col0".to_owned(), "col2".to_owned()]);
    let (result, _catalog, _dir) = run_import(Mode::Direct, 1, request);
    assert!(matches!(
        result.unwrap_err(),
        ImportError::UnsupportedDirectModeFeature { .. }
    ));
}

#[test]
fn static_partitioning() {
    let table = TableDescriptor::new(
        "static_part",
        vec![
            col("col0", SourceType::Integer, Value::Int(1000)),
            ColumnSpec::builder("load", SourceType::Varchar(10))
                .generated(Value::Str("batch1".to_owned()))
                .expected(Value::Str("batch1".to_owned()))
                .partition_role(PartitionRole::StaticKey)
                .build()
                .unwrap(),
        ],
    );
    let mut request = ImportRequest::new(table, TOTAL_RECORDS);
    request.static_partition = vec![("load".to_owned(), "batch1".to_owned())];
    let (result, catalog, _dir) = run_import(Mode::Generic, 1, request);
    assert!(result.unwrap().is_success());
    assert_eq!(catalog.partitions("static_part").unwrap(), ["load=batch1"]);
}

#[test]
fn static_partitioning_direct() {
    let table = TableDescriptor::new(
        "static_part",
        vec![
            col("col0", SourceType::Integer, Value::Int(1000)),
            ColumnSpec::builder("load", SourceType::Varchar(10))
                .generated(Value::Str("batch1".to_owned()))
                .expected(Value::Str("batch1".to_owned()))
                .partition_role(PartitionRole::StaticKey)
                .build()
                .unwrap(),
        ],
    );
    let mut request = ImportRequest::new(table, TOTAL_RECORDS);
    request.static_partition = vec![("load".to_owned(), "batch1".to_owned())];
    let (result, _catalog, _dir) = run_import(Mode::Direct, 1, request);
    assert!(result.unwrap().is_success());
}

#[test]
fn dynamic_partitioning() {
    let table = TableDescriptor::new(
        "dyn_part",
        vec![
            col("col0", SourceType::Integer, Value::Int(1000)),
            ColumnSpec::builder("region", SourceType::Varchar(10))
                .generated(Value::Str("emea".to_owned()))
                .expected(Value::Str("emea".to_owned()))
                .partition_role(PartitionRole::DynamicKey)
                .build()
                .unwrap(),
        ],
    );
    let (result, catalog, _dir) =
        run_import(Mode::Generic, 1, ImportRequest::new(table, TOTAL_RECORDS));
    assert!(result.unwrap().is_success());
    assert_eq!(catalog.partitions("dyn_part").unwrap(), ["region=emea"]);
}

#[test]
fn static_and_dynamic_partitioning() {
    let table = TableDescriptor::new(
        "mixed_part",
        vec![
            col("col0", SourceType::Integer, Value::Int(1000)),
            ColumnSpec::builder("load", SourceType::Varchar(10))
                .generated(Value::Str("batch1".to_owned()))
                .expected(Value::Str("batch1".to_owned()))
                .partition_role(PartitionRole::StaticKey)
                .build()
                .unwrap(),
            ColumnSpec::builder("region", SourceType::Varchar(10))
                .generated(Value::Str("emea".to_owned()))
                .expected(Value::Str("emea".to_owned()))
                .partition_role(PartitionRole::DynamicKey)
                .build()
                .unwrap(),
        ],
    );
    let mut request = ImportRequest::new(table, TOTAL_RECORDS);
    request.static_partition = vec![("load".to_owned(), "batch1".to_owned())];
    let (result, catalog, _dir) = run_import(Mode::Generic, 1, request);
    assert!(result.unwrap().is_success());
    assert_eq!(
        catalog.partitions("mixed_part").unwrap(),
        ["load=batch1/region=emea"]
    );
}

#[test]
fn dynamic_key_in_middle_of_schema() {
    let table = TableDescriptor::new(
        "dyn_middle",
        vec![
            col("col0", SourceType::Integer, Value::Int(1)),
            ColumnSpec::builder("region", SourceType::Varchar(10))
                .generated(Value::Str("emea".to_owned()))
                .expected(Value::Str("emea".to_owned()))
                .partition_role(PartitionRole::DynamicKey)
                .build()
                .unwrap(),
            col("col2", SourceType::BigInt, Value::BigInt(10000)),
        ],
    );
    let (result, _catalog, _dir) =
        run_import(Mode::Generic, 1, ImportRequest::new(table, TOTAL_RECORDS));
    assert!(result.unwrap().is_success());
}

#[test]
fn column_projection() {
    let mut request = ImportRequest::new(int_types_table("projected"), TOTAL_RECORDS);
    request.projection = Some(vec!["col0".to_owned(), "col2".to_owned()]);
    let (result, catalog, _dir) = run_import(Mode::Generic, 1, request);
    assert!(result.unwrap().is_success());
    let fields = catalog.field_types("projected").unwrap();
    let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["col0", "col2"]);
}

#[test]
fn column_projection_missing_partition_key_fails_before_extraction() {
    let table = TableDescriptor::new(
        "missing_key",
        vec![
            col("col0", SourceType::Integer, Value::Int(1)),
            ColumnSpec::builder("region", SourceType::Varchar(10))
                .generated(Value::Str("emea".to_owned()))
                .expected(Value::Str("emea".to_owned()))
                .partition_role(PartitionRole::DynamicKey)
                .build()
                .unwrap(),
        ],
    );
    let mut request = ImportRequest::new(table, TOTAL_RECORDS);
    request.projection = Some(vec!["col0".to_owned()]);
    let (result, catalog, _dir) = run_import(Mode::Generic, 1, request);
    assert!(result.is_err());
    assert!(!catalog.table_exists("missing_key"));
}

#[test]
fn create_against_pre_existing_table() {
    let source = MemorySource::new(Endpoint(ENDPOINT.to_owned()));
    let table = int_types_table("pre_existing");
    seed_source(&source, &table, TOTAL_RECORDS);
    let dir = tempdir().unwrap();
    let catalog = FsCatalog::new(dir.path());
    let importer = Importer::new(&source, &catalog);

    let request = ImportRequest::new(table.clone(), TOTAL_RECORDS);
    assert!(importer
        .run(&config(Mode::Generic, 1), &request)
        .unwrap()
        .is_success());

    // Same table again: rejected without the overwrite flag, replaced with it.
    let second = ImportRequest::new(table.clone(), TOTAL_RECORDS);
    assert!(matches!(
        importer.run(&config(Mode::Generic, 1), &second).unwrap_err(),
        ImportError::Catalog { .. }
    ));
    let mut third = ImportRequest::new(table, TOTAL_RECORDS);
    third.create.overwrite_existing = true;
    let result = importer.run(&config(Mode::Generic, 1), &third).unwrap();
    assert!(result.is_success());
    assert_eq!(result.rows_written, TOTAL_RECORDS);
}

#[test]
fn sequence_file_storage() {
    let mut request = ImportRequest::new(int_types_table("seq_table"), TOTAL_RECORDS);
    request.create.storage_format = StorageFormat::SequenceFile;
    let (result, _catalog, _dir) = run_import(Mode::Generic, 1, request);
    assert!(result.unwrap().is_success());
}

#[test]
fn sequence_file_keeps_delimiter_characters() {
    let tricky = "with\u{1}delims\nin it";
    let table = TableDescriptor::new(
        "seq_delims",
        vec![col(
            "col0",
            SourceType::Varchar(30),
            Value::Str(tricky.to_owned()),
        )],
    );
    let mut request = ImportRequest::new(table, TOTAL_RECORDS);
    request.create.storage_format = StorageFormat::SequenceFile;
    let (result, _catalog, _dir) = run_import(Mode::Generic, 1, request);
    assert!(result.unwrap().is_success());
}

#[test]
fn text_storage_drop_delimiters() {
    let table = TableDescriptor::new(
        "drop_delims",
        vec![ColumnSpec::builder("col0", SourceType::Varchar(30))
            .generated(Value::Str("with\u{1}delims\nin it".to_owned()))
            .expected(Value::Str("withdelimsin it".to_owned()))
            .build()
            .unwrap()],
    );
    let mut request = ImportRequest::new(table, TOTAL_RECORDS);
    request.create.delimiter_policy = DelimiterPolicy::Drop;
    let (result, _catalog, _dir) = run_import(Mode::Generic, 1, request);
    assert!(result.unwrap().is_success());
}

#[test]
fn text_storage_replace_delimiters() {
    let table = TableDescriptor::new(
        "replace_delims",
        vec![ColumnSpec::builder("col0", SourceType::Varchar(30))
            .generated(Value::Str("with\u{1}delims\nin it".to_owned()))
            .expected(Value::Str("with_delims_in it".to_owned()))
            .build()
            .unwrap()],
    );
    let mut request = ImportRequest::new(table, TOTAL_RECORDS);
    request.create.delimiter_policy = DelimiterPolicy::Replace("_".to_owned());
    let (result, _catalog, _dir) = run_import(Mode::Generic, 1, request);
    assert!(result.unwrap().is_success());
}

#[test]
fn text_storage_without_policy_aborts_on_delimiter() {
    let table = TableDescriptor::new(
        "no_policy",
        vec![col(
            "col0",
            SourceType::Varchar(30),
            Value::Str("with\u{1}delims".to_owned()),
        )],
    );
    let (result, _catalog, _dir) =
        run_import(Mode::Generic, 1, ImportRequest::new(table, TOTAL_RECORDS));
    match result.unwrap_err() {
        ImportError::PartialWrite { rows_committed, .. } => assert_eq!(rows_committed, 0),
        other => panic!("expected partial write, got {other}"),
    }
}

#[test]
fn abort_after_flush_reports_durable_rows() {
    let source = MemorySource::new(Endpoint(ENDPOINT.to_owned()));
    let table = TableDescriptor::new(
        "flushed_then_abort",
        vec![col(
            "col0",
            SourceType::Varchar(30),
            Value::Str("clean".to_owned()),
        )],
    );
    // Fifth row carries a storage delimiter, so under the default keep policy
    // the run aborts after two full batches are already durable.
    let rows: Vec<Vec<Value>> = (0..6)
        .map(|i| {
            let text = if i == 4 { "bad\u{1}value" } else { "clean" };
            vec![Value::Str(text.to_owned())]
        })
        .collect();
    source.load_table("flushed_then_abort", vec!["col0".to_owned()], rows);
    let dir = tempdir().unwrap();
    let catalog = FsCatalog::new(dir.path());
    let mut request = ImportRequest::new(table, 6);
    request.batch_size = BatchSizeLimit::Rows(2);
    let err = Importer::new(&source, &catalog)
        .run(&config(Mode::Generic, 1), &request)
        .err()
        .unwrap();
    match err {
        ImportError::PartialWrite { rows_committed, .. } => assert_eq!(rows_committed, 4),
        other => panic!("expected partial write, got {other}"),
    }
    // The flushed batches survive the abort and stay readable.
    assert_eq!(catalog.read_all("flushed_then_abort").unwrap().len(), 4);
}

#[test]
fn connection_error_when_endpoint_is_wrong() {
    let source = MemorySource::new(Endpoint("nz://somewhere-else".to_owned()));
    let table = int_types_table("unreachable");
    seed_source(&source, &table, TOTAL_RECORDS);
    let dir = tempdir().unwrap();
    let catalog = FsCatalog::new(dir.path());
    let request = ImportRequest::new(table, TOTAL_RECORDS);
    let err = Importer::new(&source, &catalog)
        .run(&config(Mode::Generic, 1), &request)
        .unwrap_err();
    assert!(matches!(err, ImportError::Connection { .. }));
    assert!(err.is_transient());
}

#[test]
fn connector_close_is_idempotent() {
    let source = MemorySource::new(Endpoint(ENDPOINT.to_owned()));
    let table = int_types_table("closable");
    seed_source(&source, &table, TOTAL_RECORDS);
    for mode in [Mode::Generic, Mode::Direct] {
        let mut handle = connector::open(&source, &config(mode, 1)).unwrap();
        handle.close().unwrap();
        handle.close().unwrap();
    }
}

#[test]
fn extraction_is_not_restartable() {
    let source = MemorySource::new(Endpoint(ENDPOINT.to_owned()));
    let table = int_types_table("one_shot");
    seed_source(&source, &table, TOTAL_RECORDS);
    let mut handle = connector::open(&source, &config(Mode::Generic, 1)).unwrap();
    let first = handle.extract(&table, 4).unwrap();
    drop(first);
    assert!(handle.extract(&table, 4).is_err());
}

#[test]
fn persisted_values_match_expected_multiset() {
    let table = int_types_table("multiset");
    let (result, catalog, _dir) = run_import(
        Mode::Generic,
        2,
        ImportRequest::new(table.clone(), TOTAL_RECORDS),
    );
    assert!(result.unwrap().is_success());
    let rows = catalog.read_all("multiset").unwrap();
    assert_eq!(rows.len(), TOTAL_RECORDS as usize);
    let names = shared_names(&table);
    for row in rows {
        assert_eq!(row.names(), &names[..]);
        assert_eq!(row.get("col1"), Some(&Value::Int(100)));
        assert_eq!(row.get("col3"), Some(&Value::BigInt(10000)));
    }
}
