//! The three type systems the pipeline translates between and the pure mapping
//! functions connecting them.
//!
//! A column travels source SQL type -> canonical type -> catalog field type.
//! Both hops are pure functions. The first one is partial: source dialects have
//! gaps (the original engine this was written against has no 8-bit integer, for
//! example), so callers must not assume every canonical type is reachable from
//! every dialect.

use std::fmt;

use atoi::FromRadix10Signed;
use chrono::{NaiveDate, NaiveDateTime};
use num_traits::checked_pow;

use crate::error::{ImportError, Result};

/// Native SQL type of a source column, including precision and scale where the
/// source dialect carries them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Char(usize),
    Varchar(usize),
    Numeric { precision: u8, scale: u8 },
    Decimal { precision: u8, scale: u8 },
    Date,
    Timestamp { precision: u8 },
    Binary(usize),
    Varbinary(usize),
    /// Anything the source reports that we do not enumerate. Never mapped.
    Other { name: String },
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Boolean => write!(f, "boolean"),
            SourceType::SmallInt => write!(f, "smallint"),
            SourceType::Integer => write!(f, "int"),
            SourceType::BigInt => write!(f, "bigint"),
            SourceType::Real => write!(f, "real"),
            SourceType::Double => write!(f, "double precision"),
            SourceType::Char(len) => write!(f, "char({len})"),
            SourceType::Varchar(len) => write!(f, "varchar({len})"),
            SourceType::Numeric { precision, scale } => write!(f, "numeric({precision},{scale})"),
            SourceType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            SourceType::Date => write!(f, "date"),
            SourceType::Timestamp { precision } => write!(f, "timestamp({precision})"),
            SourceType::Binary(len) => write!(f, "binary({len})"),
            SourceType::Varbinary(len) => write!(f, "varbinary({len})"),
            SourceType::Other { name } => write!(f, "{name}"),
        }
    }
}

/// The pipeline's internal type model, intermediate between source SQL types and
/// catalog field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalType {
    Boolean,
    Int,
    BigInt,
    Float,
    Double,
    Str,
    Decimal { precision: u8, scale: u8 },
    Date,
    Timestamp,
    Binary,
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanonicalType::Boolean => write!(f, "boolean"),
            CanonicalType::Int => write!(f, "int"),
            CanonicalType::BigInt => write!(f, "bigint"),
            CanonicalType::Float => write!(f, "float"),
            CanonicalType::Double => write!(f, "double"),
            CanonicalType::Str => write!(f, "string"),
            CanonicalType::Decimal { precision, scale } => {
                write!(f, "decimal({precision},{scale})")
            }
            CanonicalType::Date => write!(f, "date"),
            CanonicalType::Timestamp => write!(f, "timestamp"),
            CanonicalType::Binary => write!(f, "binary"),
        }
    }
}

/// Field type as registered with the destination catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFieldType {
    Boolean,
    Int,
    BigInt,
    Float,
    Double,
    Str,
    Decimal { precision: u8, scale: u8 },
    Date,
    Timestamp,
    Binary,
}

/// How decimal columns are registered with the catalog.
///
/// The catalog dialect this pipeline grew up against stores numerics as strings,
/// so that is the default. Catalogs with native fixed-point support can opt into
/// `Native`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecimalEncoding {
    #[default]
    AsString,
    Native,
}

/// Translate a source column type into the canonical type model.
///
/// Deterministic and total over the enumerated source types; `Other` fails with
/// [`ImportError::UnsupportedType`]. The column name is only used to report
/// errors.
pub fn to_canonical(column: &str, source: &SourceType) -> Result<CanonicalType> {
    let canonical = match source {
        SourceType::Boolean => CanonicalType::Boolean,
        // Small integers widen to the canonical 32-bit integer. The catalogs we
        // target have no narrower integer field.
        SourceType::SmallInt | SourceType::Integer => CanonicalType::Int,
        SourceType::BigInt => CanonicalType::BigInt,
        SourceType::Real => CanonicalType::Float,
        SourceType::Double => CanonicalType::Double,
        SourceType::Char(_) | SourceType::Varchar(_) => CanonicalType::Str,
        SourceType::Numeric { precision, scale } | SourceType::Decimal { precision, scale } => {
            CanonicalType::Decimal {
                precision: *precision,
                scale: *scale,
            }
        }
        SourceType::Date => CanonicalType::Date,
        SourceType::Timestamp { .. } => CanonicalType::Timestamp,
        SourceType::Binary(_) | SourceType::Varbinary(_) => CanonicalType::Binary,
        SourceType::Other { .. } => {
            return Err(ImportError::UnsupportedType {
                column: column.to_owned(),
                source_type: source.clone(),
            })
        }
    };
    Ok(canonical)
}

/// Translate a canonical type into the catalog's field type.
///
/// Total. Only decimals are policy dependent, see [`DecimalEncoding`].
pub fn to_catalog_field(canonical: CanonicalType, encoding: DecimalEncoding) -> CatalogFieldType {
    match canonical {
        CanonicalType::Boolean => CatalogFieldType::Boolean,
        CanonicalType::Int => CatalogFieldType::Int,
        CanonicalType::BigInt => CatalogFieldType::BigInt,
        CanonicalType::Float => CatalogFieldType::Float,
        CanonicalType::Double => CatalogFieldType::Double,
        CanonicalType::Str => CatalogFieldType::Str,
        CanonicalType::Decimal { precision, scale } => match encoding {
            DecimalEncoding::AsString => CatalogFieldType::Str,
            DecimalEncoding::Native => CatalogFieldType::Decimal { precision, scale },
        },
        CanonicalType::Date => CatalogFieldType::Date,
        CanonicalType::Timestamp => CatalogFieldType::Timestamp,
        CanonicalType::Binary => CatalogFieldType::Binary,
    }
}

/// Exact fixed-point decimal. Scale is part of the value: `1000.00` and `1000.0`
/// are different representations and compare unequal, which is what the
/// round-trip verification wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    unscaled: i128,
    scale: u8,
}

impl Decimal {
    pub fn new(unscaled: i128, scale: u8) -> Self {
        Decimal { unscaled, scale }
    }

    pub fn unscaled(&self) -> i128 {
        self.unscaled
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Parse a decimal literal like `-123.45` into a value with exactly `scale`
    /// fraction digits. More fraction digits than `scale` are rejected rather
    /// than rounded; fewer are padded with zeros.
    pub fn parse(text: &str, scale: u8) -> Option<Self> {
        let bytes = text.as_bytes();
        let (integral, consumed) = i128::from_radix_10_signed(bytes);
        if consumed == 0 {
            return None;
        }
        let mut rest = &bytes[consumed..];
        let mut fraction: i128 = 0;
        let mut fraction_digits = 0u8;
        if let [b'.', tail @ ..] = rest {
            for &digit in tail {
                if !digit.is_ascii_digit() {
                    return None;
                }
                fraction = fraction.checked_mul(10)?.checked_add((digit - b'0') as i128)?;
                fraction_digits = fraction_digits.checked_add(1)?;
            }
            if fraction_digits > scale {
                return None;
            }
            rest = &[];
        }
        if !rest.is_empty() {
            return None;
        }
        let pad = checked_pow(10i128, (scale - fraction_digits) as usize)?;
        let scaled_integral = integral.checked_mul(checked_pow(10i128, scale as usize)?)?;
        let scaled_fraction = fraction.checked_mul(pad)?;
        let unscaled = if text.trim_start().starts_with('-') {
            scaled_integral.checked_sub(scaled_fraction)?
        } else {
            scaled_integral.checked_add(scaled_fraction)?
        };
        Some(Decimal { unscaled, scale })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let sign = if self.unscaled < 0 { "-" } else { "" };
        let magnitude = self.unscaled.unsigned_abs();
        let divisor = 10u128.pow(self.scale as u32);
        write!(
            f,
            "{sign}{}.{:0width$}",
            magnitude / divisor,
            magnitude % divisor,
            width = self.scale as usize
        )
    }
}

/// A single typed cell. The variant corresponds to the column's canonical type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `true` if this value can live in a column of the given canonical type.
    /// Null fits everywhere.
    pub fn fits(&self, canonical: CanonicalType) -> bool {
        match (self, canonical) {
            (Value::Null, _) => true,
            (Value::Bool(_), CanonicalType::Boolean) => true,
            (Value::Int(_), CanonicalType::Int) => true,
            (Value::BigInt(_), CanonicalType::BigInt) => true,
            (Value::Float(_), CanonicalType::Float) => true,
            (Value::Double(_), CanonicalType::Double) => true,
            (Value::Str(_), CanonicalType::Str) => true,
            (Value::Decimal(d), CanonicalType::Decimal { scale, .. }) => d.scale() == scale,
            (Value::Date(_), CanonicalType::Date) => true,
            (Value::Timestamp(_), CanonicalType::Timestamp) => true,
            (Value::Binary(_), CanonicalType::Binary) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
            Value::Binary(v) => {
                for byte in v {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}
