//! Text encoding of typed values, shared by the text storage format, the bulk
//! wire decoder and partition path values.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{ImportError, Result};
use crate::types::{CanonicalType, Decimal, Value};

/// Delimiters and null marker of one delimited text stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFormat {
    pub field_delimiter: char,
    pub record_delimiter: char,
    pub null_marker: &'static str,
}

impl TextFormat {
    /// Format of catalog text storage. Control characters, same choice the big
    /// warehouse catalogs default to.
    pub fn catalog() -> Self {
        TextFormat {
            field_delimiter: '\u{1}',
            record_delimiter: '\n',
            null_marker: "\\N",
        }
    }

    /// Wire format emitted by the source engine's native bulk export tool.
    pub fn bulk_wire() -> Self {
        TextFormat {
            field_delimiter: '|',
            record_delimiter: '\n',
            null_marker: "\\N",
        }
    }
}

/// What to do with string values containing the field or record delimiter when
/// writing text storage. Dropping and replacing are mutually exclusive by
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DelimiterPolicy {
    /// Leave values untouched. Safe for sequence storage, unsafe for text.
    #[default]
    Keep,
    /// Strip delimiter characters out of string values.
    Drop,
    /// Replace each delimiter character with the given string.
    Replace(String),
}

impl DelimiterPolicy {
    /// Apply the policy to one string field.
    pub fn apply(&self, text: &str, format: &TextFormat) -> String {
        let is_delimiter =
            |c: char| c == format.field_delimiter || c == format.record_delimiter || c == '\r';
        match self {
            DelimiterPolicy::Keep => text.to_owned(),
            DelimiterPolicy::Drop => text.chars().filter(|&c| !is_delimiter(c)).collect(),
            DelimiterPolicy::Replace(replacement) => {
                let mut out = String::with_capacity(text.len());
                for c in text.chars() {
                    if is_delimiter(c) {
                        out.push_str(replacement);
                    } else {
                        out.push(c);
                    }
                }
                out
            }
        }
    }
}

/// Encode one value as a text field. Strings pass through verbatim; sanitizing
/// them is the writer's job since only it knows the delimiter policy.
pub fn encode_field(value: &Value, format: &TextFormat) -> String {
    match value {
        Value::Null => format.null_marker.to_owned(),
        other => other.to_string(),
    }
}

/// Decode one text field back into a typed value according to the column's
/// canonical type. The column name is only used in error reports.
pub fn decode_field(text: &str, canonical: CanonicalType, column: &str) -> Result<Value> {
    let format = TextFormat::catalog();
    if text == format.null_marker {
        return Ok(Value::Null);
    }
    let out_of_range = || ImportError::ValueOutOfRange {
        column: column.to_owned(),
        field_type: canonical,
    };
    let value = match canonical {
        CanonicalType::Boolean => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(out_of_range()),
        },
        CanonicalType::Int => Value::Int(text.parse().map_err(|_| out_of_range())?),
        CanonicalType::BigInt => Value::BigInt(text.parse().map_err(|_| out_of_range())?),
        CanonicalType::Float => Value::Float(text.parse().map_err(|_| out_of_range())?),
        CanonicalType::Double => Value::Double(text.parse().map_err(|_| out_of_range())?),
        CanonicalType::Str => Value::Str(text.to_owned()),
        CanonicalType::Decimal { scale, .. } => {
            Value::Decimal(Decimal::parse(text, scale).ok_or_else(out_of_range)?)
        }
        CanonicalType::Date => Value::Date(
            NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| out_of_range())?,
        ),
        CanonicalType::Timestamp => Value::Timestamp(
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|_| out_of_range())?,
        ),
        CanonicalType::Binary => Value::Binary(decode_hex(text).ok_or_else(out_of_range)?),
    };
    Ok(value)
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}
