//! Length-prefixed binary record storage. Unlike text storage it never needs a
//! delimiter policy, at the price of not being greppable.
//!
//! Record layout: `u16` field count, then per field one marker byte (0 null,
//! 1 present) followed by a `u32` big-endian length and the field's text
//! encoding. Field payloads reuse the text codec so both formats agree on value
//! rendering.

use std::io::{ErrorKind, Read, Write};

use crate::error::Result;
use crate::types::{CanonicalType, Value};

use super::text::{decode_field, encode_field, TextFormat};

pub fn write_record(out: &mut impl Write, values: &[Value]) -> std::io::Result<()> {
    out.write_all(&(values.len() as u16).to_be_bytes())?;
    for value in values {
        if value.is_null() {
            out.write_all(&[0])?;
            continue;
        }
        let payload = encode_field(value, &TextFormat::catalog());
        out.write_all(&[1])?;
        out.write_all(&(payload.len() as u32).to_be_bytes())?;
        out.write_all(payload.as_bytes())?;
    }
    Ok(())
}

/// Read every record in the stream. `columns` pairs each field with its
/// canonical type and name, in storage order.
pub fn read_records(
    reader: &mut impl Read,
    columns: &[(String, CanonicalType)],
) -> Result<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    loop {
        let mut count_buf = [0u8; 2];
        match reader.read_exact(&mut count_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let count = u16::from_be_bytes(count_buf) as usize;
        if count != columns.len() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("record has {count} fields, schema has {}", columns.len()),
            )
            .into());
        }
        let mut values = Vec::with_capacity(count);
        for idx in 0..count {
            let mut marker = [0u8; 1];
            reader.read_exact(&mut marker)?;
            if marker[0] == 0 {
                values.push(Value::Null);
                continue;
            }
            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf)?;
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            reader.read_exact(&mut payload)?;
            let text = String::from_utf8_lossy(&payload);
            let (name, canonical) = &columns[idx];
            values.push(decode_field(&text, *canonical, name)?);
        }
        rows.push(values);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Decimal;

    #[test]
    fn records_round_trip() {
        let columns = vec![
            ("flag".to_owned(), CanonicalType::Boolean),
            ("amount".to_owned(), CanonicalType::Decimal { precision: 18, scale: 2 }),
            ("note".to_owned(), CanonicalType::Str),
        ];
        let rows = vec![
            vec![
                Value::Bool(true),
                Value::Decimal(Decimal::parse("2000.00", 2).unwrap()),
                Value::Str("a\u{1}b".to_owned()),
            ],
            vec![Value::Null, Value::Null, Value::Str(String::new())],
        ];

        let mut buffer = Vec::new();
        for row in &rows {
            write_record(&mut buffer, row).unwrap();
        }
        let decoded = read_records(&mut buffer.as_slice(), &columns).unwrap();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn record_wider_than_schema_is_an_error() {
        let mut buffer = Vec::new();
        write_record(&mut buffer, &[Value::Bool(true), Value::Bool(false)]).unwrap();
        let columns = vec![("flag".to_owned(), CanonicalType::Boolean)];
        assert!(read_records(&mut buffer.as_slice(), &columns).is_err());
    }
}
