use bytes::Bytes;

use crate::common::{Result, StrataError};

use super::{Schema, Value};

/// One table row: a value per schema column, `None` for null.
///
/// ## Row Binary Format
///
/// ```text
/// +----------------+------------------------------------------+
/// | Null Bitmap    | column 0 | column 1 | ... | column n - 1  |
/// | (N bytes)      | each at its type's max width             |
/// +----------------+------------------------------------------+
/// ```
///
/// Null columns keep their slot, zero-filled, so the encoded size is always
/// `schema.row_size()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<Option<Value>>,
}

impl Row {
    pub fn new(values: Vec<Option<Value>>) -> Self {
        Self { values }
    }

    /// Row with every column set.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
        }
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Checks column count, nullability and value types against `schema`.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if self.values.len() != schema.column_count() {
            return Err(StrataError::TypeMismatch {
                column: "<row>".to_string(),
                expected: format!("{} columns", schema.column_count()),
                found: format!("{} columns", self.values.len()),
            });
        }
        for (column, value) in schema.columns().zip(&self.values) {
            match value {
                None if !column.is_nullable() => {
                    return Err(StrataError::NullKey(column.name().to_string()));
                }
                Some(value) if !column.data_type().accepts(value) => {
                    return Err(StrataError::TypeMismatch {
                        column: column.name().to_string(),
                        expected: column.data_type().to_string(),
                        found: value.type_name().to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Encodes the row to exactly `schema.row_size()` bytes.
    pub fn to_bytes(&self, schema: &Schema) -> Result<Bytes> {
        self.validate(schema)?;

        let mut out = vec![0u8; schema.null_bitmap_size()];
        for (i, (column, value)) in schema.columns().zip(&self.values).enumerate() {
            match value {
                Some(value) => {
                    column.data_type().encode(value, &mut out).ok_or_else(|| {
                        StrataError::TypeMismatch {
                            column: column.name().to_string(),
                            expected: column.data_type().to_string(),
                            found: value.type_name().to_string(),
                        }
                    })?;
                }
                None => {
                    out[i / 8] |= 1 << (i % 8);
                    column.data_type().encode_null(&mut out);
                }
            }
        }
        debug_assert_eq!(out.len(), schema.row_size());
        Ok(Bytes::from(out))
    }

    /// Decodes a row. Returns None if `data` does not hold a valid row.
    pub fn from_bytes(schema: &Schema, data: &[u8]) -> Option<Self> {
        if data.len() < schema.row_size() {
            return None;
        }
        let bitmap = &data[..schema.null_bitmap_size()];
        let mut offset = schema.null_bitmap_size();
        let mut values = Vec::with_capacity(schema.column_count());

        for (i, column) in schema.columns().enumerate() {
            let width = column.data_type().max_size();
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                values.push(None);
            } else {
                values.push(Some(column.data_type().decode(&data[offset..offset + width])?));
            }
            offset += width;
        }
        Some(Self { values })
    }
}
