//! Row-level scalar values.
//!
//! Used wherever execution needs hashable, totally ordered row keys: join
//! build/probe keys, group-by keys, and row materialization for join output.
//! Floats are stored by bit pattern so values can derive `Eq` and `Hash`.

use std::cmp::Ordering;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, StringArray, StringBuilder,
};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, SchemaRef};

use quern_common::{QuernError, Result};

/// A single scalar value lifted out of an arrow array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    Int64(i64),
    /// Float64 stored as raw bits for Eq/Hash.
    Float64Bits(u64),
    Utf8(String),
    Boolean(bool),
    Null,
}

impl ScalarValue {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Rough heap footprint used for memory accounting.
    pub fn estimated_bytes(&self) -> usize {
        match self {
            ScalarValue::Int64(_) | ScalarValue::Float64Bits(_) => 8,
            ScalarValue::Utf8(s) => s.len() + 24,
            ScalarValue::Boolean(_) => 1,
            ScalarValue::Null => 1,
        }
    }
}

/// Total order over same-typed scalars; NULL sorts first.
pub fn compare_scalars(a: &ScalarValue, b: &ScalarValue) -> Ordering {
    match (a, b) {
        (ScalarValue::Null, ScalarValue::Null) => Ordering::Equal,
        (ScalarValue::Null, _) => Ordering::Less,
        (_, ScalarValue::Null) => Ordering::Greater,
        (ScalarValue::Int64(x), ScalarValue::Int64(y)) => x.cmp(y),
        (ScalarValue::Float64Bits(x), ScalarValue::Float64Bits(y)) => f64::from_bits(*x)
            .partial_cmp(&f64::from_bits(*y))
            .unwrap_or(Ordering::Equal),
        (ScalarValue::Utf8(x), ScalarValue::Utf8(y)) => x.cmp(y),
        (ScalarValue::Boolean(x), ScalarValue::Boolean(y)) => x.cmp(y),
        // Mixed types never reach comparison; analysis enforces typing.
        _ => Ordering::Equal,
    }
}

/// Lift one value out of an array.
pub fn scalar_from_array(array: &ArrayRef, row: usize) -> Result<ScalarValue> {
    if array.is_null(row) {
        return Ok(ScalarValue::Null);
    }
    match array.data_type() {
        DataType::Int64 => {
            let a = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| QuernError::Execution("expected Int64Array".to_string()))?;
            Ok(ScalarValue::Int64(a.value(row)))
        }
        DataType::Float64 => {
            let a = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| QuernError::Execution("expected Float64Array".to_string()))?;
            Ok(ScalarValue::Float64Bits(a.value(row).to_bits()))
        }
        DataType::Utf8 => {
            let a = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| QuernError::Execution("expected StringArray".to_string()))?;
            Ok(ScalarValue::Utf8(a.value(row).to_string()))
        }
        DataType::Boolean => {
            let a = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| QuernError::Execution("expected BooleanArray".to_string()))?;
            Ok(ScalarValue::Boolean(a.value(row)))
        }
        other => Err(QuernError::Execution(format!(
            "unsupported scalar type: {other}"
        ))),
    }
}

/// Build a typed array from scalars.
pub fn scalars_to_array(values: &[ScalarValue], data_type: &DataType) -> Result<ArrayRef> {
    match data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for value in values {
                match value {
                    ScalarValue::Int64(v) => builder.append_value(*v),
                    ScalarValue::Null => builder.append_null(),
                    other => return Err(type_error("Int64", other)),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for value in values {
                match value {
                    ScalarValue::Float64Bits(v) => builder.append_value(f64::from_bits(*v)),
                    ScalarValue::Null => builder.append_null(),
                    other => return Err(type_error("Float64", other)),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Utf8 => {
            let mut builder = StringBuilder::new();
            for value in values {
                match value {
                    ScalarValue::Utf8(v) => builder.append_value(v),
                    ScalarValue::Null => builder.append_null(),
                    other => return Err(type_error("Utf8", other)),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(values.len());
            for value in values {
                match value {
                    ScalarValue::Boolean(v) => builder.append_value(*v),
                    ScalarValue::Null => builder.append_null(),
                    other => return Err(type_error("Boolean", other)),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        other => Err(QuernError::Execution(format!(
            "unsupported output type: {other}"
        ))),
    }
}

fn type_error(expected: &str, got: &ScalarValue) -> QuernError {
    QuernError::Execution(format!("expected {expected} scalar, got {got:?}"))
}

/// Materialize rows of scalars into one batch with the given schema.
pub fn rows_to_batch(schema: &SchemaRef, rows: &[Vec<ScalarValue>]) -> Result<RecordBatch> {
    let mut columns = vec![Vec::<ScalarValue>::with_capacity(rows.len()); schema.fields().len()];
    for row in rows {
        for (idx, value) in row.iter().enumerate() {
            columns[idx].push(value.clone());
        }
    }
    let arrays = columns
        .iter()
        .enumerate()
        .map(|(idx, column)| scalars_to_array(column, schema.field(idx).data_type()))
        .collect::<Result<Vec<_>>>()?;
    RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| QuernError::Execution(format!("row materialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{Field, Schema};

    #[test]
    fn round_trips_through_arrays() {
        let array: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), None, Some(3)]));
        assert_eq!(scalar_from_array(&array, 0).unwrap(), ScalarValue::Int64(1));
        assert_eq!(scalar_from_array(&array, 1).unwrap(), ScalarValue::Null);

        let back = scalars_to_array(
            &[ScalarValue::Int64(1), ScalarValue::Null, ScalarValue::Int64(3)],
            &DataType::Int64,
        )
        .unwrap();
        assert_eq!(back.as_ref(), array.as_ref());
    }

    #[test]
    fn rows_materialize_in_order() {
        let schema: SchemaRef = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
        ]));
        let rows = vec![
            vec![ScalarValue::Int64(1), ScalarValue::Utf8("x".to_string())],
            vec![ScalarValue::Int64(2), ScalarValue::Utf8("y".to_string())],
        ];
        let batch = rows_to_batch(&schema, &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(
            scalar_from_array(batch.column(0), 1).unwrap(),
            ScalarValue::Int64(2)
        );
    }

    #[test]
    fn floats_hash_by_bits() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ScalarValue::Float64Bits(1.5_f64.to_bits()));
        assert!(set.contains(&ScalarValue::Float64Bits(1.5_f64.to_bits())));
        assert!(!set.contains(&ScalarValue::Float64Bits(2.5_f64.to_bits())));
    }
}
