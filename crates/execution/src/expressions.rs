//! Expression compilation and evaluation for execution operators.
//!
//! Input contract:
//! - analysis has resolved every column reference to a symbol and enforced
//!   same-type operands;
//! - the producing node's output layout maps each symbol to a channel.
//!
//! Output contract:
//! - each evaluation returns an `ArrayRef` aligned to the input batch's row
//!   count.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, StringArray, StringBuilder,
};
use arrow::compute::kernels::{
    boolean::{and_kleene, not, or_kleene},
    cmp::{eq, gt, gt_eq, lt, lt_eq, neq},
    numeric::{add, div, mul, sub},
};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, SchemaRef};

use quern_common::{QuernError, Result};
use quern_planner::{BinaryOp, Expr, Literal, Symbol};

/// Executable expression over record batches.
pub trait PhysicalExpr: Send + Sync {
    /// Static output type.
    fn data_type(&self) -> DataType;
    /// Evaluate for every row of `batch`.
    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef>;
}

/// Compile an analyzed expression against an operator's output layout.
///
/// `layout` lists the input's symbols in channel order and must be aligned
/// with `input_schema`.
///
/// # Errors
/// `PlanCompilation` when a referenced symbol is missing from the layout;
/// type-shape failures surface as `Execution`.
pub fn compile_expr(
    expr: &Expr,
    layout: &[Symbol],
    input_schema: &SchemaRef,
) -> Result<Arc<dyn PhysicalExpr>> {
    match expr {
        Expr::Symbol(symbol) => {
            let index = layout.iter().position(|s| s == symbol).ok_or_else(|| {
                QuernError::PlanCompilation(format!(
                    "symbol '{symbol}' is not produced by the input node"
                ))
            })?;
            let data_type = input_schema.field(index).data_type().clone();
            Ok(Arc::new(ColumnExpr { index, data_type }))
        }

        Expr::Literal(literal) => Ok(Arc::new(LiteralExpr {
            value: literal.clone(),
            data_type: literal_type(literal),
        })),

        Expr::Not(inner) => {
            let inner = compile_expr(inner, layout, input_schema)?;
            Ok(Arc::new(NotExpr { inner }))
        }

        Expr::And(a, b) => {
            let left = compile_expr(a, layout, input_schema)?;
            let right = compile_expr(b, layout, input_schema)?;
            Ok(Arc::new(BoolBinaryExpr {
                left,
                right,
                op: BoolOp::And,
            }))
        }

        Expr::Or(a, b) => {
            let left = compile_expr(a, layout, input_schema)?;
            let right = compile_expr(b, layout, input_schema)?;
            Ok(Arc::new(BoolBinaryExpr {
                left,
                right,
                op: BoolOp::Or,
            }))
        }

        Expr::BinaryOp { left, op, right } => {
            let left = compile_expr(left, layout, input_schema)?;
            let right = compile_expr(right, layout, input_schema)?;
            let out = binary_out_type(*op, left.data_type(), right.data_type())?;
            Ok(Arc::new(BinaryExpr {
                left,
                right,
                op: *op,
                out,
            }))
        }
    }
}

struct ColumnExpr {
    index: usize,
    data_type: DataType,
}

impl PhysicalExpr for ColumnExpr {
    fn data_type(&self) -> DataType {
        self.data_type.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        Ok(batch.column(self.index).clone())
    }
}

struct LiteralExpr {
    value: Literal,
    data_type: DataType,
}

impl PhysicalExpr for LiteralExpr {
    fn data_type(&self) -> DataType {
        self.data_type.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        literal_to_array(&self.value, batch.num_rows())
    }
}

struct NotExpr {
    inner: Arc<dyn PhysicalExpr>,
}

impl PhysicalExpr for NotExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let array = self.inner.evaluate(batch)?;
        let booleans = array
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| QuernError::Execution("NOT expects boolean input".to_string()))?;
        let out = not(booleans).map_err(|e| QuernError::Execution(format!("not failed: {e}")))?;
        Ok(Arc::new(out))
    }
}

#[derive(Clone, Copy)]
enum BoolOp {
    And,
    Or,
}

struct BoolBinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BoolOp,
}

impl PhysicalExpr for BoolBinaryExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let left = self.left.evaluate(batch)?;
        let right = self.right.evaluate(batch)?;
        let lb = left
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| QuernError::Execution("AND/OR expects boolean input".to_string()))?;
        let rb = right
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| QuernError::Execution("AND/OR expects boolean input".to_string()))?;
        let out = match self.op {
            BoolOp::And => and_kleene(lb, rb),
            BoolOp::Or => or_kleene(lb, rb),
        }
        .map_err(|e| QuernError::Execution(format!("boolean kernel failed: {e}")))?;
        Ok(Arc::new(out))
    }
}

struct BinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BinaryOp,
    out: DataType,
}

impl PhysicalExpr for BinaryExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let left = self.left.evaluate(batch)?;
        let right = self.right.evaluate(batch)?;
        match self.op {
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide => {
                eval_arith(self.op, &left, &right, &self.out)
            }
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq => eval_cmp(self.op, &left, &right),
        }
    }
}

fn literal_type(literal: &Literal) -> DataType {
    match literal {
        Literal::Int64(_) => DataType::Int64,
        Literal::Float64(_) => DataType::Float64,
        Literal::Utf8(_) => DataType::Utf8,
        Literal::Boolean(_) => DataType::Boolean,
        Literal::Null => DataType::Null,
    }
}

fn literal_to_array(literal: &Literal, len: usize) -> Result<ArrayRef> {
    match literal {
        Literal::Int64(v) => {
            let mut builder = Int64Builder::with_capacity(len);
            for _ in 0..len {
                builder.append_value(*v);
            }
            Ok(Arc::new(builder.finish()))
        }
        Literal::Float64(v) => {
            let mut builder = Float64Builder::with_capacity(len);
            for _ in 0..len {
                builder.append_value(*v);
            }
            Ok(Arc::new(builder.finish()))
        }
        Literal::Boolean(v) => {
            let mut builder = BooleanBuilder::with_capacity(len);
            for _ in 0..len {
                builder.append_value(*v);
            }
            Ok(Arc::new(builder.finish()))
        }
        Literal::Utf8(v) => {
            let mut builder = StringBuilder::with_capacity(len, v.len() * len);
            for _ in 0..len {
                builder.append_value(v);
            }
            Ok(Arc::new(builder.finish()))
        }
        Literal::Null => Ok(arrow::array::new_null_array(&DataType::Null, len)),
    }
}

fn binary_out_type(op: BinaryOp, left: DataType, right: DataType) -> Result<DataType> {
    match op {
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq => Ok(DataType::Boolean),
        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide => {
            if left != right {
                return Err(QuernError::Execution(format!(
                    "analysis should have enforced matching operand types; got {left} vs {right}"
                )));
            }
            Ok(left)
        }
    }
}

fn eval_arith(op: BinaryOp, left: &ArrayRef, right: &ArrayRef, out: &DataType) -> Result<ArrayRef> {
    match out {
        DataType::Int64 => {
            let la = downcast::<Int64Array>(left, "Int64")?;
            let ra = downcast::<Int64Array>(right, "Int64")?;
            run_arith(op, la, ra)
        }
        DataType::Float64 => {
            let la = downcast::<Float64Array>(left, "Float64")?;
            let ra = downcast::<Float64Array>(right, "Float64")?;
            run_arith(op, la, ra)
        }
        other => Err(QuernError::Execution(format!(
            "arithmetic not supported for type {other}"
        ))),
    }
}

fn run_arith<T: arrow::array::Datum>(op: BinaryOp, left: &T, right: &T) -> Result<ArrayRef> {
    match op {
        BinaryOp::Plus => add(left, right),
        BinaryOp::Minus => sub(left, right),
        BinaryOp::Multiply => mul(left, right),
        BinaryOp::Divide => div(left, right),
        _ => unreachable!("comparison routed to eval_cmp"),
    }
    .map_err(|e| QuernError::Execution(format!("arithmetic kernel failed: {e}")))
}

fn eval_cmp(op: BinaryOp, left: &ArrayRef, right: &ArrayRef) -> Result<ArrayRef> {
    match left.data_type() {
        DataType::Int64 => {
            let la = downcast::<Int64Array>(left, "Int64")?;
            let ra = downcast::<Int64Array>(right, "Int64")?;
            run_cmp(op, la, ra)
        }
        DataType::Float64 => {
            let la = downcast::<Float64Array>(left, "Float64")?;
            let ra = downcast::<Float64Array>(right, "Float64")?;
            run_cmp(op, la, ra)
        }
        DataType::Utf8 => {
            let la = downcast::<StringArray>(left, "Utf8")?;
            let ra = downcast::<StringArray>(right, "Utf8")?;
            run_cmp(op, la, ra)
        }
        DataType::Boolean => {
            let la = downcast::<BooleanArray>(left, "Boolean")?;
            let ra = downcast::<BooleanArray>(right, "Boolean")?;
            match op {
                BinaryOp::Eq | BinaryOp::NotEq => run_cmp(op, la, ra),
                _ => Err(QuernError::Execution(
                    "ordering comparisons are not supported for boolean".to_string(),
                )),
            }
        }
        other => Err(QuernError::Execution(format!(
            "comparison not supported for type {other}"
        ))),
    }
}

fn run_cmp<T: arrow::array::Datum>(op: BinaryOp, left: &T, right: &T) -> Result<ArrayRef> {
    let out = match op {
        BinaryOp::Eq => eq(left, right),
        BinaryOp::NotEq => neq(left, right),
        BinaryOp::Lt => lt(left, right),
        BinaryOp::LtEq => lt_eq(left, right),
        BinaryOp::Gt => gt(left, right),
        BinaryOp::GtEq => gt_eq(left, right),
        _ => unreachable!("arithmetic routed to eval_arith"),
    }
    .map_err(|e| QuernError::Execution(format!("comparison kernel failed: {e}")))?;
    Ok(Arc::new(out))
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, expected: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| QuernError::Execution(format!("expected {expected} array")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{Field, Schema};

    fn int_batch() -> (Vec<Symbol>, SchemaRef, RecordBatch) {
        let layout = vec![Symbol::new("a"), Symbol::new("b")];
        let schema: SchemaRef = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(Int64Array::from(vec![10, 20, 30])),
            ],
        )
        .unwrap();
        (layout, schema, batch)
    }

    #[test]
    fn symbol_reference_selects_the_right_channel() {
        let (layout, schema, batch) = int_batch();
        let expr = compile_expr(&Expr::Symbol(Symbol::new("b")), &layout, &schema).unwrap();
        let array = expr.evaluate(&batch).unwrap();
        let ints = array.as_any().downcast_ref::<Int64Array>().unwrap();
        let values: Vec<i64> = (0..3).map(|i| ints.value(i)).collect();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn comparison_yields_boolean_mask() {
        let (layout, schema, batch) = int_batch();
        let expr = compile_expr(
            &Expr::BinaryOp {
                left: Box::new(Expr::Symbol(Symbol::new("a"))),
                op: BinaryOp::GtEq,
                right: Box::new(Expr::Literal(Literal::Int64(2))),
            },
            &layout,
            &schema,
        )
        .unwrap();
        assert_eq!(expr.data_type(), DataType::Boolean);
        let array = expr.evaluate(&batch).unwrap();
        let mask = array.as_any().downcast_ref::<BooleanArray>().unwrap();
        let values: Vec<bool> = (0..3).map(|i| mask.value(i)).collect();
        assert_eq!(values, vec![false, true, true]);
    }

    #[test]
    fn arithmetic_preserves_operand_type() {
        let (layout, schema, batch) = int_batch();
        let expr = compile_expr(
            &Expr::BinaryOp {
                left: Box::new(Expr::Symbol(Symbol::new("a"))),
                op: BinaryOp::Plus,
                right: Box::new(Expr::Symbol(Symbol::new("b"))),
            },
            &layout,
            &schema,
        )
        .unwrap();
        assert_eq!(expr.data_type(), DataType::Int64);
        let array = expr.evaluate(&batch).unwrap();
        let ints = array.as_any().downcast_ref::<Int64Array>().unwrap();
        let values: Vec<i64> = (0..3).map(|i| ints.value(i)).collect();
        assert_eq!(values, vec![11, 22, 33]);
    }

    #[test]
    fn unknown_symbol_is_a_compilation_error() {
        let (layout, schema, _) = int_batch();
        let err = compile_expr(&Expr::Symbol(Symbol::new("zz")), &layout, &schema).err().unwrap();
        assert!(matches!(err, QuernError::PlanCompilation(_)));
    }
}
