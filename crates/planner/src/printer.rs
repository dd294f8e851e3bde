//! Plan rendering for diagnostics.

use crate::fragmenter::SubPlan;
use crate::plan::{BinaryOp, Expr, Literal, PlanNode};

/// Render a plan tree as human-readable multiline text.
pub fn explain_plan(plan: &PlanNode) -> String {
    let mut out = String::new();
    fmt_plan(plan, 0, &mut out);
    out
}

/// Render a fragment tree, one fragment section per subplan.
pub fn explain_subplan(subplan: &SubPlan) -> String {
    let mut out = String::new();
    fmt_subplan(subplan, &mut out);
    out
}

fn fmt_subplan(subplan: &SubPlan, out: &mut String) {
    let fragment = &subplan.fragment;
    let sources: Vec<String> = fragment.sources.iter().map(|id| id.to_string()).collect();
    out.push_str(&format!(
        "Fragment {} sources=[{}]\n",
        fragment.id,
        sources.join(", ")
    ));
    fmt_plan(&fragment.root, 1, out);
    for child in &subplan.children {
        fmt_subplan(child, out);
    }
}

fn fmt_plan(plan: &PlanNode, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match plan {
        PlanNode::TableScan {
            id,
            table,
            assignments,
        } => {
            out.push_str(&format!("{pad}TableScan[{id}] table={table}\n"));
            for (symbol, column) in assignments {
                out.push_str(&format!("{pad}  {symbol} := {column}\n"));
            }
        }
        PlanNode::Filter {
            id,
            input,
            predicate,
        } => {
            out.push_str(&format!("{pad}Filter[{id}] {}\n", fmt_expr(predicate)));
            fmt_plan(input, indent + 1, out);
        }
        PlanNode::Project {
            id,
            input,
            assignments,
        } => {
            out.push_str(&format!("{pad}Project[{id}]\n"));
            for (symbol, expr) in assignments {
                out.push_str(&format!("{pad}  {symbol} := {}\n", fmt_expr(expr)));
            }
            fmt_plan(input, indent + 1, out);
        }
        PlanNode::Join {
            id,
            left,
            right,
            criteria,
        } => {
            let on: Vec<String> = criteria
                .iter()
                .map(|(l, r)| format!("{l} = {r}"))
                .collect();
            out.push_str(&format!("{pad}Join[{id}] on={}\n", on.join(" AND ")));
            out.push_str(&format!("{pad}  probe:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  build:\n"));
            fmt_plan(right, indent + 2, out);
        }
        PlanNode::Aggregate {
            id,
            input,
            group_by,
            aggregates,
        } => {
            let groups: Vec<String> = group_by.iter().map(|s| s.to_string()).collect();
            out.push_str(&format!(
                "{pad}Aggregate[{id}] group_by=[{}]\n",
                groups.join(", ")
            ));
            for (symbol, call) in aggregates {
                out.push_str(&format!(
                    "{pad}  {symbol} := #{}({})\n",
                    call.handle.0,
                    fmt_expr(&call.argument)
                ));
            }
            fmt_plan(input, indent + 1, out);
        }
        PlanNode::Output {
            id,
            input,
            column_names,
            output_symbols,
        } => {
            out.push_str(&format!("{pad}Output[{id}]\n"));
            for (name, symbol) in column_names.iter().zip(output_symbols.iter()) {
                out.push_str(&format!("{pad}  {name} <- {symbol}\n"));
            }
            fmt_plan(input, indent + 1, out);
        }
        PlanNode::Exchange { id, input } => {
            out.push_str(&format!("{pad}Exchange[{id}]\n"));
            fmt_plan(input, indent + 1, out);
        }
        PlanNode::RemoteSource { id, fragment, .. } => {
            out.push_str(&format!("{pad}RemoteSource[{id}] fragment={fragment}\n"));
        }
    }
}

fn fmt_expr(expr: &Expr) -> String {
    match expr {
        Expr::Symbol(symbol) => symbol.to_string(),
        Expr::Literal(literal) => fmt_literal(literal),
        Expr::BinaryOp { left, op, right } => {
            format!("({} {} {})", fmt_expr(left), fmt_op(*op), fmt_expr(right))
        }
        Expr::And(a, b) => format!("({} AND {})", fmt_expr(a), fmt_expr(b)),
        Expr::Or(a, b) => format!("({} OR {})", fmt_expr(a), fmt_expr(b)),
        Expr::Not(inner) => format!("NOT ({})", fmt_expr(inner)),
    }
}

fn fmt_literal(literal: &Literal) -> String {
    match literal {
        Literal::Int64(v) => v.to_string(),
        Literal::Float64(v) => v.to_string(),
        Literal::Utf8(v) => format!("'{v}'"),
        Literal::Boolean(v) => v.to_string(),
        Literal::Null => "NULL".to_string(),
    }
}

fn fmt_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::NotEq => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::Plus => "+",
        BinaryOp::Minus => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Symbol;
    use quern_catalog::QualifiedTableName;
    use quern_common::PlanNodeId;

    #[test]
    fn renders_nested_nodes_with_ids() {
        let scan = PlanNode::TableScan {
            id: PlanNodeId(0),
            table: QualifiedTableName::new("cat", "sch", "t"),
            assignments: vec![(Symbol::new("a"), "a".to_string())],
        };
        let filter = PlanNode::Filter {
            id: PlanNodeId(1),
            input: Box::new(scan),
            predicate: Expr::BinaryOp {
                left: Box::new(Expr::Symbol(Symbol::new("a"))),
                op: BinaryOp::Eq,
                right: Box::new(Expr::Literal(Literal::Int64(5))),
            },
        };
        let text = explain_plan(&filter);
        assert!(text.contains("Filter[1] (a = 5)"));
        assert!(text.contains("TableScan[0] table=cat.sch.t"));
    }
}
