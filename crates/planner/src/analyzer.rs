//! Semantic analysis: bind a statement tree against the catalog.
//!
//! The analyzer is a pure function of (statement, session, catalog snapshot,
//! function registry): it resolves every table, column, and function
//! reference, assigns a fresh symbol to every output expression, and records
//! the inferred scalar type of every symbol. It performs no I/O beyond
//! catalog reads.

use std::collections::{HashMap, HashSet};
use std::fmt;

use arrow_schema::DataType;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOp, Expr as SqlExpr, Function, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, JoinConstraint, JoinOperator, ObjectName, Query, Select,
    SelectItem, SetExpr, Statement, TableFactor, UnaryOperator, Value,
};

use quern_catalog::{FunctionRegistry, Metadata, QualifiedTableName, Session, TableMetadata};
use quern_common::{QuernError, Result};

use crate::plan::{AggregateCall, BinaryOp, Expr, Literal};

/// Compiler-internal unique name bound to an expression's output column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Wrap an already-unique name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The symbol's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mints fresh unique symbols from name hints.
#[derive(Debug, Default)]
pub struct SymbolAllocator {
    used: HashSet<String>,
}

impl SymbolAllocator {
    /// Empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh symbol named after `hint`, suffixing on collision.
    pub fn new_symbol(&mut self, hint: &str) -> Symbol {
        if self.used.insert(hint.to_string()) {
            return Symbol::new(hint);
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{hint}_{suffix}");
            if self.used.insert(candidate.clone()) {
                return Symbol::new(candidate);
            }
            suffix += 1;
        }
    }
}

/// One resolved FROM-clause relation: table metadata plus a symbol per column.
#[derive(Debug, Clone)]
pub struct RelationBinding {
    /// Resolved qualified name.
    pub table: QualifiedTableName,
    /// Alias in scope (explicit alias or bare table name).
    pub alias: String,
    /// Catalog metadata snapshot for the table.
    pub metadata: TableMetadata,
    /// One symbol per column, in declared order.
    pub column_symbols: Vec<Symbol>,
}

impl RelationBinding {
    fn find_column(&self, name: &str) -> Option<(Symbol, DataType)> {
        self.metadata
            .columns
            .iter()
            .position(|c| c.name == name)
            .map(|idx| {
                (
                    self.column_symbols[idx].clone(),
                    self.metadata.columns[idx].data_type.clone(),
                )
            })
    }

    fn matches_qualifier(&self, qualifier: &str) -> bool {
        if self.alias == qualifier {
            return true;
        }
        let full = self.table.to_string();
        full == qualifier
            || full.ends_with(&format!(".{qualifier}"))
    }
}

/// One JOIN clause: equi-join pairs as (left-side symbol, right-side symbol).
#[derive(Debug, Clone)]
pub struct JoinClause {
    /// Resolved equi-join criteria.
    pub criteria: Vec<(Symbol, Symbol)>,
}

/// One output column of the query.
#[derive(Debug, Clone)]
pub struct OutputColumn {
    /// Result column name.
    pub name: String,
    /// Fresh symbol assigned to this output expression.
    pub symbol: Symbol,
    /// Defining expression over input/aggregate symbols.
    pub expr: Expr,
}

/// The fully resolved query shape consumed by the logical planner.
#[derive(Debug, Clone)]
pub struct AnalyzedQuery {
    /// FROM-clause relations in syntactic order.
    pub relations: Vec<RelationBinding>,
    /// `joins[i]` connects `relations[i + 1]` to the accumulated left side.
    pub joins: Vec<JoinClause>,
    /// WHERE predicate, rewritten over symbols.
    pub predicate: Option<Expr>,
    /// GROUP BY symbols.
    pub group_by: Vec<Symbol>,
    /// Aggregate calls with their output symbols.
    pub aggregates: Vec<(Symbol, AggregateCall)>,
    /// Output columns in SELECT order.
    pub outputs: Vec<OutputColumn>,
}

/// Result of analysis: symbol allocator, symbol types, and the query shape.
///
/// Produced once per statement and consumed read-only by planning stages.
#[derive(Debug)]
pub struct AnalysisResult {
    symbol_allocator: SymbolAllocator,
    symbol_types: HashMap<Symbol, DataType>,
    query: AnalyzedQuery,
}

impl AnalysisResult {
    /// Inferred scalar type of every symbol.
    pub fn types(&self) -> &HashMap<Symbol, DataType> {
        &self.symbol_types
    }

    /// The resolved query shape.
    pub fn query(&self) -> &AnalyzedQuery {
        &self.query
    }

    /// The allocator that minted this analysis's symbols.
    pub fn symbol_allocator(&self) -> &SymbolAllocator {
        &self.symbol_allocator
    }
}

/// Statement analyzer.
pub struct Analyzer<'a> {
    session: &'a Session,
    metadata: &'a dyn Metadata,
    functions: &'a FunctionRegistry,
}

struct AnalysisContext {
    allocator: SymbolAllocator,
    types: HashMap<Symbol, DataType>,
}

impl AnalysisContext {
    fn new_symbol(&mut self, hint: &str, data_type: DataType) -> Symbol {
        let symbol = self.allocator.new_symbol(hint);
        self.types.insert(symbol.clone(), data_type);
        symbol
    }
}

impl<'a> Analyzer<'a> {
    /// Create an analyzer bound to a session, catalog, and function registry.
    pub fn new(
        session: &'a Session,
        metadata: &'a dyn Metadata,
        functions: &'a FunctionRegistry,
    ) -> Self {
        Self {
            session,
            metadata,
            functions,
        }
    }

    /// Analyze a statement.
    ///
    /// Error taxonomy: name resolution failures surface as `TableNotFound` /
    /// `ColumnNotFound` / `FunctionNotFound` / `AmbiguousReference`; type and
    /// grouping violations as `Semantic`; recognized-but-unimplemented SQL
    /// shapes as `Unsupported`.
    pub fn analyze(&self, statement: &Statement) -> Result<AnalysisResult> {
        let query = match statement {
            Statement::Query(query) => query,
            _ => {
                return Err(QuernError::Unsupported(
                    "only SELECT queries are supported".to_string(),
                ))
            }
        };
        let select = Self::unwrap_select(query)?;

        let mut ctx = AnalysisContext {
            allocator: SymbolAllocator::new(),
            types: HashMap::new(),
        };

        let (relations, joins) = self.analyze_from(select, &mut ctx)?;
        let predicate = self.analyze_where(select, &relations)?;
        let group_by = self.analyze_group_by(select, &relations)?;
        let (aggregates, outputs) = self.analyze_select_items(select, &relations, &mut ctx)?;

        validate_grouping(&group_by, &aggregates, &outputs)?;

        tracing::debug!(
            user = self.session.user(),
            relations = relations.len(),
            outputs = outputs.len(),
            "statement analyzed"
        );

        Ok(AnalysisResult {
            symbol_allocator: ctx.allocator,
            symbol_types: ctx.types,
            query: AnalyzedQuery {
                relations,
                joins,
                predicate,
                group_by,
                aggregates,
                outputs,
            },
        })
    }

    fn unwrap_select(query: &Query) -> Result<&Select> {
        if query.with.is_some() {
            return Err(QuernError::Unsupported("WITH is not supported".to_string()));
        }
        if query.order_by.is_some() {
            return Err(QuernError::Unsupported(
                "ORDER BY is not supported".to_string(),
            ));
        }
        if query.limit.is_some() || query.offset.is_some() || query.fetch.is_some() {
            return Err(QuernError::Unsupported(
                "LIMIT/OFFSET/FETCH are not supported".to_string(),
            ));
        }
        let select = match &*query.body {
            SetExpr::Select(select) => select.as_ref(),
            _ => {
                return Err(QuernError::Unsupported(
                    "set operations are not supported".to_string(),
                ))
            }
        };
        if select.distinct.is_some() {
            return Err(QuernError::Unsupported(
                "SELECT DISTINCT is not supported".to_string(),
            ));
        }
        if select.having.is_some() {
            return Err(QuernError::Unsupported(
                "HAVING is not supported".to_string(),
            ));
        }
        Ok(select)
    }

    fn analyze_from(
        &self,
        select: &Select,
        ctx: &mut AnalysisContext,
    ) -> Result<(Vec<RelationBinding>, Vec<JoinClause>)> {
        if select.from.len() != 1 {
            return Err(QuernError::Unsupported(
                "exactly one FROM item is required (use JOIN for multiple tables)".to_string(),
            ));
        }
        let from = &select.from[0];

        let mut relations = vec![self.bind_relation(&from.relation, ctx)?];
        let mut joins = Vec::new();
        for join in &from.joins {
            let constraint = match &join.join_operator {
                JoinOperator::Inner(constraint) => constraint,
                _ => {
                    return Err(QuernError::Unsupported(
                        "only INNER JOIN is supported".to_string(),
                    ))
                }
            };
            let on = match constraint {
                JoinConstraint::On(expr) => expr,
                _ => {
                    return Err(QuernError::Unsupported(
                        "JOIN requires an ON clause".to_string(),
                    ))
                }
            };
            relations.push(self.bind_relation(&join.relation, ctx)?);
            let criteria = self.analyze_join_criteria(on, &relations)?;
            joins.push(JoinClause { criteria });
        }
        Ok((relations, joins))
    }

    fn bind_relation(
        &self,
        factor: &TableFactor,
        ctx: &mut AnalysisContext,
    ) -> Result<RelationBinding> {
        let (name, alias) = match factor {
            TableFactor::Table { name, alias, .. } => (name, alias),
            _ => {
                return Err(QuernError::Unsupported(
                    "only plain table names are supported in FROM".to_string(),
                ))
            }
        };
        let parts = object_name_parts(name);
        let part_refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        let qualified = self.session.resolve_table_name(&part_refs)?;
        let metadata = self.metadata.get_table(&qualified)?;
        let alias = alias
            .as_ref()
            .map(|a| a.name.value.clone())
            .unwrap_or_else(|| qualified.table.clone());
        let column_symbols = metadata
            .columns
            .iter()
            .map(|column| ctx.new_symbol(&column.name, column.data_type.clone()))
            .collect();
        Ok(RelationBinding {
            table: qualified,
            alias,
            metadata,
            column_symbols,
        })
    }

    /// Resolve `ON a = b AND c = d` into (left-side, right-side) symbol pairs,
    /// where the right side is the most recently joined relation.
    fn analyze_join_criteria(
        &self,
        on: &SqlExpr,
        relations: &[RelationBinding],
    ) -> Result<Vec<(Symbol, Symbol)>> {
        let mut pairs = Vec::new();
        collect_equi_pairs(on, &mut pairs)?;
        if pairs.is_empty() {
            return Err(QuernError::Unsupported(
                "JOIN ... ON must contain at least one equi-join condition".to_string(),
            ));
        }

        let right_relation = relations.last().expect("at least one relation bound");
        let mut criteria = Vec::with_capacity(pairs.len());
        for (a, b) in pairs {
            let (a_symbol, a_type) = resolve_column(relations, &a)?;
            let (b_symbol, b_type) = resolve_column(relations, &b)?;
            if a_type != b_type {
                return Err(QuernError::Semantic(format!(
                    "join keys {a_symbol} and {b_symbol} have mismatched types \
                     ({a_type} vs {b_type})"
                )));
            }
            let a_on_right = right_relation.column_symbols.contains(&a_symbol);
            let b_on_right = right_relation.column_symbols.contains(&b_symbol);
            match (a_on_right, b_on_right) {
                (false, true) => criteria.push((a_symbol, b_symbol)),
                (true, false) => criteria.push((b_symbol, a_symbol)),
                _ => {
                    return Err(QuernError::Semantic(
                        "join condition must compare columns of both join inputs".to_string(),
                    ))
                }
            }
        }
        Ok(criteria)
    }

    fn analyze_where(
        &self,
        select: &Select,
        relations: &[RelationBinding],
    ) -> Result<Option<Expr>> {
        let Some(selection) = &select.selection else {
            return Ok(None);
        };
        let (expr, data_type) = analyze_scalar_expr(selection, relations)?;
        if data_type != DataType::Boolean {
            return Err(QuernError::Semantic(format!(
                "WHERE predicate must be boolean, got {data_type}"
            )));
        }
        Ok(Some(expr))
    }

    fn analyze_group_by(
        &self,
        select: &Select,
        relations: &[RelationBinding],
    ) -> Result<Vec<Symbol>> {
        let expressions = match &select.group_by {
            GroupByExpr::Expressions(exprs, modifiers) => {
                if !modifiers.is_empty() {
                    return Err(QuernError::Unsupported(
                        "GROUP BY modifiers are not supported".to_string(),
                    ));
                }
                exprs
            }
            GroupByExpr::All(_) => {
                return Err(QuernError::Unsupported(
                    "GROUP BY ALL is not supported".to_string(),
                ))
            }
        };
        expressions
            .iter()
            .map(|expr| match expr {
                SqlExpr::Identifier(_) | SqlExpr::CompoundIdentifier(_) => {
                    let parts = identifier_parts(expr)?;
                    resolve_column(relations, &parts).map(|(symbol, _)| symbol)
                }
                _ => Err(QuernError::Unsupported(
                    "GROUP BY supports plain column references only".to_string(),
                )),
            })
            .collect()
    }

    fn analyze_select_items(
        &self,
        select: &Select,
        relations: &[RelationBinding],
        ctx: &mut AnalysisContext,
    ) -> Result<(Vec<(Symbol, AggregateCall)>, Vec<OutputColumn>)> {
        if select.projection.is_empty() {
            return Err(QuernError::Semantic(
                "SELECT list must not be empty".to_string(),
            ));
        }
        let mut aggregates = Vec::new();
        let mut outputs = Vec::new();
        for (idx, item) in select.projection.iter().enumerate() {
            let (sql_expr, alias) = match item {
                SelectItem::UnnamedExpr(expr) => (expr, None),
                SelectItem::ExprWithAlias { expr, alias } => (expr, Some(alias.value.clone())),
                SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(_, _) => {
                    return Err(QuernError::Unsupported(
                        "SELECT * is not supported (use explicit columns)".to_string(),
                    ))
                }
            };

            let (expr, data_type, default_name) = match sql_expr {
                SqlExpr::Function(function) => {
                    let (call, function_name, return_type) =
                        self.analyze_aggregate(function, relations)?;
                    let agg_symbol = ctx.new_symbol(&function_name, return_type.clone());
                    aggregates.push((agg_symbol.clone(), call));
                    (Expr::Symbol(agg_symbol), return_type, function_name)
                }
                _ => {
                    let (expr, data_type) = analyze_scalar_expr(sql_expr, relations)?;
                    (expr, data_type, derive_output_name(sql_expr, idx))
                }
            };

            let name = alias.unwrap_or(default_name);
            let symbol = ctx.new_symbol(&name, data_type);
            outputs.push(OutputColumn { name, symbol, expr });
        }
        Ok((aggregates, outputs))
    }

    fn analyze_aggregate(
        &self,
        function: &Function,
        relations: &[RelationBinding],
    ) -> Result<(AggregateCall, String, DataType)> {
        if function.over.is_some() || function.filter.is_some() {
            return Err(QuernError::Unsupported(
                "window and filtered aggregate forms are not supported".to_string(),
            ));
        }
        let name = object_name_parts(&function.name).join(".").to_ascii_lowercase();
        let argument = match &function.args {
            FunctionArguments::List(list) if list.args.len() == 1 => match &list.args[0] {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => expr,
                FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => {
                    return Err(QuernError::Unsupported(format!(
                        "{name}(*) is not supported (use {name}(column))"
                    )))
                }
                _ => {
                    return Err(QuernError::Unsupported(
                        "unsupported aggregate argument form".to_string(),
                    ))
                }
            },
            _ => {
                return Err(QuernError::Unsupported(format!(
                    "{name}() requires exactly one argument"
                )))
            }
        };
        let (argument, argument_type) = analyze_scalar_expr(argument, relations)?;
        let handle = self
            .functions
            .resolve_function(&name, std::slice::from_ref(&argument_type))?;
        let return_type = self.functions.get_function(handle)?.return_type.clone();
        Ok((AggregateCall { handle, argument }, name, return_type))
    }
}

/// Resolve a possibly qualified column reference against in-scope relations.
fn resolve_column(relations: &[RelationBinding], parts: &[String]) -> Result<(Symbol, DataType)> {
    let (column_name, qualifier) = parts
        .split_last()
        .ok_or_else(|| QuernError::InvalidArgument("empty column reference".to_string()))?;
    let qualifier = qualifier.join(".");

    let mut matches = Vec::new();
    for relation in relations {
        if !qualifier.is_empty() && !relation.matches_qualifier(&qualifier) {
            continue;
        }
        if let Some(found) = relation.find_column(column_name) {
            matches.push(found);
        }
    }
    let full_name = parts.join(".");
    match matches.len() {
        0 => Err(QuernError::ColumnNotFound(full_name)),
        1 => Ok(matches.remove(0)),
        _ => Err(QuernError::AmbiguousReference(full_name)),
    }
}

/// Analyze a scalar expression, resolving columns to symbols and inferring
/// the result type. Aggregate calls are not allowed here.
fn analyze_scalar_expr(
    expr: &SqlExpr,
    relations: &[RelationBinding],
) -> Result<(Expr, DataType)> {
    match expr {
        SqlExpr::Identifier(_) | SqlExpr::CompoundIdentifier(_) => {
            let parts = identifier_parts(expr)?;
            let (symbol, data_type) = resolve_column(relations, &parts)?;
            Ok((Expr::Symbol(symbol), data_type))
        }
        SqlExpr::Value(value) => analyze_literal(value),
        SqlExpr::Nested(inner) => analyze_scalar_expr(inner, relations),
        SqlExpr::BinaryOp { left, op, right } => {
            if matches!(op, SqlBinaryOp::And | SqlBinaryOp::Or) {
                let (l, l_type) = analyze_scalar_expr(left, relations)?;
                let (r, r_type) = analyze_scalar_expr(right, relations)?;
                if l_type != DataType::Boolean || r_type != DataType::Boolean {
                    return Err(QuernError::Semantic(
                        "AND/OR operands must be boolean".to_string(),
                    ));
                }
                let combined = match op {
                    SqlBinaryOp::And => Expr::And(Box::new(l), Box::new(r)),
                    _ => Expr::Or(Box::new(l), Box::new(r)),
                };
                return Ok((combined, DataType::Boolean));
            }

            let binary_op = convert_binary_op(op)?;
            let (l, l_type) = analyze_scalar_expr(left, relations)?;
            let (r, r_type) = analyze_scalar_expr(right, relations)?;
            if l_type != r_type {
                return Err(QuernError::Semantic(format!(
                    "operands of {op} have mismatched types ({l_type} vs {r_type})"
                )));
            }
            let result_type = match binary_op {
                BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq => DataType::Boolean,
                BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide => {
                    if !matches!(l_type, DataType::Int64 | DataType::Float64) {
                        return Err(QuernError::Semantic(format!(
                            "arithmetic requires numeric operands, got {l_type}"
                        )));
                    }
                    l_type
                }
            };
            Ok((
                Expr::BinaryOp {
                    left: Box::new(l),
                    op: binary_op,
                    right: Box::new(r),
                },
                result_type,
            ))
        }
        SqlExpr::UnaryOp {
            op: UnaryOperator::Not,
            expr: inner,
        } => {
            let (inner, inner_type) = analyze_scalar_expr(inner, relations)?;
            if inner_type != DataType::Boolean {
                return Err(QuernError::Semantic(
                    "NOT operand must be boolean".to_string(),
                ));
            }
            Ok((Expr::Not(Box::new(inner)), DataType::Boolean))
        }
        SqlExpr::UnaryOp {
            op: UnaryOperator::Minus,
            expr: inner,
        } => match analyze_scalar_expr(inner, relations)? {
            (Expr::Literal(Literal::Int64(v)), _) => {
                Ok((Expr::Literal(Literal::Int64(-v)), DataType::Int64))
            }
            (Expr::Literal(Literal::Float64(v)), _) => {
                Ok((Expr::Literal(Literal::Float64(-v)), DataType::Float64))
            }
            _ => Err(QuernError::Unsupported(
                "unary minus is supported for numeric literals only".to_string(),
            )),
        },
        SqlExpr::Function(_) => Err(QuernError::Unsupported(
            "function calls are only supported as top-level aggregate select items".to_string(),
        )),
        other => Err(QuernError::Unsupported(format!(
            "unsupported SQL expression: {other}"
        ))),
    }
}

fn analyze_literal(value: &Value) -> Result<(Expr, DataType)> {
    match value {
        Value::Number(text, _) => {
            if text.contains('.') || text.contains('e') || text.contains('E') {
                let parsed: f64 = text
                    .parse()
                    .map_err(|_| QuernError::Semantic(format!("bad numeric literal: {text}")))?;
                Ok((Expr::Literal(Literal::Float64(parsed)), DataType::Float64))
            } else {
                let parsed: i64 = text
                    .parse()
                    .map_err(|_| QuernError::Semantic(format!("bad numeric literal: {text}")))?;
                Ok((Expr::Literal(Literal::Int64(parsed)), DataType::Int64))
            }
        }
        Value::SingleQuotedString(text) => Ok((
            Expr::Literal(Literal::Utf8(text.clone())),
            DataType::Utf8,
        )),
        Value::Boolean(b) => Ok((Expr::Literal(Literal::Boolean(*b)), DataType::Boolean)),
        Value::Null => Ok((Expr::Literal(Literal::Null), DataType::Null)),
        other => Err(QuernError::Unsupported(format!(
            "unsupported SQL literal: {other}"
        ))),
    }
}

fn convert_binary_op(op: &SqlBinaryOp) -> Result<BinaryOp> {
    Ok(match op {
        SqlBinaryOp::Eq => BinaryOp::Eq,
        SqlBinaryOp::NotEq => BinaryOp::NotEq,
        SqlBinaryOp::Lt => BinaryOp::Lt,
        SqlBinaryOp::LtEq => BinaryOp::LtEq,
        SqlBinaryOp::Gt => BinaryOp::Gt,
        SqlBinaryOp::GtEq => BinaryOp::GtEq,
        SqlBinaryOp::Plus => BinaryOp::Plus,
        SqlBinaryOp::Minus => BinaryOp::Minus,
        SqlBinaryOp::Multiply => BinaryOp::Multiply,
        SqlBinaryOp::Divide => BinaryOp::Divide,
        other => {
            return Err(QuernError::Unsupported(format!(
                "unsupported binary operator: {other}"
            )))
        }
    })
}

fn collect_equi_pairs(expr: &SqlExpr, out: &mut Vec<(Vec<String>, Vec<String>)>) -> Result<()> {
    match expr {
        SqlExpr::BinaryOp { left, op, right } if *op == SqlBinaryOp::Eq => {
            out.push((identifier_parts(left)?, identifier_parts(right)?));
            Ok(())
        }
        SqlExpr::BinaryOp { left, op, right } if *op == SqlBinaryOp::And => {
            collect_equi_pairs(left, out)?;
            collect_equi_pairs(right, out)
        }
        SqlExpr::Nested(inner) => collect_equi_pairs(inner, out),
        other => Err(QuernError::Unsupported(format!(
            "JOIN ... ON supports equi-join conditions only, got: {other}"
        ))),
    }
}

fn identifier_parts(expr: &SqlExpr) -> Result<Vec<String>> {
    match expr {
        SqlExpr::Identifier(ident) => Ok(vec![ident.value.clone()]),
        SqlExpr::CompoundIdentifier(idents) => {
            Ok(idents.iter().map(|i| i.value.clone()).collect())
        }
        other => Err(QuernError::Unsupported(format!(
            "expected a column reference, got: {other}"
        ))),
    }
}

fn object_name_parts(name: &ObjectName) -> Vec<String> {
    name.0.iter().map(|ident| ident.value.clone()).collect()
}

fn derive_output_name(expr: &SqlExpr, index: usize) -> String {
    match expr {
        SqlExpr::Identifier(ident) => ident.value.clone(),
        SqlExpr::CompoundIdentifier(idents) => idents
            .last()
            .map(|i| i.value.clone())
            .unwrap_or_else(|| format!("_col{index}")),
        _ => format!("_col{index}"),
    }
}

/// With aggregation present, every plain output expression may reference
/// only grouped symbols.
fn validate_grouping(
    group_by: &[Symbol],
    aggregates: &[(Symbol, AggregateCall)],
    outputs: &[OutputColumn],
) -> Result<()> {
    if aggregates.is_empty() && group_by.is_empty() {
        return Ok(());
    }
    let aggregate_symbols: HashSet<&Symbol> = aggregates.iter().map(|(s, _)| s).collect();
    for output in outputs {
        let mut referenced = Vec::new();
        output.expr.collect_symbols(&mut referenced);
        for symbol in referenced {
            if !group_by.contains(&symbol) && !aggregate_symbols.contains(&symbol) {
                return Err(QuernError::Semantic(format!(
                    "'{}' must be an aggregate expression or appear in GROUP BY",
                    output.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;
    use quern_catalog::{ColumnMetadata, InMemoryMetadata};

    fn test_catalog() -> InMemoryMetadata {
        let catalog = InMemoryMetadata::new();
        catalog
            .create_table(TableMetadata::new(
                QualifiedTableName::new("cat", "sch", "t"),
                vec![
                    ColumnMetadata::new("a", DataType::Int64),
                    ColumnMetadata::new("b", DataType::Int64),
                ],
            ))
            .unwrap();
        catalog
            .create_table(TableMetadata::new(
                QualifiedTableName::new("cat", "sch", "u"),
                vec![
                    ColumnMetadata::new("a", DataType::Int64),
                    ColumnMetadata::new("c", DataType::Utf8),
                ],
            ))
            .unwrap();
        catalog
    }

    fn analyze(sql: &str) -> Result<AnalysisResult> {
        let catalog = test_catalog();
        let functions = FunctionRegistry::builtin();
        let session = Session::new("test", "cat", "sch");
        let statement = parse_statement(sql)?;
        Analyzer::new(&session, &catalog, &functions).analyze(&statement)
    }

    #[test]
    fn resolves_tables_with_session_defaults() {
        let analysis = analyze("SELECT a FROM t").unwrap();
        let query = analysis.query();
        assert_eq!(query.relations.len(), 1);
        assert_eq!(
            query.relations[0].table,
            QualifiedTableName::new("cat", "sch", "t")
        );
        assert_eq!(query.outputs.len(), 1);
        assert_eq!(query.outputs[0].name, "a");
    }

    #[test]
    fn records_types_for_every_symbol() {
        let analysis = analyze("SELECT t.a FROM cat.sch.t WHERE t.b = 5").unwrap();
        let query = analysis.query();
        for symbol in &query.relations[0].column_symbols {
            assert_eq!(analysis.types()[symbol], DataType::Int64);
        }
        assert_eq!(analysis.types()[&query.outputs[0].symbol], DataType::Int64);
    }

    #[test]
    fn unknown_table_is_table_not_found() {
        let err = analyze("SELECT a FROM missing").unwrap_err();
        assert!(matches!(err, QuernError::TableNotFound(_)));
    }

    #[test]
    fn unknown_column_is_column_not_found() {
        let err = analyze("SELECT zz FROM t").unwrap_err();
        assert!(matches!(err, QuernError::ColumnNotFound(_)));
    }

    #[test]
    fn duplicate_unqualified_column_is_ambiguous() {
        let err = analyze("SELECT a FROM t JOIN u ON t.a = u.a").unwrap_err();
        assert!(matches!(err, QuernError::AmbiguousReference(_)));
    }

    #[test]
    fn qualification_disambiguates() {
        let analysis = analyze("SELECT t.a, u.c FROM t JOIN u ON t.a = u.a").unwrap();
        let query = analysis.query();
        assert_eq!(query.joins.len(), 1);
        assert_eq!(query.joins[0].criteria.len(), 1);
        assert_eq!(query.outputs.len(), 2);
    }

    #[test]
    fn unknown_function_is_function_not_found() {
        let err = analyze("SELECT median(a) FROM t").unwrap_err();
        assert!(matches!(err, QuernError::FunctionNotFound(_)));
    }

    #[test]
    fn function_resolution_requires_exact_argument_types() {
        // sum(Utf8) is not registered.
        let err = analyze("SELECT sum(c) FROM u").unwrap_err();
        assert!(matches!(err, QuernError::FunctionNotFound(_)));
    }

    #[test]
    fn ungrouped_column_next_to_aggregate_is_rejected() {
        let err = analyze("SELECT b, sum(a) FROM t").unwrap_err();
        assert!(matches!(err, QuernError::Semantic(_)));
    }

    #[test]
    fn grouped_query_passes_validation() {
        let analysis = analyze("SELECT b, sum(a) FROM t GROUP BY b").unwrap();
        let query = analysis.query();
        assert_eq!(query.group_by.len(), 1);
        assert_eq!(query.aggregates.len(), 1);
        let (agg_symbol, _) = &query.aggregates[0];
        assert_eq!(analysis.types()[agg_symbol], DataType::Int64);
    }

    #[test]
    fn where_must_be_boolean() {
        let err = analyze("SELECT a FROM t WHERE b + 1").unwrap_err();
        assert!(matches!(err, QuernError::Semantic(_)));
    }

    #[test]
    fn comparison_type_mismatch_is_semantic() {
        let err = analyze("SELECT a FROM u WHERE c = 5").unwrap_err();
        assert!(matches!(err, QuernError::Semantic(_)));
    }

    #[test]
    fn output_symbols_are_fresh_and_unique() {
        let analysis = analyze("SELECT a, a FROM t").unwrap();
        let query = analysis.query();
        assert_ne!(query.outputs[0].symbol, query.outputs[1].symbol);
    }
}
