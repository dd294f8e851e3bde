//! Aggregate function registry.
//!
//! The registry is an explicit instance constructed once at process start and
//! passed by shared reference to the analyzer and the local execution
//! planner. Resolution matches the function name and parameter-type list
//! exactly; there is no coercion or overload ranking.

use arrow_schema::DataType;
use serde::{Deserialize, Serialize};

use quern_common::{QuernError, Result};

/// Opaque handle identifying a resolved function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionHandle(pub u32);

/// Execution binding for an aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateImpl {
    /// Row count of non-null arguments.
    Count,
    /// Numeric sum.
    Sum,
    /// Minimum by scalar ordering.
    Min,
    /// Maximum by scalar ordering.
    Max,
    /// Arithmetic mean.
    Avg,
}

/// A registered function: name, exact parameter types, return type, and
/// its implementation binding.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    /// Handle for later lookup.
    pub handle: FunctionHandle,
    /// Lowercase function name.
    pub name: String,
    /// Exact parameter types.
    pub arg_types: Vec<DataType>,
    /// Return type.
    pub return_type: DataType,
    /// Execution binding.
    pub implementation: AggregateImpl,
}

/// Registry of aggregate functions, ordered by registration.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: Vec<FunctionInfo>,
}

impl FunctionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in aggregates.
    ///
    /// COUNT accepts every scalar type and returns Int64; SUM preserves its
    /// numeric argument type; MIN/MAX preserve their argument type; AVG
    /// returns Float64 for both numeric argument types.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for dt in [
            DataType::Int64,
            DataType::Float64,
            DataType::Utf8,
            DataType::Boolean,
        ] {
            registry.register("count", vec![dt], DataType::Int64, AggregateImpl::Count);
        }
        registry.register(
            "sum",
            vec![DataType::Int64],
            DataType::Int64,
            AggregateImpl::Sum,
        );
        registry.register(
            "sum",
            vec![DataType::Float64],
            DataType::Float64,
            AggregateImpl::Sum,
        );
        for dt in [DataType::Int64, DataType::Float64, DataType::Utf8] {
            registry.register("min", vec![dt.clone()], dt.clone(), AggregateImpl::Min);
            registry.register("max", vec![dt.clone()], dt, AggregateImpl::Max);
        }
        registry.register(
            "avg",
            vec![DataType::Int64],
            DataType::Float64,
            AggregateImpl::Avg,
        );
        registry.register(
            "avg",
            vec![DataType::Float64],
            DataType::Float64,
            AggregateImpl::Avg,
        );
        registry
    }

    /// Register a function; names are normalized to lowercase.
    pub fn register(
        &mut self,
        name: &str,
        arg_types: Vec<DataType>,
        return_type: DataType,
        implementation: AggregateImpl,
    ) -> FunctionHandle {
        let handle = FunctionHandle(self.functions.len() as u32);
        self.functions.push(FunctionInfo {
            handle,
            name: name.to_ascii_lowercase(),
            arg_types,
            return_type,
            implementation,
        });
        handle
    }

    /// Resolve by name and exact parameter-type list.
    ///
    /// # Errors
    /// `FunctionNotFound` when no registered entry matches exactly.
    pub fn resolve_function(&self, name: &str, arg_types: &[DataType]) -> Result<FunctionHandle> {
        let lowered = name.to_ascii_lowercase();
        self.functions
            .iter()
            .find(|f| f.name == lowered && f.arg_types == arg_types)
            .map(|f| f.handle)
            .ok_or_else(|| {
                QuernError::FunctionNotFound(format!(
                    "{lowered}({})",
                    arg_types
                        .iter()
                        .map(|t| format!("{t}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }

    /// Look up a resolved handle.
    ///
    /// # Errors
    /// `FunctionNotFound` for a handle that was never issued by this registry.
    pub fn get_function(&self, handle: FunctionHandle) -> Result<&FunctionInfo> {
        self.functions
            .get(handle.0 as usize)
            .ok_or_else(|| QuernError::FunctionNotFound(format!("handle {}", handle.0)))
    }

    /// All registered functions in registration order.
    pub fn list_functions(&self) -> &[FunctionInfo] {
        &self.functions
    }
}
