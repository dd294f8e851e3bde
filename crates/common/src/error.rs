use thiserror::Error;

/// Canonical quern error taxonomy used across crates.
///
/// Classification guidance:
/// - [`QuernError::InvalidArgument`]: caller bug on a public operation, surfaced
///   immediately, never recovered
/// - [`QuernError::TableAlreadyExists`]: duplicate catalog registration; a declined
///   operation, not fatal
/// - [`QuernError::TableNotFound`] / [`QuernError::ColumnNotFound`] /
///   [`QuernError::FunctionNotFound`] / [`QuernError::AmbiguousReference`] /
///   [`QuernError::Semantic`]: compile-time query errors raised during analysis;
///   abort planning before any execution starts
/// - [`QuernError::Syntax`]: parser boundary failure, carries the parser's
///   position text
/// - [`QuernError::PlanCompilation`]: internal planning invariant violation
///   (missing split mapping, node variant with no physical implementation)
/// - [`QuernError::ResourceExhausted`]: memory budget exceeded during hash build
///   or aggregation buffering; aborts the fragment rather than truncating results
/// - [`QuernError::Execution`]: runtime operator failure after planning succeeded
/// - [`QuernError::Unsupported`]: syntactically valid SQL outside the supported
///   subset
#[derive(Debug, Clone, Error)]
pub enum QuernError {
    /// Invalid or null argument to a public operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Duplicate table registration.
    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    /// Qualified table name did not resolve against the catalog.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Column reference did not resolve against any in-scope relation.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// No function registered under the given name and parameter types.
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// Unqualified reference matched more than one in-scope relation.
    #[error("ambiguous reference: {0}")]
    AmbiguousReference(String),

    /// Statement-level semantic violation (type mismatch, grouping rules).
    #[error("semantic error: {0}")]
    Semantic(String),

    /// Parse failure from the SQL parser, with position information.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Fragment could not be compiled to physical operators.
    #[error("plan compilation error: {0}")]
    PlanCompilation(String),

    /// A memory budget was exceeded during execution.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Runtime execution failure after planning succeeded.
    #[error("execution error: {0}")]
    Execution(String),

    /// Valid request for a feature outside the supported subset.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Standard quern result alias.
pub type Result<T> = std::result::Result<T, QuernError>;
