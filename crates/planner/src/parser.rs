//! Boundary to the external SQL parser.
//!
//! The grammar itself is not part of this core; we consume `sqlparser` as a
//! black box producing a statement tree, and surface its failures as syntax
//! errors carrying the parser's position text.

use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use quern_common::{QuernError, Result};

/// Parse SQL text into exactly one statement.
///
/// # Errors
/// `Syntax` when the text does not parse or contains more than one statement.
pub fn parse_statement(sql: &str) -> Result<Statement> {
    let dialect = GenericDialect {};
    let mut statements =
        Parser::parse_sql(&dialect, sql).map_err(|e| QuernError::Syntax(e.to_string()))?;
    if statements.len() != 1 {
        return Err(QuernError::Syntax(format!(
            "expected exactly one statement, got {}",
            statements.len()
        )));
    }
    Ok(statements.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_select_parses() {
        assert!(parse_statement("SELECT a FROM t WHERE b = 5").is_ok());
    }

    #[test]
    fn parse_failure_is_a_syntax_error_with_position() {
        let err = parse_statement("SELEKT a FROM").unwrap_err();
        match err {
            QuernError::Syntax(message) => assert!(!message.is_empty()),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn multiple_statements_are_rejected() {
        assert!(parse_statement("SELECT a FROM t; SELECT b FROM t").is_err());
    }
}
