//! Per-query session.

use serde::{Deserialize, Serialize};

use quern_common::{QuernError, Result};

use crate::schema::QualifiedTableName;

/// Identity and name-resolution defaults for one query.
///
/// Immutable for the query's lifetime and read-only for every downstream
/// component. The recognized options are exactly the default catalog and the
/// default schema, used to complete partially qualified table names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    user: String,
    catalog: String,
    schema: String,
}

impl Session {
    /// Create a session for `user` with default catalog and schema.
    pub fn new(
        user: impl Into<String>,
        catalog: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            catalog: catalog.into(),
            schema: schema.into(),
        }
    }

    /// Connecting user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Default catalog for unqualified references.
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    /// Default schema for unqualified references.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Complete a 1-, 2-, or 3-part table reference with session defaults.
    ///
    /// # Errors
    /// `InvalidArgument` for empty or over-long name paths.
    pub fn resolve_table_name(&self, parts: &[&str]) -> Result<QualifiedTableName> {
        match parts {
            [table] => Ok(QualifiedTableName::new(&self.catalog, &self.schema, *table)),
            [schema, table] => Ok(QualifiedTableName::new(&self.catalog, *schema, *table)),
            [catalog, schema, table] => Ok(QualifiedTableName::new(*catalog, *schema, *table)),
            _ => Err(QuernError::InvalidArgument(format!(
                "table reference must have 1 to 3 parts, got {}",
                parts.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_names_are_completed_with_session_defaults() {
        let session = Session::new("alice", "cat", "sch");
        assert_eq!(
            session.resolve_table_name(&["t"]).unwrap(),
            QualifiedTableName::new("cat", "sch", "t")
        );
        assert_eq!(
            session.resolve_table_name(&["other", "t"]).unwrap(),
            QualifiedTableName::new("cat", "other", "t")
        );
        assert_eq!(
            session.resolve_table_name(&["c2", "s2", "t"]).unwrap(),
            QualifiedTableName::new("c2", "s2", "t")
        );
    }

    #[test]
    fn empty_and_overlong_paths_are_rejected() {
        let session = Session::new("alice", "cat", "sch");
        assert!(session.resolve_table_name(&[]).is_err());
        assert!(session.resolve_table_name(&["a", "b", "c", "d"]).is_err());
    }
}
