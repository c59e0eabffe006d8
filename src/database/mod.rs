//! Physical table store abstraction
//!
//! Defines the TableStore trait and its implementations:
//! - MemoryDatabase: in-process store (tests, dry runs)
//! - DuckDbDatabase: embedded DuckDB database (feature `duckdb-backend`)
//!
//! Every method is one structural mutation or lookup and runs as its own
//! statement (or its own transaction when it needs several statements).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::BoundingBox;

pub mod memory;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

pub use memory::{MemoryDatabase, MemoryTable, Operation};

static STATEMENT_TIMEOUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)canceling statement due to statement timeout").unwrap());

/// Whether an error message carries the database's statement timeout signature
pub fn is_statement_timeout_message(message: &str) -> bool {
    STATEMENT_TIMEOUT.is_match(message)
}

/// Errors raised by table store operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Statement failed
    #[error("Database error: {0}")]
    Statement(String),

    /// Relation does not exist
    #[error("Relation \"{schema}\".\"{name}\" does not exist")]
    NotFound { schema: String, name: String },

    /// Relation already exists
    #[error("Relation \"{schema}\".\"{name}\" already exists")]
    AlreadyExists { schema: String, name: String },

    /// Identifier rejected before reaching the database
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl DatabaseError {
    pub fn not_found(schema: &str, name: &str) -> Self {
        DatabaseError::NotFound {
            schema: schema.to_string(),
            name: name.to_string(),
        }
    }

    pub fn already_exists(schema: &str, name: &str) -> Self {
        DatabaseError::AlreadyExists {
            schema: schema.to_string(),
            name: name.to_string(),
        }
    }

    /// Check if the statement was cancelled by the statement timeout
    pub fn is_statement_timeout(&self) -> bool {
        is_statement_timeout_message(&self.to_string())
    }
}

#[cfg(feature = "duckdb-backend")]
impl From<::duckdb::Error> for DatabaseError {
    fn from(err: ::duckdb::Error) -> Self {
        DatabaseError::Statement(err.to_string())
    }
}

/// Quote an identifier for use in SQL
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"schema"."name"`
pub fn qualify(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

/// Name of the overview table for `table` at zoom level `zoom`
pub fn overview_table_name(table: &str, zoom: u8) -> String {
    format!("_vovw_{}_{}", zoom, table)
}

/// Whether `candidate` is an overview table of `table`
pub fn is_overview_of(candidate: &str, table: &str) -> bool {
    candidate
        .strip_prefix("_vovw_")
        .and_then(|rest| rest.split_once('_'))
        .is_some_and(|(zoom, base)| {
            !zoom.is_empty() && zoom.chars().all(|c| c.is_ascii_digit()) && base == table
        })
}

/// Trait for physical table stores
///
/// Implementations must be safe to share between the importer and the
/// builders it drives; one job never issues concurrent calls.
pub trait TableStore: Send + Sync {
    /// Create a schema if it does not exist
    fn create_schema(&self, schema: &str) -> Result<(), DatabaseError>;

    /// Check if a table or view exists
    fn table_exists(&self, schema: &str, name: &str) -> Result<bool, DatabaseError>;

    /// List table and view names in a schema
    fn table_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError>;

    /// Rename a table within its schema
    fn rename_table(&self, schema: &str, from: &str, to: &str) -> Result<(), DatabaseError>;

    /// Rename an index; succeeds without change when the index does not exist
    fn rename_index_if_exists(&self, schema: &str, from: &str, to: &str)
    -> Result<(), DatabaseError>;

    /// Move a table to another schema, keeping its name
    fn set_schema(&self, schema: &str, name: &str, destination: &str) -> Result<(), DatabaseError>;

    /// Recreate the constraints binding a support table to its parent
    fn rebuild_constraints(
        &self,
        schema: &str,
        support_table: &str,
        parent_table: &str,
    ) -> Result<(), DatabaseError>;

    /// Drop a table
    fn drop_table(&self, schema: &str, name: &str) -> Result<(), DatabaseError>;

    /// Drop a view
    fn drop_view(&self, schema: &str, name: &str) -> Result<(), DatabaseError>;

    /// Number of rows in a table
    fn row_count(&self, schema: &str, name: &str) -> Result<u64, DatabaseError>;

    /// Geometry type of the table's geometry column, if it has one
    fn geometry_type(&self, schema: &str, name: &str) -> Result<Option<String>, DatabaseError>;

    /// Extent of the table's geometries
    fn bounds(&self, schema: &str, name: &str) -> Result<Option<BoundingBox>, DatabaseError>;

    /// Build one overview table per zoom level, all or nothing
    fn create_overviews(
        &self,
        schema: &str,
        name: &str,
        zoom_levels: &[u8],
    ) -> Result<Vec<String>, DatabaseError>;

    /// Overview tables built for a table
    fn overview_tables(&self, schema: &str, name: &str) -> Result<Vec<String>, DatabaseError>;

    /// Drop every overview table of a table
    fn drop_overviews(&self, schema: &str, name: &str) -> Result<(), DatabaseError> {
        for overview in self.overview_tables(schema, name)? {
            self.drop_table(schema, &overview)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_timeout_detection() {
        let err = DatabaseError::Statement(
            "PG::QueryCanceled: ERROR:  canceling statement due to statement timeout".to_string(),
        );
        assert!(err.is_statement_timeout());

        let err = DatabaseError::Statement("CANCELING STATEMENT DUE TO STATEMENT TIMEOUT".into());
        assert!(err.is_statement_timeout());

        let err = DatabaseError::not_found("public", "routes");
        assert!(!err.is_statement_timeout());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("routes"), "\"routes\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(qualify("public", "routes"), "\"public\".\"routes\"");
    }

    #[test]
    fn test_overview_table_name() {
        assert_eq!(overview_table_name("routes", 4), "_vovw_4_routes");
        assert!(is_overview_of("_vovw_4_routes", "routes"));
        assert!(is_overview_of("_vovw_12_my_routes", "my_routes"));
        assert!(!is_overview_of("_vovw_4_routes_1", "routes"));
        assert!(!is_overview_of("_vovw_x_routes", "routes"));
    }
}
