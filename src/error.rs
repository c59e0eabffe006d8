//! Error types for the import pipeline
//!
//! `ImportError` covers failures that abort a job. `RecoverableError` covers
//! best-effort steps: callers receive it as a value, log it and carry on.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::database::{DatabaseError, is_statement_timeout_message};

/// Error code reported when an import would exceed the tenant's table quota
pub const OVER_TABLE_QUOTA_ERROR_CODE: u32 = 8002;

/// Error code reported when a statement was cancelled by the statement timeout
pub const STATEMENT_TIMEOUT_ERROR_CODE: u32 = 6667;

/// Errors that abort an import job
#[derive(Error, Debug)]
pub enum ImportError {
    /// Database statement failed
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Catalog operation failed
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A statement ran past the statement timeout
    #[error("Statement timeout (code {code}): {message}")]
    StatementTimeout { message: String, code: u32 },

    /// Support tables could not be renamed with their parent
    #[error("Unsuccessful support tables renaming for '{table}'")]
    SupportTableRename { table: String },

    /// No free name could be derived
    #[error("No available table name for '{0}'")]
    NameUnavailable(String),

    /// Extraction runner failed
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Visualization assembly failed
    #[error(transparent)]
    Visualization(#[from] crate::visualization::VisualizationError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;

impl ImportError {
    pub fn statement_timeout(message: impl Into<String>) -> Self {
        ImportError::StatementTimeout {
            message: message.into(),
            code: STATEMENT_TIMEOUT_ERROR_CODE,
        }
    }

    /// Check if the underlying statement was cancelled by the statement timeout
    pub fn is_statement_timeout(&self) -> bool {
        match self {
            ImportError::StatementTimeout { .. } => true,
            ImportError::Database(err) => err.is_statement_timeout(),
            other => is_statement_timeout_message(&other.to_string()),
        }
    }

    /// Numeric code surfaced to the tenant, if the error has one
    pub fn error_code(&self) -> Option<u32> {
        match self {
            ImportError::StatementTimeout { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            ImportError::StatementTimeout { .. } => {
                "The import took too long to process.\n\n\
                Hint: Split the dataset into smaller files and import them separately."
                    .to_string()
            }
            ImportError::NameUnavailable(name) => {
                format!(
                    "Could not find a free table name for '{name}'.\n\n\
                    Hint: Rename or delete some existing tables."
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Failures of best-effort steps
///
/// None of these change the outcome of a job.
#[derive(Error, Debug)]
pub enum RecoverableError {
    #[error("Overviews creation failed for '{table}': {message}")]
    Overviews { table: String, message: String },

    #[error("Could not rename geometry index of '{table}': {message}")]
    IndexRename { table: String, message: String },

    #[error("Couldn't drop table {table}: {message}")]
    Drop { table: String, message: String },

    #[error("Skipping remote vis metadata copy: {0}")]
    RemoteCopySkipped(String),

    #[error("Failed to import remote vis metadata - {0}")]
    RemoteCopy(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_timeout_classification() {
        let err = ImportError::from(DatabaseError::Statement(
            "ERROR: canceling statement due to statement timeout".to_string(),
        ));
        assert!(err.is_statement_timeout());
        assert_eq!(err.error_code(), None);

        let mapped = ImportError::statement_timeout(err.to_string());
        assert!(mapped.is_statement_timeout());
        assert_eq!(mapped.error_code(), Some(STATEMENT_TIMEOUT_ERROR_CODE));

        let other = ImportError::from(DatabaseError::not_found("public", "t"));
        assert!(!other.is_statement_timeout());
    }

    #[test]
    fn test_catalog_timeout_detected_by_text() {
        let err = ImportError::from(CatalogError::Backend(
            "canceling statement due to statement timeout".to_string(),
        ));
        assert!(err.is_statement_timeout());
    }

    #[test]
    fn test_user_message() {
        let err = ImportError::statement_timeout("slow");
        assert!(err.user_message().contains("Hint:"));

        let err = ImportError::NameUnavailable("routes".to_string());
        assert!(err.user_message().contains("routes"));
    }
}
