//! Extraction runner interface and the user-facing import log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ImportResult;
use crate::models::TableResult;
use crate::visualization::ExportDocument;

/// One timestamped line of the import log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Progress log shown to the tenant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportLog {
    entries: Vec<LogEntry>,
}

impl ImportLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: impl Into<String>) {
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }
}

impl std::fmt::Display for ImportLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{} {}", entry.timestamp.to_rfc3339(), entry.message)?;
        }
        Ok(())
    }
}

/// Trait for extraction runners
///
/// A runner stages every dataset of an upload as tables in the origin schema
/// and reports one `TableResult` per table.
pub trait Runner: Send {
    /// Extract the upload, reporting progress lines through `progress`
    fn run(&mut self, progress: &mut dyn FnMut(&str)) -> ImportResult<()>;

    fn results(&self) -> &[TableResult];

    fn results_mut(&mut self) -> &mut Vec<TableResult>;

    /// Whether extraction produced at least one usable table
    fn success(&self) -> bool {
        self.results().iter().any(|r| r.success)
    }

    fn log(&self) -> &ImportLog;

    fn log_mut(&mut self) -> &mut ImportLog;

    /// Map bundles found in the upload
    fn visualizations(&self) -> &[ExportDocument] {
        &[]
    }

    /// Name of the shared table for catalog-share imports
    fn foreign_table_name(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_append() {
        let mut log = ImportLog::new();
        assert!(log.is_empty());
        log.append("Proceeding to register");
        log.append(String::from("Table 'routes' registered"));
        assert_eq!(log.entries().len(), 2);
        assert!(log.contains("routes"));
        assert!(log.to_string().lines().nth(1).unwrap().ends_with("registered"));
    }
}
