//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use geo_import::importer::RemoteError;
use geo_import::{
    BoundingBox, ExportDocument, ImportError, ImportLog, ImportResult, MemoryTable,
    MetadataClient, Runner, TableResult,
};
use serde_json::Value;

pub const ORIGIN: &str = "cdb_importer";
pub const COMMON_DATA_URL: &str = "https://common-data.example.com";

/// Runner replaying a fixed extraction outcome
pub struct ScriptedRunner {
    results: Vec<TableResult>,
    log: ImportLog,
    visualizations: Vec<ExportDocument>,
    foreign_table_name: Option<String>,
    failure: Option<String>,
}

impl ScriptedRunner {
    pub fn new(results: Vec<TableResult>) -> Self {
        Self {
            results,
            log: ImportLog::new(),
            visualizations: Vec::new(),
            foreign_table_name: None,
            failure: None,
        }
    }

    pub fn with_visualizations(mut self, documents: Vec<ExportDocument>) -> Self {
        self.visualizations = documents;
        self
    }

    pub fn with_foreign_table(mut self, name: &str) -> Self {
        self.foreign_table_name = Some(name.to_string());
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn boxed(self) -> Box<dyn Runner> {
        Box::new(self)
    }
}

impl Runner for ScriptedRunner {
    fn run(&mut self, progress: &mut dyn FnMut(&str)) -> ImportResult<()> {
        if let Some(message) = &self.failure {
            return Err(ImportError::Extraction(message.clone()));
        }
        for result in &self.results {
            progress(&result.table_name);
        }
        Ok(())
    }

    fn results(&self) -> &[TableResult] {
        &self.results
    }

    fn results_mut(&mut self) -> &mut Vec<TableResult> {
        &mut self.results
    }

    fn log(&self) -> &ImportLog {
        &self.log
    }

    fn log_mut(&mut self) -> &mut ImportLog {
        &mut self.log
    }

    fn visualizations(&self) -> &[ExportDocument] {
        &self.visualizations
    }

    fn foreign_table_name(&self) -> Option<&str> {
        self.foreign_table_name.as_deref()
    }
}

/// Metadata client answering from canned responses
#[derive(Default)]
pub struct StaticMetadataClient {
    responses: HashMap<String, Value>,
    pub requests: Mutex<Vec<String>>,
}

impl StaticMetadataClient {
    pub fn with(mut self, path: &str, body: Value) -> Self {
        self.responses
            .insert(format!("{}{}", COMMON_DATA_URL, path), body);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl MetadataClient for StaticMetadataClient {
    fn get_json(&self, url: &str, _api_key: &str) -> Result<Value, RemoteError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::Status {
                url: url.to_string(),
                status: 404,
                body: "not found".to_string(),
            })
    }
}

pub fn point_table(rows: u64) -> MemoryTable {
    MemoryTable::new()
        .with_rows(rows)
        .with_geometry("Point", BoundingBox::new(-10.0, 35.0, 5.0, 44.0))
}

pub fn line_table(rows: u64) -> MemoryTable {
    MemoryTable::new()
        .with_rows(rows)
        .with_geometry("MultiLineString", BoundingBox::new(0.0, 40.0, 20.0, 50.0))
}

pub fn staged_result(table_name: &str, name: &str) -> TableResult {
    TableResult::new(ORIGIN, table_name, name)
}
