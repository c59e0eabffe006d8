//! Import job and per-table extraction results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::table::Tenant;

/// Where the imported data comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceKind {
    /// Regular user upload landing in the staging schema
    #[default]
    Upload,
    /// Shared dataset from the common-data catalog (foreign table / view)
    CatalogShare,
}

/// Status of an import job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    /// Stopped before registration (over quota)
    Aborted,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Aborted => write!(f, "aborted"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "aborted" => Ok(JobStatus::Aborted),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// One import job, driven end-to-end by the importer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub user: Tenant,
    pub destination_schema: String,
    pub provenance: ProvenanceKind,
    /// Name of the uploaded file, if any
    pub source_file: Option<String>,
    /// Assemble a visualization once tables are registered
    pub create_visualization: bool,
    pub aborted: bool,
    pub status: JobStatus,
    /// Visualization bound to the job after assembly
    pub visualization_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportJob {
    pub fn new(user: Tenant, destination_schema: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user,
            destination_schema: destination_schema.into(),
            provenance: ProvenanceKind::Upload,
            source_file: None,
            create_visualization: false,
            aborted: false,
            status: JobStatus::Pending,
            visualization_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_provenance(mut self, provenance: ProvenanceKind) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_source_file(mut self, file_name: impl Into<String>) -> Self {
        self.source_file = Some(file_name.into());
        self
    }

    pub fn with_create_visualization(mut self, create: bool) -> Self {
        self.create_visualization = create;
        self
    }

    /// Whether the upload is a saved map bundle (`.carto` file)
    pub fn is_map_bundle_upload(&self) -> bool {
        self.source_file
            .as_deref()
            .and_then(|f| std::path::Path::new(f).extension())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("carto"))
    }

    pub(crate) fn set_status(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// One physical table produced by extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableResult {
    /// Schema the table was extracted into
    pub origin_schema: String,
    /// Name the table was extracted with
    pub table_name: String,
    /// Name proposed by extraction, before sanitation and collision handling
    #[serde(default)]
    pub original_name: String,
    /// Proposed and, once registered, final name
    pub name: String,
    /// Schema the table currently lives in
    pub schema: String,
    /// Physical name the table currently has in `schema`
    pub current_name: String,
    pub success: bool,
    pub error_code: Option<u32>,
    /// Names of auxiliary tables bound to this table
    pub support_tables: Vec<String>,
    #[serde(default)]
    pub registered: bool,
    #[serde(default)]
    pub dropped: bool,
}

impl TableResult {
    pub fn new(
        origin_schema: impl Into<String>,
        table_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let origin_schema = origin_schema.into();
        let table_name = table_name.into();
        let name = name.into();
        Self {
            schema: origin_schema.clone(),
            current_name: table_name.clone(),
            origin_schema,
            table_name,
            original_name: name.clone(),
            name,
            success: true,
            error_code: None,
            support_tables: Vec::new(),
            registered: false,
            dropped: false,
        }
    }

    /// A result whose extraction failed
    pub fn failed(
        origin_schema: impl Into<String>,
        table_name: impl Into<String>,
        error_code: u32,
    ) -> Self {
        let table_name = table_name.into();
        let mut result = Self::new(origin_schema, table_name.clone(), table_name);
        result.success = false;
        result.error_code = Some(error_code);
        result
    }

    pub fn with_support_tables(mut self, tables: Vec<String>) -> Self {
        self.support_tables = tables;
        self
    }

    /// `schema.name` of the table's current location
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.current_name)
    }

    /// Staged table name qualified with its origin schema
    pub fn qualified_table_name(&self) -> String {
        format!("{}.{}", self.origin_schema, self.table_name)
    }

    /// Apply a support table rename mapping (old name -> new name)
    pub fn update_support_tables(&mut self, names: &HashMap<String, String>) {
        for table in self.support_tables.iter_mut() {
            if let Some(renamed) = names.get(table) {
                *table = renamed.clone();
            }
        }
    }

    pub(crate) fn mark_renamed(&mut self, new_name: &str) {
        self.name = new_name.to_string();
        self.current_name = new_name.to_string();
    }

    pub(crate) fn mark_moved(&mut self, schema: &str) {
        self.schema = schema.to_string();
    }
}
