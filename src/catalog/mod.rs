//! Metadata catalog
//!
//! Holds tenants, registered tables, visualizations and visualization backups.
//! Implementations:
//! - MemoryCatalog: in-process catalog
//! - DuckDbCatalog: DuckDB-backed catalog (feature `duckdb-backend`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{RegisteredTable, Tenant, Visualization, VisualizationType};

pub mod memory;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

pub use memory::{CatalogOperation, MemoryCatalog};

/// Errors raised by catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog error: {0}")]
    Backend(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn not_found(entity: &'static str, key: impl std::fmt::Display) -> Self {
        CatalogError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn already_exists(entity: &'static str, key: impl std::fmt::Display) -> Self {
        CatalogError::AlreadyExists {
            entity,
            key: key.to_string(),
        }
    }
}

#[cfg(feature = "duckdb-backend")]
impl From<::duckdb::Error> for CatalogError {
    fn from(err: ::duckdb::Error) -> Self {
        CatalogError::Backend(err.to_string())
    }
}

/// Exported visualization document kept for later restore
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisualizationBackup {
    pub username: String,
    pub visualization_id: Uuid,
    /// Serialized export document (JSON)
    pub export_document: String,
    pub created_at: DateTime<Utc>,
}

impl VisualizationBackup {
    pub fn new(
        username: impl Into<String>,
        visualization_id: Uuid,
        export_document: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            visualization_id,
            export_document: export_document.into(),
            created_at: Utc::now(),
        }
    }
}

/// Trait for metadata catalogs
pub trait Catalog: Send + Sync {
    fn insert_user(&self, user: &Tenant) -> Result<(), CatalogError>;

    fn find_user(&self, id: Uuid) -> Result<Option<Tenant>, CatalogError>;

    fn find_user_by_username(&self, username: &str) -> Result<Option<Tenant>, CatalogError>;

    /// Register a table; fails if the owner already has a table with that name
    fn insert_table(&self, table: &RegisteredTable) -> Result<(), CatalogError>;

    fn update_table(&self, table: &RegisteredTable) -> Result<(), CatalogError>;

    fn find_table(&self, user_id: Uuid, name: &str) -> Result<Option<RegisteredTable>, CatalogError>;

    /// Table whose canonical visualization is `visualization_id`
    fn table_by_visualization(
        &self,
        visualization_id: Uuid,
    ) -> Result<Option<RegisteredTable>, CatalogError>;

    fn list_tables(&self, user_id: Uuid) -> Result<Vec<RegisteredTable>, CatalogError>;

    fn count_tables(&self, user_id: Uuid) -> Result<u64, CatalogError> {
        Ok(self.list_tables(user_id)?.len() as u64)
    }

    /// Insert or replace a visualization
    fn save_visualization(&self, visualization: &Visualization) -> Result<(), CatalogError>;

    fn find_visualization(&self, id: Uuid) -> Result<Option<Visualization>, CatalogError>;

    /// Returns true if the visualization existed
    fn delete_visualization(&self, id: Uuid) -> Result<bool, CatalogError>;

    fn list_visualizations(
        &self,
        user_id: Uuid,
        vis_type: Option<VisualizationType>,
    ) -> Result<Vec<Visualization>, CatalogError>;

    /// Insert or replace the backup for `(username, visualization_id)`
    fn save_backup(&self, backup: &VisualizationBackup) -> Result<(), CatalogError>;

    fn find_backup(&self, visualization_id: Uuid)
    -> Result<Option<VisualizationBackup>, CatalogError>;

    /// Returns true if a backup existed
    fn delete_backup(&self, visualization_id: Uuid) -> Result<bool, CatalogError>;
}
