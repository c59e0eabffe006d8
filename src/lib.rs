//! Geo Import - registration pipeline for staged geospatial datasets
//!
//! Provides:
//! - Import orchestration (rename, schema move, catalog registration)
//! - Support table tracking
//! - Table quota checks
//! - Overview generation
//! - Visualization assembly, export and restore
//! - Table store and catalog backends (memory, DuckDB)

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod importer;
pub mod models;
pub mod naming;
pub mod overviews;
pub mod quota;
pub mod registrar;
pub mod support_tables;
pub mod visualization;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogError, MemoryCatalog, VisualizationBackup};
#[cfg(feature = "duckdb-backend")]
pub use catalog::duckdb::DuckDbCatalog;
pub use config::{BasemapConfig, CommonDataConfig, ConfigError, ImporterConfig, OverviewConfig};
pub use database::{DatabaseError, MemoryDatabase, MemoryTable, TableStore};
#[cfg(feature = "duckdb-backend")]
pub use database::duckdb::DuckDbDatabase;
pub use error::{
    ImportError, ImportResult, OVER_TABLE_QUOTA_ERROR_CODE, RecoverableError,
    STATEMENT_TIMEOUT_ERROR_CODE,
};
pub use importer::{ImportLog, Importer, MetadataClient, RemoteMetadataCopier, Runner};
#[cfg(feature = "api-backend")]
pub use importer::HttpMetadataClient;
pub use models::{
    BoundingBox, ImportJob, JobStatus, Layer, Overlay, Privacy, ProvenanceKind, RegisteredTable,
    TableResult, Tenant, Visualization, VisualizationType,
};
pub use overviews::{DatasetOverviews, OverviewBuilder};
pub use quota::{QuotaChecker, TableQuota};
pub use registrar::{CatalogRegistrar, TableRegistrar};
pub use support_tables::{SupportTable, SupportTables};
pub use visualization::{
    DerivedCreator, ExportDocument, RejectedLayer, RestoreOptions, VisualizationError,
    VisualizationExportService,
};
