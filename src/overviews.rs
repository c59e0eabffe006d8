//! Overview tables for large datasets
//!
//! Overviews are reduced copies of a table, one per zoom level, named
//! `_vovw_<zoom>_<table>`. They are built in a single store call, so either
//! every level exists afterwards or none does.

use std::sync::Arc;

use tracing::debug;

use crate::config::OverviewConfig;
use crate::database::{DatabaseError, TableStore};

/// Trait for overview builders
pub trait OverviewBuilder: Send + Sync {
    /// Whether the table needs overviews
    fn should_create_overviews(&self, schema: &str, table: &str) -> Result<bool, DatabaseError>;

    /// Build the overviews, returning the created table names
    fn create_overviews(&self, schema: &str, table: &str) -> Result<Vec<String>, DatabaseError>;
}

/// Builds overviews for tables with geometries and enough rows
pub struct DatasetOverviews {
    store: Arc<dyn TableStore>,
    config: OverviewConfig,
}

impl DatasetOverviews {
    pub fn new(store: Arc<dyn TableStore>, config: OverviewConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &OverviewConfig {
        &self.config
    }
}

impl OverviewBuilder for DatasetOverviews {
    fn should_create_overviews(&self, schema: &str, table: &str) -> Result<bool, DatabaseError> {
        if !self.config.enabled || self.config.zoom_levels.is_empty() {
            return Ok(false);
        }
        if self.store.geometry_type(schema, table)?.is_none() {
            debug!(schema, table, "No geometry column, skipping overviews");
            return Ok(false);
        }
        let rows = self.store.row_count(schema, table)?;
        Ok(rows >= self.config.min_rows)
    }

    fn create_overviews(&self, schema: &str, table: &str) -> Result<Vec<String>, DatabaseError> {
        let mut zoom_levels = self.config.zoom_levels.clone();
        zoom_levels.sort_unstable();
        zoom_levels.dedup();
        let created = self.store.create_overviews(schema, table, &zoom_levels)?;
        debug!(schema, table, count = created.len(), "Created overviews");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryDatabase, MemoryTable, Operation};
    use crate::models::BoundingBox;

    fn store() -> Arc<MemoryDatabase> {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        Arc::new(
            MemoryDatabase::new()
                .with_table(
                    "public",
                    "big",
                    MemoryTable::new().with_rows(5_000).with_geometry("Point", bbox),
                )
                .with_table(
                    "public",
                    "small",
                    MemoryTable::new().with_rows(10).with_geometry("Point", bbox),
                )
                .with_table("public", "plain", MemoryTable::new().with_rows(5_000)),
        )
    }

    #[test]
    fn test_should_create_overviews() {
        let config = OverviewConfig::default().with_min_rows(1_000);
        let overviews = DatasetOverviews::new(store(), config);
        assert!(overviews.should_create_overviews("public", "big").unwrap());
        assert!(!overviews.should_create_overviews("public", "small").unwrap());
        assert!(!overviews.should_create_overviews("public", "plain").unwrap());
    }

    #[test]
    fn test_disabled_config() {
        let overviews = DatasetOverviews::new(store(), OverviewConfig::disabled().with_min_rows(0));
        assert!(!overviews.should_create_overviews("public", "big").unwrap());
    }

    #[test]
    fn test_create_overviews_sorted_levels() {
        let db = store();
        let config = OverviewConfig::default().with_zoom_levels(vec![2, 0, 2, 1]);
        let overviews = DatasetOverviews::new(db.clone(), config);
        let created = overviews.create_overviews("public", "big").unwrap();
        assert_eq!(created, vec!["_vovw_0_big", "_vovw_1_big", "_vovw_2_big"]);
        assert!(db.contains("public", "_vovw_1_big"));
    }

    #[test]
    fn test_create_overviews_failure_leaves_nothing() {
        let db = store();
        db.fail_on(Operation::CreateOverviews, "big", "out of disk");
        let overviews = DatasetOverviews::new(db.clone(), OverviewConfig::default());
        assert!(overviews.create_overviews("public", "big").is_err());
        assert!(db.overview_tables("public", "big").unwrap().is_empty());
    }
}
