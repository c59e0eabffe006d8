//! Visualization assembly
//!
//! - DerivedCreator: builds a derived map from freshly registered tables
//! - VisualizationExportService: exports visualizations to backups and restores them

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::{Catalog, CatalogError};
use crate::config::BasemapConfig;
use crate::database::{DatabaseError, TableStore};
use crate::models::visualization::CARTO_LAYER_KIND;
use crate::models::{BoundingBox, Layer};

pub mod derived;
pub mod export;

pub use derived::DerivedCreator;
pub use export::{
    ExportDocument, ExportOwner, ExportedLayer, RestoreOptions, SERVICE_VERSION,
    VisualizationExportService,
};

/// Errors raised while assembling, exporting or restoring visualizations
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Visualization with id {0} not found")]
    NotFound(Uuid),

    #[error("Visualization with id {0} already exists!")]
    AlreadyExists(Uuid),

    #[error("Restore data not found for visualization id {0}")]
    BackupNotFound(Uuid),

    #[error("Owner {0} of the visualization not found")]
    OwnerNotFound(Uuid),

    #[error("Invalid export document: {0}")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VisualizationError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            VisualizationError::AlreadyExists(id) => format!(
                "Visualization {} already exists.\n\n\
                Hint: Delete it before restoring its backup.",
                id
            ),
            VisualizationError::BackupNotFound(id) => format!(
                "No backup found for visualization {}.\n\n\
                Hint: Export the visualization before deleting it.",
                id
            ),
            _ => self.to_string(),
        }
    }
}

/// A table that could not be added to a derived visualization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedLayer {
    pub table_name: String,
    pub reason: String,
}

/// Base layer built from the configured basemap
pub fn basemap_layer(basemap: &BasemapConfig) -> Layer {
    let mut layer = Layer::new("tiled")
        .with_option("name", basemap.name.as_str())
        .with_option("urlTemplate", basemap.url_template.as_str())
        .with_option("attribution", basemap.attribution.as_str())
        .with_option("type", "Tiled");
    if let Some(labels) = &basemap.labels_url_template {
        layer = layer.with_option("labels", json!({ "urlTemplate": labels }));
    }
    layer
}

/// Labels layer drawn above the data layers of `base`
///
/// Returns None when the base layer has no labels tiles.
pub fn default_labels_layer(base: &Layer) -> Option<Layer> {
    let url_template = base.labels_url_template()?;
    let name = base
        .options
        .get("name")
        .and_then(|n| n.as_str())
        .map(|n| format!("{} Labels", n))
        .unwrap_or_else(|| "Labels".to_string());
    let mut layer = Layer::new("tiled")
        .with_option("name", name)
        .with_option("urlTemplate", url_template)
        .with_option("type", "Tiled");
    if let Some(attribution) = base.options.get("attribution") {
        layer = layer.with_option("attribution", attribution.clone());
    }
    Some(layer)
}

/// Data layer rendering `table_name` of `user_name`
pub fn table_layer(table_name: &str, user_name: &str) -> Layer {
    Layer::new(CARTO_LAYER_KIND)
        .with_option("table_name", table_name)
        .with_option("user_name", user_name)
        .with_option("visible", true)
}

/// Current extent of a registered table
///
/// Asks the store first and falls back to the extent recorded at registration.
pub fn table_bounds(
    catalog: &dyn Catalog,
    store: &dyn TableStore,
    user_id: Uuid,
    table_name: &str,
) -> Result<Option<BoundingBox>, VisualizationError> {
    let Some(table) = catalog.find_table(user_id, table_name)? else {
        return Ok(None);
    };
    match store.bounds(&table.schema, &table.name) {
        Ok(bounds) => Ok(bounds.or(table.bounds)),
        Err(DatabaseError::NotFound { .. }) => Ok(table.bounds),
        Err(e) => Err(e.into()),
    }
}

/// Union of every known extent
pub fn union_bounds(bounds: impl IntoIterator<Item = BoundingBox>) -> Option<BoundingBox> {
    bounds.into_iter().reduce(|acc, b| acc.union(&b))
}
