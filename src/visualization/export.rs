//! Visualization export to backups and restore from backups or map bundles
//!
//! The export document is a self-contained JSON description of a
//! visualization: its layers (typed the way renderers name them), overlays
//! and map settings. Restoring rebuilds the map from the document and
//! recomputes bounds from the tables the data layers point at.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::{VisualizationError, default_labels_layer, table_bounds, union_bounds};
use crate::catalog::{Catalog, VisualizationBackup};
use crate::database::TableStore;
use crate::models::visualization::{BASE_LAYER_KINDS, CARTO_LAYER_KIND, DATA_LAYER_KINDS};
use crate::models::{Layer, Overlay, Privacy, Visualization, VisualizationType};

/// Version of the export document format
pub const SERVICE_VERSION: u32 = 1;

/// Exported layer type of `carto` layers
const CARTO_LAYER_TYPE: &str = "CartoDB";

/// Owner of an exported visualization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportOwner {
    pub id: Uuid,
    pub username: String,
}

/// One exported layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedLayer {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(default)]
    pub options: JsonMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infowindow: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<Value>,
    #[serde(default)]
    pub order: u32,
}

impl ExportedLayer {
    fn from_layer(layer: &Layer) -> Self {
        Self {
            id: layer.id,
            layer_type: layer_type_from_kind(&layer.kind),
            options: layer.options.clone(),
            infowindow: layer.infowindow.clone(),
            tooltip: layer.tooltip.clone(),
            order: layer.order,
        }
    }

    /// Layer kind this exported layer restores to
    pub fn kind(&self) -> String {
        layer_kind_from_type(&self.layer_type)
    }

    pub fn is_base_layer(&self) -> bool {
        BASE_LAYER_KINDS.contains(&self.kind().as_str())
    }

    pub fn is_data_layer(&self) -> bool {
        DATA_LAYER_KINDS.contains(&self.kind().as_str())
    }

    /// Fresh layer carrying this layer's settings
    fn to_layer(&self) -> Layer {
        Layer {
            id: Uuid::new_v4(),
            kind: self.kind(),
            options: self.options.clone(),
            infowindow: self.infowindow.clone(),
            tooltip: self.tooltip.clone(),
            order: self.order,
        }
    }
}

/// Exported overlay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedOverlay {
    #[serde(rename = "type")]
    pub overlay_type: String,
    #[serde(default)]
    pub options: JsonMap<String, Value>,
    #[serde(default)]
    pub order: u32,
}

/// Export document of a visualization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportDocument {
    pub version: u32,
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub privacy: Privacy,
    pub owner: ExportOwner,
    pub layers: Vec<ExportedLayer>,
    #[serde(default)]
    pub overlays: Vec<ExportedOverlay>,
    /// `[[south, west], [north, east]]`
    #[serde(default)]
    pub bounds: Option<[[f64; 2]; 2]>,
    pub center: [f64; 2],
    pub zoom: u8,
    #[serde(default)]
    pub scrollwheel: bool,
    #[serde(default = "default_legends")]
    pub legends: bool,
    pub updated_at: DateTime<Utc>,
}

fn default_legends() -> bool {
    true
}

impl ExportDocument {
    pub fn from_json(json: &str) -> Result<Self, VisualizationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, VisualizationError> {
        Ok(serde_json::to_string(self)?)
    }

    fn base_layers(&self) -> impl Iterator<Item = &ExportedLayer> {
        self.layers.iter().filter(|l| l.is_base_layer())
    }
}

/// Where and for whom a document is restored
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Id of the restored visualization; a new one when None
    pub id: Option<Uuid>,
    /// Owner of the restored visualization; the document's owner when None
    pub owner_id: Option<Uuid>,
    /// Owner name written into data layers; kept as exported when None
    pub owner_name: Option<String>,
    /// Table renames applied to data layer `table_name` options (old -> new)
    pub renamed_tables: HashMap<String, String>,
}

/// `CartoDB` maps to `carto`; anything else is lowercased
pub fn layer_kind_from_type(layer_type: &str) -> String {
    if layer_type == CARTO_LAYER_TYPE {
        CARTO_LAYER_KIND.to_string()
    } else {
        layer_type.to_lowercase()
    }
}

/// Inverse of [`layer_kind_from_type`] for exporting
pub fn layer_type_from_kind(kind: &str) -> String {
    if kind == CARTO_LAYER_KIND {
        CARTO_LAYER_TYPE.to_string()
    } else {
        kind.to_string()
    }
}

/// Exports visualizations to backups and restores them
pub struct VisualizationExportService {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn TableStore>,
}

impl VisualizationExportService {
    pub fn new(catalog: Arc<dyn Catalog>, store: Arc<dyn TableStore>) -> Self {
        Self { catalog, store }
    }

    /// Build the export document of a visualization
    pub fn export_document(&self, visualization_id: Uuid) -> Result<ExportDocument, VisualizationError> {
        let visualization = self
            .catalog
            .find_visualization(visualization_id)?
            .ok_or(VisualizationError::NotFound(visualization_id))?;
        let owner = self
            .catalog
            .find_user(visualization.user_id)?
            .ok_or(VisualizationError::OwnerNotFound(visualization.user_id))?;

        let map = &visualization.map;
        Ok(ExportDocument {
            version: SERVICE_VERSION,
            id: visualization.id,
            title: visualization.name.clone(),
            description: visualization.description.clone(),
            privacy: visualization.privacy,
            owner: ExportOwner {
                id: owner.id,
                username: owner.username,
            },
            layers: map.layers.iter().map(ExportedLayer::from_layer).collect(),
            overlays: visualization
                .overlays
                .iter()
                .map(|o| ExportedOverlay {
                    overlay_type: o.overlay_type.clone(),
                    options: o.options.clone(),
                    order: o.order,
                })
                .collect(),
            bounds: map
                .bounding_box
                .map(|b| [b.south_west(), b.north_east()]),
            center: map.center,
            zoom: map.zoom,
            scrollwheel: map.scrollwheel,
            legends: map.legends,
            updated_at: visualization.updated_at,
        })
    }

    /// Export a visualization to a backup keyed by owner and id
    pub fn export(&self, visualization_id: Uuid) -> Result<VisualizationBackup, VisualizationError> {
        let document = self.export_document(visualization_id)?;
        let backup = VisualizationBackup::new(
            document.owner.username.clone(),
            visualization_id,
            document.to_json()?,
        );
        self.catalog.save_backup(&backup)?;
        info!(visualization_id = %visualization_id, "Exported visualization");
        Ok(backup)
    }

    /// Restore a deleted visualization from its backup, then remove the backup
    pub fn import(&self, visualization_id: Uuid) -> Result<Visualization, VisualizationError> {
        if self.catalog.find_visualization(visualization_id)?.is_some() {
            return Err(VisualizationError::AlreadyExists(visualization_id));
        }
        let backup = self
            .catalog
            .find_backup(visualization_id)?
            .ok_or(VisualizationError::BackupNotFound(visualization_id))?;
        let document = ExportDocument::from_json(&backup.export_document)?;

        let owner = self
            .catalog
            .find_user(document.owner.id)?
            .ok_or(VisualizationError::OwnerNotFound(document.owner.id))?;

        let visualization = self.restore(
            &document,
            &RestoreOptions {
                id: Some(document.id),
                owner_id: Some(owner.id),
                ..RestoreOptions::default()
            },
        )?;

        if !self.catalog.delete_backup(visualization_id)? {
            warn!(visualization_id = %visualization_id, "Backup vanished before removal");
        }
        info!(visualization_id = %visualization_id, "Restored visualization from backup");
        Ok(visualization)
    }

    /// Rebuild and save a visualization from an export document
    pub fn restore(
        &self,
        document: &ExportDocument,
        options: &RestoreOptions,
    ) -> Result<Visualization, VisualizationError> {
        if document.version > SERVICE_VERSION {
            return Err(VisualizationError::InvalidDocument(format!(
                "unsupported version {}",
                document.version
            )));
        }
        let exported_base = document.base_layers().next().ok_or_else(|| {
            VisualizationError::InvalidDocument("document has no base layer".to_string())
        })?;

        let owner_id = options.owner_id.unwrap_or(document.owner.id);
        let mut visualization = Visualization::new(
            document.title.clone(),
            VisualizationType::Derived,
            owner_id,
        )
        .with_id(options.id.unwrap_or_else(Uuid::new_v4))
        .with_privacy(Privacy::Link)
        .with_description(document.description.clone());

        let base = exported_base.to_layer();
        let labels = if base.supports_labels_layer() {
            let base_layers: Vec<&ExportedLayer> = document.base_layers().collect();
            match base_layers.as_slice() {
                [_] => default_labels_layer(&base),
                [.., last] => Some(last.to_layer()),
                [] => None,
            }
        } else {
            None
        };
        visualization.map.add_layer(base);

        let mut tables = Vec::new();
        for exported in document.layers.iter().filter(|l| l.is_data_layer()) {
            let mut layer = exported.to_layer();
            if let Some(Value::String(table_name)) = layer.options.get("table_name").cloned() {
                let table_name = options
                    .renamed_tables
                    .get(&table_name)
                    .cloned()
                    .unwrap_or(table_name);
                layer
                    .options
                    .insert("table_name".to_string(), Value::String(table_name.clone()));
                tables.push(table_name);
            }
            if let Some(owner_name) = &options.owner_name {
                if layer.options.contains_key("user_name") {
                    layer
                        .options
                        .insert("user_name".to_string(), Value::String(owner_name.clone()));
                }
            }
            visualization.map.add_layer(layer);
        }

        if let Some(labels) = labels {
            visualization.map.add_layer(labels);
        }

        visualization.map.scrollwheel = document.scrollwheel;
        visualization.map.legends = document.legends;
        let mut extents = Vec::new();
        for table in &tables {
            if let Some(bounds) =
                table_bounds(self.catalog.as_ref(), self.store.as_ref(), owner_id, table)?
            {
                extents.push(bounds);
            }
        }
        visualization.map.fit_bounds(union_bounds(extents));

        let visualization_id = visualization.id;
        visualization.overlays = document
            .overlays
            .iter()
            .map(|exported| {
                let mut overlay =
                    Overlay::new(visualization_id, exported.overlay_type.clone(), exported.order);
                overlay.options = exported.options.clone();
                overlay
            })
            .collect();

        self.catalog.save_visualization(&visualization)?;
        Ok(visualization)
    }
}
