//! Derived visualization built from newly imported tables

use std::sync::Arc;

use tracing::{debug, info};

use super::{
    RejectedLayer, VisualizationError, basemap_layer, default_labels_layer, table_bounds,
    table_layer, union_bounds,
};
use crate::catalog::Catalog;
use crate::config::BasemapConfig;
use crate::database::TableStore;
use crate::models::{RegisteredTable, Tenant, Visualization, VisualizationType};

/// Geometry types a data layer can render
pub const SUPPORTED_GEOMETRY_TYPES: &[&str] = &[
    "point",
    "multipoint",
    "linestring",
    "multilinestring",
    "polygon",
    "multipolygon",
    "geometry",
];

/// Name given to derived maps built from several tables
pub const UNTITLED_MAP_NAME: &str = "Untitled Map";

/// Whether a data layer can render `geometry_type`
pub fn is_supported_geometry(geometry_type: Option<&str>) -> bool {
    geometry_type.is_some_and(|g| {
        let g = g.trim().to_lowercase();
        let g = g.strip_prefix("st_").unwrap_or(&g);
        SUPPORTED_GEOMETRY_TYPES.contains(&g)
    })
}

/// Builds one derived visualization from a set of registered tables
pub struct DerivedCreator {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn TableStore>,
    basemap: BasemapConfig,
}

impl DerivedCreator {
    pub fn new(catalog: Arc<dyn Catalog>, store: Arc<dyn TableStore>, basemap: BasemapConfig) -> Self {
        Self {
            catalog,
            store,
            basemap,
        }
    }

    /// Assemble and save the visualization
    ///
    /// Tables whose geometry cannot be rendered are returned as rejected layers
    /// instead of being added.
    pub fn create(
        &self,
        user: &Tenant,
        tables: &[RegisteredTable],
    ) -> Result<(Visualization, Vec<RejectedLayer>), VisualizationError> {
        let name = match tables {
            [table] => format!("{} map", table.name),
            _ => UNTITLED_MAP_NAME.to_string(),
        };
        let mut visualization = Visualization::new(name, VisualizationType::Derived, user.id);

        let base = basemap_layer(&self.basemap);
        let labels = default_labels_layer(&base);
        visualization.map.add_layer(base);

        let mut rejected = Vec::new();
        let mut extents = Vec::new();
        for table in tables {
            if !is_supported_geometry(table.geometry_type.as_deref()) {
                debug!(table = %table.name, geometry = ?table.geometry_type, "Rejecting layer");
                rejected.push(RejectedLayer {
                    table_name: table.name.clone(),
                    reason: match &table.geometry_type {
                        Some(g) => format!("unsupported geometry type {}", g),
                        None => "table has no geometry".to_string(),
                    },
                });
                continue;
            }
            visualization
                .map
                .add_layer(table_layer(&table.name, &user.username));
            if let Some(bounds) = table_bounds(
                self.catalog.as_ref(),
                self.store.as_ref(),
                user.id,
                &table.name,
            )?
            .or(table.bounds)
            {
                extents.push(bounds);
            }
        }

        if let Some(labels) = labels {
            visualization.map.add_layer(labels);
        }
        visualization.map.fit_bounds(union_bounds(extents));

        self.catalog.save_visualization(&visualization)?;
        info!(
            visualization_id = %visualization.id,
            layers = visualization.data_layer_count(),
            rejected = rejected.len(),
            "Created derived visualization"
        );
        Ok((visualization, rejected))
    }
}
