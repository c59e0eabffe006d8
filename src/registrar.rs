//! Catalog registration of physical tables

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::BasemapConfig;
use crate::database::TableStore;
use crate::error::ImportResult;
use crate::models::{RegisteredTable, Tenant, Visualization, VisualizationType};
use crate::visualization::{basemap_layer, default_labels_layer, table_layer};

/// Trait for table registrars
pub trait TableRegistrar: Send {
    /// Register the physical table `schema.name` for the registrar's tenant
    fn register(&mut self, schema: &str, name: &str, job_id: Uuid) -> ImportResult<RegisteredTable>;

    /// Table registered by the last successful `register` call
    fn table(&self) -> Option<&RegisteredTable>;

    /// Tenant tables are registered for
    fn user(&self) -> &Tenant;
}

/// Registers tables in the catalog together with their table visualization
pub struct CatalogRegistrar {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn TableStore>,
    user: Tenant,
    basemap: BasemapConfig,
    table: Option<RegisteredTable>,
}

impl CatalogRegistrar {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn TableStore>,
        user: Tenant,
        basemap: BasemapConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            user,
            basemap,
            table: None,
        }
    }

    fn table_visualization(&self, name: &str) -> Visualization {
        let mut visualization = Visualization::new(name, VisualizationType::Table, self.user.id);
        let base = basemap_layer(&self.basemap);
        let labels = default_labels_layer(&base);
        visualization.map.add_layer(base);
        visualization
            .map
            .add_layer(table_layer(name, &self.user.username));
        if let Some(labels) = labels {
            visualization.map.add_layer(labels);
        }
        visualization
    }
}

impl TableRegistrar for CatalogRegistrar {
    fn register(&mut self, schema: &str, name: &str, job_id: Uuid) -> ImportResult<RegisteredTable> {
        let geometry_type = self.store.geometry_type(schema, name)?;
        let bounds = self.store.bounds(schema, name)?;

        let mut visualization = self.table_visualization(name);
        visualization.map.fit_bounds(bounds);
        self.catalog.save_visualization(&visualization)?;

        let mut table = RegisteredTable::new(self.user.id, schema, name);
        table.data_import_id = Some(job_id);
        table.visualization_id = visualization.id;
        table.geometry_type = geometry_type;
        table.bounds = bounds;

        if let Err(e) = self.catalog.insert_table(&table) {
            if let Err(cleanup) = self.catalog.delete_visualization(visualization.id) {
                warn!(
                    table = name,
                    error = %cleanup,
                    "Could not remove table visualization after failed registration"
                );
            }
            return Err(e.into());
        }

        info!(
            table = name,
            schema,
            visualization_id = %visualization.id,
            "Registered table"
        );
        self.table = Some(table.clone());
        Ok(table)
    }

    fn table(&self) -> Option<&RegisteredTable> {
        self.table.as_ref()
    }

    fn user(&self) -> &Tenant {
        &self.user
    }
}
