//! Copy of table visualization metadata from the common-data catalog
//!
//! When a shared dataset is imported, its local table visualization is
//! aligned with the one published in the common-data account: table aliases,
//! map settings and per-layer styling. The copy is best-effort.

use std::sync::Arc;

use serde_json::{Map as JsonMap, Value};
use thiserror::Error;
use tracing::info;

use crate::catalog::{Catalog, CatalogError};
use crate::config::CommonDataConfig;
use crate::error::RecoverableError;
use crate::models::{BoundingBox, RegisteredTable, Visualization};

/// Errors raised while talking to the common-data API
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Error fetching {url} - {status} {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Malformed response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl RemoteError {
    fn malformed(url: &str, message: impl Into<String>) -> Self {
        RemoteError::Malformed {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

/// Trait for clients of the common-data metadata API
pub trait MetadataClient: Send + Sync {
    /// GET `url` authenticated with `api_key`, returning the JSON body of a 200 response
    fn get_json(&self, url: &str, api_key: &str) -> Result<Value, RemoteError>;
}

/// Blocking HTTP client for the common-data API
#[cfg(feature = "api-backend")]
pub struct HttpMetadataClient {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "api-backend")]
impl HttpMetadataClient {
    pub fn new(timeout: std::time::Duration) -> Result<Self, RemoteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "api-backend")]
impl MetadataClient for HttpMetadataClient {
    fn get_json(&self, url: &str, api_key: &str) -> Result<Value, RemoteError> {
        let request_url = format!("{}?api_key={}", url, urlencoding::encode(api_key));
        tracing::debug!(url, "Fetching remote metadata");
        let response = self
            .client
            .get(&request_url)
            .send()
            .map_err(|e| RemoteError::Transport(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| RemoteError::Transport(format!("Failed to read response from {}: {}", url, e)))?;
        if status != reqwest::StatusCode::OK {
            return Err(RemoteError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| RemoteError::malformed(url, e.to_string()))
    }
}

/// Copies remote table visualization metadata onto a freshly imported table
pub struct RemoteMetadataCopier {
    client: Arc<dyn MetadataClient>,
    catalog: Arc<dyn Catalog>,
    common_data: CommonDataConfig,
}

impl RemoteMetadataCopier {
    pub fn new(
        client: Arc<dyn MetadataClient>,
        catalog: Arc<dyn Catalog>,
        common_data: CommonDataConfig,
    ) -> Self {
        Self {
            client,
            catalog,
            common_data,
        }
    }

    /// Copy metadata for the single imported table
    ///
    /// Every failure comes back as a `RecoverableError`; partial updates made
    /// before a failing request are kept.
    pub fn copy(
        &self,
        tables: &[RegisteredTable],
        foreign_table_name: Option<&str>,
    ) -> Result<(), RecoverableError> {
        let [table] = tables else {
            return Err(RecoverableError::RemoteCopySkipped(
                "imported more than one table".to_string(),
            ));
        };
        let foreign = foreign_table_name.unwrap_or_default();
        if table.name != foreign {
            return Err(RecoverableError::RemoteCopySkipped(format!(
                "local {} != remote {}",
                table.name, foreign
            )));
        }
        let Some(api_key) = self.common_data.api_key() else {
            return Err(RecoverableError::RemoteCopySkipped(
                "missing common data api key".to_string(),
            ));
        };

        self.copy_table(table.clone(), foreign, api_key)
            .map_err(|e| RecoverableError::RemoteCopy(e.to_string()))
    }

    fn copy_table(
        &self,
        mut table: RegisteredTable,
        foreign: &str,
        api_key: &str,
    ) -> Result<(), RemoteError> {
        let base_url = self.common_data.resolved_base_url();

        let url = format!(
            "{}/api/v1/tables/{}",
            base_url,
            urlencoding::encode(foreign)
        );
        let data = self.client.get_json(&url, api_key)?;
        let map_id = match data.pointer("/table_visualization/map_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(RemoteError::malformed(&url, "missing table_visualization.map_id")),
        };
        table.name_alias = data
            .get("name_alias")
            .and_then(Value::as_str)
            .map(str::to_string);
        table.column_aliases = data
            .get("column_aliases")
            .and_then(Value::as_object)
            .map(|aliases| {
                aliases
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        table.updated_at = chrono::Utc::now();
        self.catalog.update_table(&table)?;

        let mut visualization = self
            .catalog
            .find_visualization(table.visualization_id)?
            .ok_or_else(|| {
                RemoteError::Catalog(CatalogError::not_found("Visualization", table.visualization_id))
            })?;

        let url = format!("{}/api/v1/maps/{}", base_url, map_id);
        let data = self.client.get_json(&url, api_key)?;
        apply_map_settings(&mut visualization, &data);
        self.catalog.save_visualization(&visualization)?;

        let url = format!("{}/api/v1/maps/{}/layers", base_url, map_id);
        let data = self.client.get_json(&url, api_key)?;
        let remote_layers = data
            .get("layers")
            .and_then(Value::as_array)
            .ok_or_else(|| RemoteError::malformed(&url, "missing layers"))?;
        if remote_layers.len() < visualization.map.layers.len() {
            return Err(RemoteError::malformed(
                &url,
                format!(
                    "expected {} layers, got {}",
                    visualization.map.layers.len(),
                    remote_layers.len()
                ),
            ));
        }
        for (layer, params) in visualization.map.layers.iter_mut().zip(remote_layers) {
            let params = params
                .as_object()
                .ok_or_else(|| RemoteError::malformed(&url, "layer is not an object"))?;
            apply_layer_params(layer, params);
        }
        visualization.updated_at = chrono::Utc::now();
        self.catalog.save_visualization(&visualization)?;

        info!(table = %table.name, map_id = %map_id, "Copied remote visualization metadata");
        Ok(())
    }
}

fn apply_map_settings(visualization: &mut Visualization, data: &Value) {
    let map = &mut visualization.map;
    if let Some(provider) = data.get("provider").and_then(Value::as_str) {
        map.provider = provider.to_string();
    }
    if let Some(bbox) = corners(data, "bounding_box_sw", "bounding_box_ne") {
        map.bounding_box = Some(bbox);
    }
    if let Some(center) = data.get("center").and_then(lat_lon) {
        map.center = center;
    }
    if let Some(zoom) = data.get("zoom").and_then(Value::as_u64) {
        map.zoom = zoom.min(u64::from(crate::models::visualization::MAX_ZOOM)) as u8;
    }
    if let Some(bbox) = corners(data, "view_bounds_sw", "view_bounds_ne") {
        map.view_bounds = Some(bbox);
    }
    if let Some(legends) = data.get("legends").and_then(Value::as_bool) {
        map.legends = legends;
    }
    if let Some(scrollwheel) = data.get("scrollwheel").and_then(Value::as_bool) {
        map.scrollwheel = scrollwheel;
    }
}

/// Overwrite a local layer with remote settings, keeping its table binding
fn apply_layer_params(layer: &mut crate::models::Layer, params: &JsonMap<String, Value>) {
    if let Some(Value::Object(remote_options)) = params.get("options") {
        let mut options = remote_options.clone();
        for key in ["table_name", "user_name"] {
            if options.contains_key(key) {
                match layer.options.get(key) {
                    Some(local) => {
                        options.insert(key.to_string(), local.clone());
                    }
                    None => {
                        options.remove(key);
                    }
                }
            }
        }
        layer.options = options;
    }
    if let Some(kind) = params.get("kind").and_then(Value::as_str) {
        layer.kind = kind.to_string();
    }
    if let Some(infowindow) = params.get("infowindow") {
        layer.infowindow = Some(infowindow.clone());
    }
    if let Some(tooltip) = params.get("tooltip") {
        layer.tooltip = Some(tooltip.clone());
    }
    if let Some(order) = params
        .get("order")
        .and_then(Value::as_u64)
        .and_then(|order| u32::try_from(order).ok())
    {
        layer.order = order;
    }
}

/// `[lat, lon]` from a JSON array or its string encoding
fn lat_lon(value: &Value) -> Option<[f64; 2]> {
    let parsed;
    let value = match value {
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s).ok()?;
            &parsed
        }
        other => other,
    };
    match value.as_array()?.as_slice() {
        [lat, lon] => Some([lat.as_f64()?, lon.as_f64()?]),
        _ => None,
    }
}

fn corners(data: &Value, south_west: &str, north_east: &str) -> Option<BoundingBox> {
    let sw = data.get(south_west).and_then(lat_lon)?;
    let ne = data.get(north_east).and_then(lat_lon)?;
    Some(BoundingBox::from_corners(sw, ne))
}
