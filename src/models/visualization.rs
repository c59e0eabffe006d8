//! Visualization, map, layer and overlay models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use uuid::Uuid;

use super::table::BoundingBox;

/// Layer kinds that can act as a map's base layer
pub const BASE_LAYER_KINDS: &[&str] = &["tiled", "background", "gmapsbase", "wms"];

/// Layer kinds that render tenant data
pub const DATA_LAYER_KINDS: &[&str] = &["carto", "torque"];

/// Kind of the layers rendering imported tables
pub const CARTO_LAYER_KIND: &str = "carto";

/// Default map center `[lat, lon]` when there is nothing to fit
pub const DEFAULT_CENTER: [f64; 2] = [30.0, 0.0];

/// Default zoom when there is nothing to fit
pub const DEFAULT_ZOOM: u8 = 3;

pub const MAX_ZOOM: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationType {
    /// Canonical visualization of a single registered table
    Table,
    /// Map assembled from one or more tables
    Derived,
    /// Placeholder for a dataset living in the common-data catalog
    Remote,
}

impl std::fmt::Display for VisualizationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisualizationType::Table => write!(f, "table"),
            VisualizationType::Derived => write!(f, "derived"),
            VisualizationType::Remote => write!(f, "remote"),
        }
    }
}

impl std::str::FromStr for VisualizationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(VisualizationType::Table),
            "derived" => Ok(VisualizationType::Derived),
            "remote" => Ok(VisualizationType::Remote),
            _ => Err(format!("Invalid visualization type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Link,
    #[default]
    Private,
}

impl std::fmt::Display for Privacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Privacy::Public => write!(f, "public"),
            Privacy::Link => write!(f, "link"),
            Privacy::Private => write!(f, "private"),
        }
    }
}

impl std::str::FromStr for Privacy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Privacy::Public),
            "link" => Ok(Privacy::Link),
            "private" => Ok(Privacy::Private),
            _ => Err(format!("Invalid privacy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub id: Uuid,
    pub kind: String,
    #[serde(default)]
    pub options: JsonMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infowindow: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<Value>,
    pub order: u32,
}

impl Layer {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            options: JsonMap::new(),
            infowindow: None,
            tooltip: None,
            order: 0,
        }
    }

    pub fn with_option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn is_base_layer(&self) -> bool {
        BASE_LAYER_KINDS.contains(&self.kind.as_str())
    }

    pub fn is_data_layer(&self) -> bool {
        DATA_LAYER_KINDS.contains(&self.kind.as_str())
    }

    /// Table rendered by a data layer
    pub fn table_name(&self) -> Option<&str> {
        self.options.get("table_name").and_then(Value::as_str)
    }

    /// Tiled base layers carrying a `labels.urlTemplate` can get a labels layer on top
    pub fn supports_labels_layer(&self) -> bool {
        self.kind == "tiled" && self.labels_url_template().is_some()
    }

    pub(crate) fn labels_url_template(&self) -> Option<&str> {
        self.options
            .get("labels")
            .and_then(|labels| labels.get("urlTemplate"))
            .and_then(Value::as_str)
    }
}

/// Map state attached to a visualization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapState {
    pub provider: String,
    pub layers: Vec<Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_bounds: Option<BoundingBox>,
    /// `[lat, lon]`
    pub center: [f64; 2],
    pub zoom: u8,
    pub legends: bool,
    pub scrollwheel: bool,
}

impl Default for MapState {
    fn default() -> Self {
        Self {
            provider: "leaflet".to_string(),
            layers: Vec::new(),
            bounding_box: None,
            view_bounds: None,
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            legends: true,
            scrollwheel: false,
        }
    }
}

impl MapState {
    /// Append a layer, assigning it the next order
    pub fn add_layer(&mut self, mut layer: Layer) {
        layer.order = self.layers.len() as u32;
        self.layers.push(layer);
    }

    pub fn base_layer(&self) -> Option<&Layer> {
        self.layers.iter().find(|l| l.is_base_layer())
    }

    pub fn data_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.is_data_layer())
    }

    /// Set bounds and derive center and zoom from them
    pub fn fit_bounds(&mut self, bounds: Option<BoundingBox>) {
        self.bounding_box = bounds;
        self.view_bounds = bounds;
        match bounds {
            Some(bbox) => {
                self.center = bbox.center();
                self.zoom = zoom_for_bounds(&bbox);
            }
            None => {
                self.center = DEFAULT_CENTER;
                self.zoom = DEFAULT_ZOOM;
            }
        }
    }
}

/// Highest zoom at which the whole box fits a 256px world tile
pub fn zoom_for_bounds(bbox: &BoundingBox) -> u8 {
    let span = bbox.width().max(bbox.height() * 2.0);
    if span <= f64::EPSILON {
        return MAX_ZOOM;
    }
    let zoom = (360.0 / span).log2().floor();
    zoom.clamp(0.0, MAX_ZOOM as f64) as u8
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Overlay {
    pub id: Uuid,
    pub visualization_id: Uuid,
    #[serde(rename = "type")]
    pub overlay_type: String,
    #[serde(default)]
    pub options: JsonMap<String, Value>,
    pub order: u32,
}

impl Overlay {
    pub fn new(visualization_id: Uuid, overlay_type: impl Into<String>, order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            visualization_id,
            overlay_type: overlay_type.into(),
            options: JsonMap::new(),
            order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visualization {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub vis_type: VisualizationType,
    pub privacy: Privacy,
    pub user_id: Uuid,
    pub map: MapState,
    #[serde(default)]
    pub overlays: Vec<Overlay>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Visualization {
    pub fn new(name: impl Into<String>, vis_type: VisualizationType, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            vis_type,
            privacy: Privacy::default(),
            user_id,
            map: MapState::default(),
            overlays: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn data_layer_count(&self) -> usize {
        self.map.data_layers().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_layer_classification() {
        let base = Layer::new("tiled");
        assert!(base.is_base_layer());
        assert!(!base.is_data_layer());

        let data = Layer::new("carto").with_option("table_name", "routes");
        assert!(data.is_data_layer());
        assert_eq!(data.table_name(), Some("routes"));
    }

    #[test]
    fn test_supports_labels_layer() {
        let plain = Layer::new("tiled");
        assert!(!plain.supports_labels_layer());

        let with_labels = Layer::new("tiled")
            .with_option("labels", json!({"urlTemplate": "https://tiles/{z}/{x}/{y}.png"}));
        assert!(with_labels.supports_labels_layer());

        let background = Layer::new("background")
            .with_option("labels", json!({"urlTemplate": "https://tiles/{z}/{x}/{y}.png"}));
        assert!(!background.supports_labels_layer());
    }

    #[test]
    fn test_add_layer_assigns_order() {
        let mut map = MapState::default();
        map.add_layer(Layer::new("tiled"));
        map.add_layer(Layer::new("carto"));
        assert_eq!(map.layers[1].order, 1);
        assert_eq!(map.data_layers().count(), 1);
    }

    #[test]
    fn test_zoom_for_bounds() {
        let world = BoundingBox::new(-180.0, -85.0, 180.0, 85.0);
        assert_eq!(zoom_for_bounds(&world), 0);

        let city = BoundingBox::new(2.2, 48.8, 2.5, 48.9);
        assert_eq!(zoom_for_bounds(&city), 10);

        let point = BoundingBox::new(1.0, 1.0, 1.0, 1.0);
        assert_eq!(zoom_for_bounds(&point), MAX_ZOOM);
    }

    #[test]
    fn test_fit_bounds_defaults_without_bounds() {
        let mut map = MapState::default();
        map.fit_bounds(Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)));
        assert_eq!(map.center, [5.0, 5.0]);
        map.fit_bounds(None);
        assert_eq!(map.center, DEFAULT_CENTER);
        assert_eq!(map.zoom, DEFAULT_ZOOM);
    }
}
