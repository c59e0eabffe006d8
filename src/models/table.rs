//! Registered table model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Geographic extent in WGS84 longitude/latitude
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    /// Smallest box containing both boxes
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Center as `[lat, lon]`
    pub fn center(&self) -> [f64; 2] {
        [
            (self.min_y + self.max_y) / 2.0,
            (self.min_x + self.max_x) / 2.0,
        ]
    }

    /// South-west corner as `[lat, lon]`
    pub fn south_west(&self) -> [f64; 2] {
        [self.min_y, self.min_x]
    }

    /// North-east corner as `[lat, lon]`
    pub fn north_east(&self) -> [f64; 2] {
        [self.max_y, self.max_x]
    }

    /// Build from `[lat, lon]` corner pairs
    pub fn from_corners(south_west: [f64; 2], north_east: [f64; 2]) -> Self {
        Self::new(south_west[1], south_west[0], north_east[1], north_east[0])
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// A tenant of the database
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Tenant {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            api_key: None,
        }
    }
}

/// Catalog entry binding a physical table to a tenant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisteredTable {
    pub id: Uuid,
    pub user_id: Uuid,
    pub schema: String,
    pub name: String,
    /// Import job that produced the table
    pub data_import_id: Option<Uuid>,
    /// Canonical visualization of type `table` for this dataset
    pub visualization_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_alias: Option<String>,
    #[serde(default)]
    pub column_aliases: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegisteredTable {
    pub fn new(user_id: Uuid, schema: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            schema: schema.into(),
            name: name.into(),
            data_import_id: None,
            visualization_id: Uuid::new_v4(),
            geometry_type: None,
            bounds: None,
            name_alias: None,
            column_aliases: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// `schema.name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}
