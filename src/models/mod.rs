//! Models for import jobs, registered tables and visualizations

pub mod job;
pub mod table;
pub mod visualization;

pub use job::{ImportJob, JobStatus, ProvenanceKind, TableResult};
pub use table::{BoundingBox, RegisteredTable, Tenant};
pub use visualization::{
    BASE_LAYER_KINDS, DATA_LAYER_KINDS, Layer, MapState, Overlay, Privacy, Visualization,
    VisualizationType,
};
