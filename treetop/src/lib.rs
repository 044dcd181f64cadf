//! Tree-top detection on canopy height models and per-stand tree statistics.
//!
//! The `geometric` module holds the grid, filter, detector and aggregation
//! core plus the two workflow tools, [`TreeTop`] and [`LidarSummary`].
//! `collect` reads and writes GeoJSON, CSV and (with the `gdal` feature)
//! GeoTIFF products.

pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;

pub use config::PipelineConfig;
pub use error::{Result, TreeTopError};
pub use geo_core::GeoCore;
pub use geometric::height_grid::{GridGeometry, HeightGrid};
pub use geometric::lidar_summary::LidarSummary;
pub use geometric::stand::{Stand, StandCollection};
pub use geometric::tree_detector::{
    Detection, DetectorParams, SegmentationGrid, TreeDetector, TreePoint,
};
pub use geometric::tree_top::TreeTop;
pub use geometric::zonal::{HeightBand, StandSummary, ZonalAggregator};
