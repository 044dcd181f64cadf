pub const OUTPUT_PATH: &str = "./output";

/// Stand identifier attribute
pub const SETTING_ID_FIELD: &str = "SETTING_ID";
/// Stand area attribute, in acres
pub const ACRES_FIELD: &str = "Acres";

pub const TREE_ID_FIELD: &str = "TreeId";
pub const HEIGHT_FIELD: &str = "Height";
pub const ROW_FIELD: &str = "Row";
pub const COL_FIELD: &str = "Col";

/// Output product names
pub const TREE_TOP_NAME: &str = "TreeTop";
pub const CHM_NAME: &str = "CHM_ft";
pub const SEGMENTATION_NAME: &str = "Segmentation";
pub const LIDAR_SUMMARY_NAME: &str = "LidarSummary";

/// Nodata written to exported rasters
pub const RASTER_NODATA: f64 = -9999.0;
