pub mod grid_filter;
pub mod height_grid;
pub mod lidar_summary;
pub mod stand;
pub mod tree_detector;
pub mod tree_top;
pub mod zonal;
