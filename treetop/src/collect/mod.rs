pub mod geojson_io;
pub mod global_variables;
#[cfg(feature = "gdal")]
pub mod raster_io;
#[cfg(feature = "csv")]
pub mod table;
