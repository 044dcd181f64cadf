// Python bindings module
// Each file contains one PyO3 #[pyclass] definition

pub mod geo_core;
pub mod lidar_summary;
pub mod tree_top;

pub use geo_core::PyGeoCore;
pub use lidar_summary::PyLidarSummary;
pub use tree_top::PyTreeTop;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use treetop::PipelineConfig;

/// Parse a JSON configuration string into a validated PipelineConfig
pub(crate) fn parse_config(config_json: &str) -> PyResult<PipelineConfig> {
    PipelineConfig::from_json_str(config_json)
        .map_err(|e| PyValueError::new_err(format!("Invalid configuration: {}", e)))
}

/// Convert a GeoJSON document to a Python object through the json module
pub(crate) fn geojson_to_py(py: Python, geojson: &geojson::GeoJson) -> PyResult<Py<PyAny>> {
    let json = py.import("json")?;
    let value: Bound<PyAny> = json.call_method1("loads", (geojson.to_string(),))?;
    Ok(value.unbind())
}
