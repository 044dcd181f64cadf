use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use treetop::geometric::lidar_summary::LidarSummary;
use treetop::geometric::stand::StandCollection;

use crate::bindings::geo_core::PyGeoCore;
use crate::bindings::{geojson_to_py, parse_config};

/// LidarSummary Python binding
#[pyclass]
pub struct PyLidarSummary {
    inner: LidarSummary,
}

#[pymethods]
impl PyLidarSummary {
    #[new]
    #[pyo3(signature = (config_json, output_path = None, set_crs = None))]
    fn new(config_json: &str, output_path: Option<String>, set_crs: Option<i32>) -> PyResult<Self> {
        let config = parse_config(config_json)?;
        match LidarSummary::new(output_path, &config, set_crs) {
            Ok(summary) => Ok(PyLidarSummary { inner: summary }),
            Err(e) => Err(PyValueError::new_err(format!(
                "Failed to create LidarSummary: {}",
                e
            ))),
        }
    }

    /// Read tree tops from a GeoJSON file written by TreeTop
    fn load_points_geojson(&mut self, path: &str) -> PyResult<()> {
        self.inner
            .load_points_geojson(path)
            .map_err(|e| PyValueError::new_err(format!("{:#}", e)))
    }

    /// Read stands from a GeoJSON file
    fn load_stands_geojson(&mut self, path: &str) -> PyResult<()> {
        self.inner
            .load_stands_geojson(path)
            .map_err(|e| PyValueError::new_err(format!("{:#}", e)))
    }

    /// Set stands from a GeoJSON string
    fn set_stands_geojson(&mut self, geojson: &str) -> PyResult<()> {
        let stands = StandCollection::from_geojson_str(geojson, &self.inner.geo_core)
            .map_err(|e| PyValueError::new_err(format!("Invalid stands: {}", e)))?;
        self.inner.set_stands(stands);
        Ok(())
    }

    /// Summarize every stand
    fn run(mut slf: PyRefMut<Self>) -> PyResult<PyRefMut<Self>> {
        slf.inner
            .run_internal()
            .map_err(|e| PyValueError::new_err(format!("Failed to run LidarSummary: {}", e)))?;
        Ok(slf)
    }

    /// Summary table as a GeoJSON dict
    fn get_geojson(&self, py: Python) -> PyResult<Py<PyAny>> {
        let geojson = self
            .inner
            .get_geojson()
            .map_err(|e| PyValueError::new_err(format!("{}", e)))?;
        geojson_to_py(py, &geojson)
    }

    /// Save to GeoJSON file, returns the written path
    #[pyo3(signature = (name = None))]
    fn to_geojson(&self, name: Option<&str>) -> PyResult<String> {
        self.inner
            .to_geojson(name)
            .map(|p| p.to_string_lossy().to_string())
            .map_err(|e| PyValueError::new_err(format!("Failed to save GeoJSON: {}", e)))
    }

    /// Save to CSV file, returns the written path
    #[pyo3(signature = (name = None))]
    fn to_csv(&self, name: Option<&str>) -> PyResult<String> {
        self.inner
            .to_csv(name)
            .map(|p| p.to_string_lossy().to_string())
            .map_err(|e| PyValueError::new_err(format!("Failed to save CSV: {}", e)))
    }

    /// Get output path
    fn get_output_path(&self) -> String {
        self.inner.get_output_path().to_string_lossy().to_string()
    }

    /// Get GeoCore instance
    #[getter]
    fn geo_core(&self) -> PyGeoCore {
        PyGeoCore {
            inner: self.inner.geo_core.clone(),
        }
    }
}
