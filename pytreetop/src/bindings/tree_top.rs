use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use treetop::collect::geojson_io::boundary_from_geojson;
use treetop::geometric::height_grid::HeightGrid;
use treetop::geometric::tree_top::TreeTop;
use treetop::Detection;

use crate::bindings::geo_core::PyGeoCore;
use crate::bindings::{geojson_to_py, parse_config};

/// TreeTop Python binding
#[pyclass]
pub struct PyTreeTop {
    inner: TreeTop,
}

impl PyTreeTop {
    fn detection(&self) -> PyResult<&Detection> {
        self.inner
            .get_detection()
            .ok_or_else(|| PyValueError::new_err("No detection available. Call run() first."))
    }
}

#[pymethods]
impl PyTreeTop {
    #[new]
    #[pyo3(signature = (config_json, output_path = None, set_crs = None))]
    fn new(config_json: &str, output_path: Option<String>, set_crs: Option<i32>) -> PyResult<Self> {
        let config = parse_config(config_json)?;
        match TreeTop::new(output_path, &config, set_crs) {
            Ok(tree_top) => Ok(PyTreeTop { inner: tree_top }),
            Err(e) => Err(PyValueError::new_err(format!(
                "Failed to create TreeTop: {}",
                e
            ))),
        }
    }

    /// Set the canopy height model from row-major values
    #[pyo3(signature = (rows, cols, data, origin_x = 0.0, origin_y = None, cell_size = 1.0, nodata = None))]
    #[allow(clippy::too_many_arguments)]
    fn set_height_grid(
        &mut self,
        rows: usize,
        cols: usize,
        data: Vec<f64>,
        origin_x: f64,
        origin_y: Option<f64>,
        cell_size: f64,
        nodata: Option<f64>,
    ) -> PyResult<()> {
        let origin_y = origin_y.unwrap_or(rows as f64 * cell_size);
        let grid = HeightGrid::from_vec_with_nodata(rows, cols, data, nodata)
            .and_then(|g| g.with_georeference(origin_x, origin_y, cell_size))
            .map_err(|e| PyValueError::new_err(format!("Invalid height grid: {}", e)))?;
        let epsg = self.inner.geo_core.get_epsg();
        self.inner.set_height_grid(grid.with_epsg(epsg));
        Ok(())
    }

    /// Set the project boundary from a GeoJSON string
    fn set_boundary_geojson(&mut self, geojson: &str) -> PyResult<()> {
        let boundary = boundary_from_geojson(geojson)
            .map_err(|e| PyValueError::new_err(format!("Invalid boundary: {}", e)))?;
        self.inner
            .set_boundary(boundary)
            .map_err(|e| PyValueError::new_err(format!("Invalid boundary: {}", e)))
    }

    /// Read the project boundary from a GeoJSON file
    fn load_boundary_geojson(&mut self, path: &str) -> PyResult<()> {
        self.inner
            .load_boundary_geojson(path)
            .map_err(|e| PyValueError::new_err(format!("{:#}", e)))
    }

    /// Detect tree tops
    fn run(mut slf: PyRefMut<Self>) -> PyResult<PyRefMut<Self>> {
        slf.inner
            .run_internal()
            .map_err(|e| PyValueError::new_err(format!("Failed to run TreeTop: {}", e)))?;
        Ok(slf)
    }

    /// Number of detected tree tops
    fn tree_count(&self) -> usize {
        self.inner
            .get_detection()
            .map(|d| d.points.len())
            .unwrap_or(0)
    }

    /// Tree tops as dicts with id, row, col, x, y and height
    fn points<'py>(&self, py: Python<'py>) -> PyResult<Vec<Bound<'py, PyDict>>> {
        let detection = self.detection()?;
        detection
            .points
            .iter()
            .map(|p| {
                let dict = PyDict::new(py);
                dict.set_item("id", p.id)?;
                dict.set_item("row", p.row)?;
                dict.set_item("col", p.col)?;
                dict.set_item("x", p.location.x())?;
                dict.set_item("y", p.location.y())?;
                dict.set_item("height", p.height)?;
                Ok(dict)
            })
            .collect()
    }

    /// Segmentation grid as rows of tree ids, None for unlabeled cells
    fn segmentation(&self) -> PyResult<Vec<Vec<Option<u32>>>> {
        let segmentation = &self.detection()?.segmentation;
        let geometry = segmentation.geometry();
        Ok((0..geometry.rows)
            .map(|row| {
                (0..geometry.cols)
                    .map(|col| segmentation.get(row, col))
                    .collect()
            })
            .collect())
    }

    /// Heights after masking, smoothing and conversion (CHM_ft), None for nodata
    fn height_grid(&self) -> PyResult<Vec<Vec<Option<f64>>>> {
        let grid = &self.detection()?.height_grid;
        Ok((0..grid.rows())
            .map(|row| (0..grid.cols()).map(|col| grid.get(row, col)).collect())
            .collect())
    }

    /// Save CHM_ft.tif and Segmentation.tif, returns both paths
    #[cfg(feature = "gdal")]
    fn to_rasters(&self) -> PyResult<(String, String)> {
        self.inner
            .to_rasters()
            .map(|(chm, seg)| {
                (
                    chm.to_string_lossy().to_string(),
                    seg.to_string_lossy().to_string(),
                )
            })
            .map_err(|e| PyValueError::new_err(format!("Failed to save rasters: {:#}", e)))
    }

    /// Tree-top points as a GeoJSON dict
    fn get_geojson(&self, py: Python) -> PyResult<Py<PyAny>> {
        match self.inner.get_geojson() {
            Some(geojson) => geojson_to_py(py, &geojson),
            None => Err(PyValueError::new_err(
                "No detection available. Call run() first.",
            )),
        }
    }

    /// Save to GeoJSON file, returns the written path
    #[pyo3(signature = (name = None))]
    fn to_geojson(&self, name: Option<&str>) -> PyResult<String> {
        self.inner
            .to_geojson(name)
            .map(|p| p.to_string_lossy().to_string())
            .map_err(|e| PyValueError::new_err(format!("Failed to save GeoJSON: {}", e)))
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
