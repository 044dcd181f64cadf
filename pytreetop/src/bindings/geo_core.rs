use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use treetop::geo_core::{GeoCore, LinearUnit};

/// GeoCore Python binding
#[pyclass]
pub struct PyGeoCore {
    pub(crate) inner: GeoCore,
}

fn unit_name(unit: LinearUnit) -> &'static str {
    match unit {
        LinearUnit::Meter => "meter",
        LinearUnit::Foot => "foot",
        LinearUnit::UsSurveyFoot => "us_survey_foot",
    }
}

#[pymethods]
impl PyGeoCore {
    #[new]
    #[pyo3(signature = (epsg = 26911, linear_unit = "meter"))]
    fn new(epsg: i32, linear_unit: &str) -> PyResult<Self> {
        let mut inner = GeoCore::new(epsg);
        inner.set_linear_unit(parse_unit(linear_unit)?);
        Ok(PyGeoCore { inner })
    }

    #[getter]
    fn epsg(&self) -> i32 {
        self.inner.get_epsg()
    }

    #[setter]
    fn set_epsg(&mut self, epsg: i32) {
        self.inner.set_epsg(epsg);
    }

    #[getter]
    fn linear_unit(&self) -> &'static str {
        unit_name(self.inner.get_linear_unit())
    }

    #[setter]
    fn set_linear_unit(&mut self, linear_unit: &str) -> PyResult<()> {
        self.inner.set_linear_unit(parse_unit(linear_unit)?);
        Ok(())
    }

    #[getter]
    fn output_path(&self) -> Option<String> {
        self.inner.get_output_path().cloned()
    }

    #[setter]
    fn set_output_path(&mut self, output_path: Option<String>) {
        self.inner.set_output_path(output_path);
    }
}

pub(crate) fn parse_unit(name: &str) -> PyResult<LinearUnit> {
    match name.to_ascii_lowercase().as_str() {
        "meter" | "metre" | "m" => Ok(LinearUnit::Meter),
        "foot" | "ft" => Ok(LinearUnit::Foot),
        "us_survey_foot" | "us_ft" => Ok(LinearUnit::UsSurveyFoot),
        other => Err(PyValueError::new_err(format!(
            "Unknown linear unit: {}",
            other
        ))),
    }
}
