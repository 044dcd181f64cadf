use pyo3::prelude::*;

mod bindings;

use bindings::{PyGeoCore, PyLidarSummary, PyTreeTop};

/// Python bindings for treetop
/// Tree-top detection on canopy height models and per-stand tree statistics

#[pymodule]
fn pytreetop(m: &Bound<'_, PyModule>) -> PyResult<()> {
    register_geometric_module(m)?;

    m.add_class::<PyGeoCore>()?;
    m.setattr("GeoCore", m.getattr("PyGeoCore")?)?;

    m.add(
        "__doc__",
        "Python bindings for treetop - tree-top detection and stand statistics",
    )?;

    Ok(())
}

fn register_geometric_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let py = py_module.py();
    let submodule = PyModule::new(py, "geometric")?;
    submodule.add("__doc__", "Tree-top detection and stand summary tools.")?;

    submodule.add_class::<PyTreeTop>()?;
    submodule.add_class::<PyLidarSummary>()?;

    // Pythonic names (TreeTop instead of PyTreeTop)
    submodule.setattr("TreeTop", submodule.getattr("PyTreeTop")?)?;
    submodule.setattr("LidarSummary", submodule.getattr("PyLidarSummary")?)?;

    py_module.add_submodule(&submodule)?;

    Ok(())
}
