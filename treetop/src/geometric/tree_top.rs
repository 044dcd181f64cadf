use anyhow::{Context, Result};
use geo::{Geometry, MultiPolygon};
use geojson::GeoJson;
use log::info;
use std::path::{Path, PathBuf};

use crate::collect::geojson_io::{boundary_from_geojson, tree_points_to_geojson, write_geojson};
use crate::collect::global_variables::{OUTPUT_PATH, TREE_TOP_NAME};
use crate::config::PipelineConfig;
use crate::geo_core::{polygonal, GeoCore};
use crate::geometric::height_grid::HeightGrid;
use crate::geometric::tree_detector::{Detection, TreeDetector};

/// Tree-top points and canopy segmentation from a canopy height model
///
/// Input: a height grid (metres or feet) and an optional project boundary.
/// Products: the `TreeTop` points, the `CHM_ft` grid and the `Segmentation`
/// grid of tree ids.
pub struct TreeTop {
    /// GeoCore for CRS handling
    pub geo_core: GeoCore,
    /// Output directory for written products
    output_path: PathBuf,
    detector: TreeDetector,
    height_grid: Option<HeightGrid>,
    boundary: Option<MultiPolygon<f64>>,
    detection: Option<Detection>,
}

impl TreeTop {
    /// Create a new TreeTop run from a validated configuration
    pub fn new(
        output_path: Option<String>,
        config: &PipelineConfig,
        set_crs: Option<i32>,
    ) -> Result<Self> {
        let output_path = PathBuf::from(output_path.as_deref().unwrap_or(OUTPUT_PATH));

        let mut geo_core = match set_crs {
            Some(epsg) => GeoCore::new(epsg),
            None => GeoCore::default(),
        };
        geo_core.set_output_path(Some(output_path.to_string_lossy().to_string()));

        let detector = TreeDetector::new(config.detector_params()?)
            .context("Invalid tree-top detection parameters")?;

        Ok(TreeTop {
            geo_core,
            output_path,
            detector,
            height_grid: None,
            boundary: None,
            detection: None,
        })
    }

    /// Set the canopy height model
    pub fn set_height_grid(&mut self, grid: HeightGrid) {
        if let Some(epsg) = grid.epsg() {
            self.geo_core.set_epsg(epsg);
        }
        self.height_grid = Some(grid);
    }

    /// Read the canopy height model from a GeoTIFF
    #[cfg(feature = "gdal")]
    pub fn load_height_grid<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let grid = crate::collect::raster_io::read_height_grid(path)?;
        self.set_height_grid(grid);
        Ok(())
    }

    /// Set the project boundary used as mask
    pub fn set_boundary(&mut self, boundary: MultiPolygon<f64>) -> Result<()> {
        let boundary = polygonal("boundary", Geometry::MultiPolygon(boundary))?;
        self.boundary = Some(boundary);
        Ok(())
    }

    /// Read the project boundary from a GeoJSON file
    pub fn load_boundary_geojson<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read boundary file: {:?}", path))?;
        let boundary = boundary_from_geojson(&text)
            .with_context(|| format!("Invalid boundary in {:?}", path))?;
        self.boundary = Some(boundary);
        Ok(())
    }

    /// Run detection on the configured grid
    pub fn run(mut self) -> Result<Self> {
        self.run_internal()?;
        Ok(self)
    }

    /// Same as `run()` on a borrowed instance
    pub fn run_internal(&mut self) -> Result<()> {
        let grid = self
            .height_grid
            .as_ref()
            .context("No height grid set. Call set_height_grid() first.")?;

        let detection = self.detector.detect(grid, self.boundary.as_ref())?;
        info!(
            "TreeTop: {} tree tops, {} labeled cells",
            detection.points.len(),
            detection.segmentation.labeled_count()
        );
        self.detection = Some(detection);
        Ok(())
    }

    /// Detection result, available after `run()`
    pub fn get_detection(&self) -> Option<&Detection> {
        self.detection.as_ref()
    }

    /// Tree-top points as GeoJSON
    pub fn get_geojson(&self) -> Option<GeoJson> {
        self.detection
            .as_ref()
            .map(|d| tree_points_to_geojson(&d.points))
    }

    /// Save the tree-top points to `{output_path}/{name}.geojson`
    pub fn to_geojson(&self, name: Option<&str>) -> Result<PathBuf> {
        let geojson = self
            .get_geojson()
            .context("No detection available. Call run() first.")?;
        std::fs::create_dir_all(&self.output_path)
            .with_context(|| format!("Failed to create {:?}", self.output_path))?;

        let output_file = self
            .output_path
            .join(format!("{}.geojson", name.unwrap_or(TREE_TOP_NAME)));
        write_geojson(&output_file, &geojson)
            .with_context(|| format!("Failed to write GeoJSON file: {:?}", output_file))?;
        info!("TreeTop saved to: {:?}", output_file);
        Ok(output_file)
    }

    /// Save `CHM_ft.tif` and `Segmentation.tif` to the output path
    #[cfg(feature = "gdal")]
    pub fn to_rasters(&self) -> Result<(PathBuf, PathBuf)> {
        use crate::collect::global_variables::{CHM_NAME, SEGMENTATION_NAME};
        use crate::collect::raster_io::{write_height_grid, write_segmentation};

        let detection = self
            .detection
            .as_ref()
            .context("No detection available. Call run() first.")?;
        std::fs::create_dir_all(&self.output_path)
            .with_context(|| format!("Failed to create {:?}", self.output_path))?;

        let chm = self.output_path.join(format!("{}.tif", CHM_NAME));
        let seg = self.output_path.join(format!("{}.tif", SEGMENTATION_NAME));
        write_height_grid(&chm, &detection.height_grid)?;
        write_segmentation(&seg, &detection.segmentation)?;
        Ok((chm, seg))
    }

    pub fn get_output_path(&self) -> &Path {
        &self.output_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::zonal::HeightBand;
    use geo::polygon;

    fn config() -> PipelineConfig {
        PipelineConfig::new(
            10.0,
            HeightBand { min: 0.0, max: None },
            HeightBand { min: 0.0, max: None },
        )
    }

    #[test]
    fn test_run_requires_grid() {
        let tool = TreeTop::new(None, &config(), None).unwrap();
        assert!(tool.run().is_err());
    }

    #[test]
    fn test_set_boundary_rejects_empty_polygon() {
        let mut tool = TreeTop::new(None, &config(), None).unwrap();
        let err = tool.set_boundary(MultiPolygon::new(vec![])).unwrap_err();
        assert!(err.to_string().contains("boundary"));
    }

    #[test]
    fn test_run_and_write_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let mut tool = TreeTop::new(
            Some(dir.path().to_string_lossy().to_string()),
            &config(),
            Some(26910),
        )
        .unwrap();
        tool.set_height_grid(HeightGrid::filled(4, 4, 15.0));
        tool.set_boundary(MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ]]))
        .unwrap();
        let tool = tool.run().unwrap();
        let detection = tool.get_detection().unwrap();
        assert_eq!(detection.points.len(), 4);
        assert_eq!(detection.segmentation.labeled_count(), 4);
        assert_eq!(detection.height_grid.valid_count(), 4);
        for p in &detection.points {
            assert_eq!(detection.segmentation.get(p.row, p.col), Some(p.id));
        }
        assert_eq!(tool.geo_core.get_epsg(), 26910);

        let path = tool.to_geojson(None).unwrap();
        assert!(path.ends_with("TreeTop.geojson"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("\"TreeId\""));
    }
}
