use anyhow::{Context, Result};
use geojson::GeoJson;
use log::info;
use std::path::{Path, PathBuf};

#[cfg(feature = "polars")]
use polars::prelude::*;

use crate::collect::geojson_io::{summaries_to_geojson, tree_points_from_geojson, write_geojson};
use crate::collect::global_variables::{LIDAR_SUMMARY_NAME, OUTPUT_PATH};
use crate::config::PipelineConfig;
use crate::geo_core::GeoCore;
use crate::geometric::stand::StandCollection;
use crate::geometric::tree_detector::TreePoint;
use crate::geometric::zonal::{StandSummary, ZonalAggregator};

/// Per-stand regen and commercial thin counts, densities and heights
///
/// Input: tree-top points and stand polygons with `SETTING_ID`.
/// Product: the `LidarSummary` table, one row per stand.
pub struct LidarSummary {
    /// GeoCore for CRS handling and acreage
    pub geo_core: GeoCore,
    /// Output directory for written products
    output_path: PathBuf,
    aggregator: ZonalAggregator,
    points: Vec<TreePoint>,
    stands: Option<StandCollection>,
    summaries: Option<Vec<StandSummary>>,
}

impl LidarSummary {
    /// Create a new LidarSummary run from a validated configuration
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

        let aggregator = config
            .aggregator()
            .context("Invalid regen / commercial thin bands")?;

        Ok(LidarSummary {
            geo_core,
            output_path,
            aggregator,
            points: Vec::new(),
            stands: None,
            summaries: None,
        })
    }

    /// Set the tree-top points
    pub fn set_points(&mut self, points: Vec<TreePoint>) {
        self.points = points;
    }

    /// Read tree-top points from a GeoJSON file written by `TreeTop`
    pub fn load_points_geojson<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tree tops: {:?}", path))?;
        self.points = tree_points_from_geojson(&text)
            .with_context(|| format!("Invalid tree tops in {:?}", path))?;
        Ok(())
    }

    /// Set the stands
    pub fn set_stands(&mut self, stands: StandCollection) {
        self.stands = Some(stands);
    }

    /// Read stands from a GeoJSON file; acres come from `Acres` or the geometry
    pub fn load_stands_geojson<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stands: {:?}", path))?;
        let stands = StandCollection::from_geojson_str(&text, &self.geo_core)
            .with_context(|| format!("Invalid stands in {:?}", path))?;
        self.stands = Some(stands);
        Ok(())
    }

    /// Summarize every stand
    pub fn run(mut self) -> Result<Self> {
        self.run_internal()?;
        Ok(self)
    }

    /// Same as `run()` on a borrowed instance
    pub fn run_internal(&mut self) -> Result<()> {
        let stands = self
            .stands
            .as_ref()
            .context("No stands set. Call set_stands() first.")?;

        let summaries = self.aggregator.summarize(&self.points, stands)?;
        info!("LidarSummary: {} stands summarized", summaries.len());
        self.summaries = Some(summaries);
        Ok(())
    }

    /// Summary rows, available after `run()`
    pub fn get_summaries(&self) -> Option<&[StandSummary]> {
        self.summaries.as_deref()
    }

    /// Summary rows with stand geometry as GeoJSON
    pub fn get_geojson(&self) -> Result<GeoJson> {
        let summaries = self
            .summaries
            .as_ref()
            .context("No summaries available. Call run() first.")?;
        let stands = self.stands.as_ref().context("No stands set.")?;
        Ok(summaries_to_geojson(summaries, stands)?)
    }

    fn output_file(&self, name: Option<&str>, extension: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_path)
            .with_context(|| format!("Failed to create {:?}", self.output_path))?;
        Ok(self.output_path.join(format!(
            "{}.{}",
            name.unwrap_or(LIDAR_SUMMARY_NAME),
            extension
        )))
    }

    /// Save to `{output_path}/{name}.geojson`
    pub fn to_geojson(&self, name: Option<&str>) -> Result<PathBuf> {
        let geojson = self.get_geojson()?;
        let output_file = self.output_file(name, "geojson")?;
        write_geojson(&output_file, &geojson)
            .with_context(|| format!("Failed to write GeoJSON file: {:?}", output_file))?;
        info!("LidarSummary saved to: {:?}", output_file);
        Ok(output_file)
    }

    /// Save to `{output_path}/{name}.csv`
    #[cfg(feature = "csv")]
    pub fn to_csv(&self, name: Option<&str>) -> Result<PathBuf> {
        let summaries = self
            .summaries
            .as_ref()
            .context("No summaries available. Call run() first.")?;
        let output_file = self.output_file(name, "csv")?;
        crate::collect::table::write_summaries_csv_file(&output_file, summaries)
            .with_context(|| format!("Failed to write CSV file: {:?}", output_file))?;
        info!("LidarSummary saved to: {:?}", output_file);
        Ok(output_file)
    }

    /// Convert the summary rows to a Polars DataFrame
    #[cfg(feature = "polars")]
    pub fn to_polars_df(&self) -> Result<DataFrame> {
        let summaries = self
            .summaries
            .as_ref()
            .context("No summaries available. Call run() first.")?;

        let mut setting_id_vec: Vec<String> = Vec::new();
        let mut acres_vec: Vec<f64> = Vec::new();
        let mut regen_count_vec: Vec<u64> = Vec::new();
        let mut regen_tpa_vec: Vec<f64> = Vec::new();
        let mut ct_count_vec: Vec<u64> = Vec::new();
        let mut ct_tpa_vec: Vec<f64> = Vec::new();
        let mut min_height_vec: Vec<Option<f64>> = Vec::new();
        let mut max_height_vec: Vec<Option<f64>> = Vec::new();
        let mut mean_height_vec: Vec<Option<f64>> = Vec::new();
        let mut median_height_vec: Vec<Option<f64>> = Vec::new();

        for row in summaries {
            setting_id_vec.push(row.setting_id.clone());
            acres_vec.push(row.acres);
            regen_count_vec.push(row.regen_count as u64);
            regen_tpa_vec.push(row.regen_tpa);
            ct_count_vec.push(row.ct_count as u64);
            ct_tpa_vec.push(row.ct_tpa);
            min_height_vec.push(row.min_height);
            max_height_vec.push(row.max_height);
            mean_height_vec.push(row.mean_height);
            median_height_vec.push(row.median_height);
        }

        let df = df! [
            "SETTING_ID" => setting_id_vec,
            "Acres" => acres_vec,
            "Regen_Count" => regen_count_vec,
            "Regen_TPA" => regen_tpa_vec,
            "CT_Count" => ct_count_vec,
            "CT_TPA" => ct_tpa_vec,
            "MinHeight" => min_height_vec,
            "MaxHeight" => max_height_vec,
            "MeanHeight" => mean_height_vec,
            "MedianHeight" => median_height_vec,
        ]
        .context("Failed to create DataFrame")?;

        Ok(df)
    }

    pub fn get_output_path(&self) -> &Path {
        &self.output_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::stand::Stand;
    use crate::geometric::zonal::HeightBand;
    use geo::{polygon, MultiPolygon, Point};

    fn tool(dir: &Path) -> LidarSummary {
        let config = PipelineConfig::new(
            0.0,
            HeightBand { min: 1.0, max: Some(10.0) },
            HeightBand { min: 20.0, max: None },
        );
        let mut tool =
            LidarSummary::new(Some(dir.to_string_lossy().to_string()), &config, None).unwrap();
        let stand = Stand::new(
            "1",
            MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
            ]]),
            0.5,
        )
        .unwrap();
        tool.set_stands(StandCollection::new(vec![stand]).unwrap());
        tool.set_points(vec![
            TreePoint {
                id: 1,
                row: 0,
                col: 0,
                location: Point::new(2.0, 2.0),
                height: 5.0,
            },
            TreePoint {
                id: 2,
                row: 0,
                col: 1,
                location: Point::new(3.0, 3.0),
                height: 25.0,
            },
        ]);
        tool
    }

    #[test]
    fn test_run_summarizes_stands() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(dir.path()).run().unwrap();
        let rows = tool.get_summaries().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].regen_count, rows[0].regen_tpa), (1, 2.0));
        assert_eq!((rows[0].ct_count, rows[0].ct_tpa), (1, 2.0));
        assert_eq!(rows[0].median_height, Some(15.0));

        let path = tool.to_geojson(None).unwrap();
        assert!(path.ends_with("LidarSummary.geojson"));
    }

    #[test]
    fn test_outputs_need_run() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(dir.path());
        assert!(tool.get_geojson().is_err());
    }

    #[cfg(feature = "polars")]
    #[test]
    fn test_to_polars_df() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(dir.path()).run().unwrap();
        let df = tool.to_polars_df().unwrap();
        assert_eq!(df.height(), 1);
        assert!(df.column("Regen_TPA").is_ok());
        assert!(df.column("MedianHeight").is_ok());
    }

    #[cfg(feature = "csv")]
    #[test]
    fn test_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool(dir.path()).run().unwrap();
        let path = tool.to_csv(None).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("SETTING_ID,Acres"));
    }
}
