//! Tree-top detection on a canopy height grid.
//!
//! Stages: mask to the boundary, optional smoothing, optional unit
//! conversion, minimum-height threshold, local-maximum search, point
//! extraction, and the cell-to-tree lookup that labels the segmentation grid.

use std::collections::HashMap;

use geo::{Geometry, MultiPolygon, Point};
use log::{debug, info, warn};

use crate::error::{Result, TreeTopError};
use crate::geo_core::polygonal;
use crate::geometric::grid_filter::{
    focal_statistics, keep_where_equal, local_extreme, threshold_min, FocalStatistic, Window,
};
use crate::geometric::height_grid::{GridGeometry, HeightGrid};

/// Metres to feet, as applied to the canopy heights
pub const METERS_TO_FEET: f64 = 3.281;

/// One detected tree top
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreePoint {
    /// Unique within a run, assigned from 1 in row-major order
    pub id: u32,
    pub row: usize,
    pub col: usize,
    /// Cell centre in the grid's CRS
    pub location: Point<f64>,
    pub height: f64,
}

/// Detection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    pub smooth: bool,
    pub smooth_window: Window,
    pub smooth_statistic: FocalStatistic,
    /// Clear smoothed values whose cell centre lies outside the boundary
    pub clip_smoothed: bool,
    pub convert_units: bool,
    pub unit_factor: f64,
    /// Cells below this height (after conversion) are dropped
    pub min_height: f64,
    pub local_max_window: Window,
    pub local_max_statistic: FocalStatistic,
}

impl Default for DetectorParams {
    fn default() -> Self {
        DetectorParams {
            smooth: true,
            smooth_window: Window::SMOOTH,
            smooth_statistic: FocalStatistic::Percentile(90.0),
            clip_smoothed: false,
            convert_units: true,
            unit_factor: METERS_TO_FEET,
            min_height: 0.0,
            local_max_window: Window::LOCAL_MAX,
            local_max_statistic: FocalStatistic::Maximum,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<()> {
        if !self.min_height.is_finite() || self.min_height < 0.0 {
            return Err(TreeTopError::InvalidParameter {
                name: "min_height",
                value: self.min_height.to_string(),
                reason: "must be a finite, non-negative height".to_string(),
            });
        }
        if !self.unit_factor.is_finite() || self.unit_factor <= 0.0 {
            return Err(TreeTopError::InvalidParameter {
                name: "unit_factor",
                value: self.unit_factor.to_string(),
                reason: "must be a finite, positive factor".to_string(),
            });
        }
        for (name, stat) in [
            ("smooth_statistic", self.smooth_statistic),
            ("local_max_statistic", self.local_max_statistic),
        ] {
            if let FocalStatistic::Percentile(p) = stat {
                if !(0.0..=100.0).contains(&p) {
                    return Err(TreeTopError::InvalidParameter {
                        name,
                        value: p.to_string(),
                        reason: "percentile must be between 0 and 100".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Grid of tree ids: every tree-top cell holds the id of its point
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationGrid {
    geometry: GridGeometry,
    labels: Vec<Option<u32>>,
}

impl SegmentationGrid {
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u32> {
        if row < self.geometry.rows && col < self.geometry.cols {
            self.labels[self.geometry.index(row, col)]
        } else {
            None
        }
    }

    pub fn labels(&self) -> &[Option<u32>] {
        &self.labels
    }

    pub fn labeled_count(&self) -> usize {
        self.labels.iter().filter(|l| l.is_some()).count()
    }

    pub fn is_all_nodata(&self) -> bool {
        self.labels.iter().all(|l| l.is_none())
    }

    /// Row-major labels as floats with `nodata` for unlabeled cells, for export
    pub fn to_vec_with_nodata(&self, nodata: f64) -> Vec<f64> {
        self.labels
            .iter()
            .map(|l| l.map(|id| id as f64).unwrap_or(nodata))
            .collect()
    }
}

/// Result of one detection run
#[derive(Debug, Clone)]
pub struct Detection {
    pub points: Vec<TreePoint>,
    pub segmentation: SegmentationGrid,
    /// Masked, smoothed and converted heights before the threshold (CHM_ft)
    pub height_grid: HeightGrid,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Finds tree tops as exact local maxima of the thresholded canopy heights
#[derive(Debug, Clone)]
pub struct TreeDetector {
    params: DetectorParams,
}

impl TreeDetector {
    pub fn new(params: DetectorParams) -> Result<Self> {
        params.validate()?;
        Ok(TreeDetector { params })
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Run detection on `grid`, masked to `boundary` when given.
    ///
    /// An empty grid after masking, or a minimum height above every cell,
    /// gives an empty point set and an all-nodata segmentation. A malformed
    /// boundary is a geometry input error.
    pub fn detect(
        &self,
        grid: &HeightGrid,
        boundary: Option<&MultiPolygon<f64>>,
    ) -> Result<Detection> {
        let p = &self.params;
        info!(
            "Detecting tree tops on {}x{} grid (min height {})",
            grid.rows(),
            grid.cols(),
            p.min_height
        );

        let boundary = boundary
            .map(|b| polygonal("boundary", Geometry::MultiPolygon(b.clone())))
            .transpose()?;

        let mut chm = match &boundary {
            Some(b) => grid.masked(b),
            None => grid.clone(),
        };
        debug!("{} valid cells after masking", chm.valid_count());

        if p.smooth {
            info!("Smoothing with {:?}", p.smooth_statistic);
            // nodata cells with valid neighbours get a value, including gaps
            chm = focal_statistics(&chm, p.smooth_window, p.smooth_statistic)?;
            if let (true, Some(b)) = (p.clip_smoothed, &boundary) {
                chm = chm.masked(b);
            }
        }
        if p.convert_units {
            info!("Converting heights by factor {}", p.unit_factor);
            chm = chm.scaled(p.unit_factor);
        }

        let thresholded = threshold_min(&chm, p.min_height);
        if thresholded.is_all_nodata() {
            warn!("No cell reaches the minimum height; no tree tops");
        }

        let local_max = local_extreme(&thresholded, p.local_max_window, p.local_max_statistic)?;
        let candidates = keep_where_equal(&thresholded, &local_max)?;

        let points = extract_points(&candidates)?;
        info!("Found {} tree tops", points.len());

        let segmentation = segment(&candidates, &points);

        Ok(Detection {
            points,
            segmentation,
            height_grid: chm,
        })
    }
}

fn extract_points(candidates: &HeightGrid) -> Result<Vec<TreePoint>> {
    candidates
        .iter_valid()
        .enumerate()
        .map(|(i, (row, col, height))| {
            let id = u32::try_from(i + 1).map_err(|_| {
                TreeTopError::Configuration("more tree tops than u32 identifiers".to_string())
            })?;
            Ok(TreePoint {
                id,
                row,
                col,
                location: candidates.cell_center(row, col),
                height,
            })
        })
        .collect()
}

/// Reclass candidate cells to tree ids through a cell -> id lookup table
fn segment(candidates: &HeightGrid, points: &[TreePoint]) -> SegmentationGrid {
    let geometry = *candidates.geometry();
    let lookup: HashMap<usize, u32> = points
        .iter()
        .map(|p| (geometry.index(p.row, p.col), p.id))
        .collect();

    let labels = (0..geometry.len())
        .map(|idx| lookup.get(&idx).copied())
        .collect();

    SegmentationGrid { geometry, labels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn plain(min_height: f64) -> TreeDetector {
        TreeDetector::new(DetectorParams {
            smooth: false,
            convert_units: false,
            min_height,
            ..DetectorParams::default()
        })
        .unwrap()
    }

    #[test]
    fn test_constant_grid_every_cell_is_a_top() {
        let grid = HeightGrid::filled(10, 10, 15.0);
        let detection = plain(10.0).detect(&grid, None).unwrap();
        assert_eq!(detection.points.len(), 100);
        assert!(detection.points.iter().all(|p| p.height == 15.0));
        let ids: Vec<u32> = detection.points.iter().map(|p| p.id).collect();
        assert_eq!(ids, (1..=100).collect::<Vec<u32>>());
    }

    #[test]
    fn test_ties_are_not_deduplicated() {
        let mut data = vec![10.0; 25];
        data[2 * 5 + 2] = 20.0;
        data[2 * 5 + 3] = 20.0;
        let grid = HeightGrid::new(5, 5, data).unwrap();
        let detection = plain(0.0).detect(&grid, None).unwrap();
        let cells: Vec<(u32, usize, usize)> = detection
            .points
            .iter()
            .map(|p| (p.id, p.row, p.col))
            .collect();
        assert_eq!(cells, vec![(1, 2, 2), (2, 2, 3)]);
        assert!(detection.points.iter().all(|p| p.height == 20.0));
        assert_eq!(detection.segmentation.get(2, 2), Some(1));
        assert_eq!(detection.segmentation.get(2, 3), Some(2));
    }

    #[test]
    fn test_all_nodata_gives_empty_result() {
        let grid = HeightGrid::new(4, 4, vec![f64::NAN; 16]).unwrap();
        let detection = TreeDetector::new(DetectorParams::default())
            .unwrap()
            .detect(&grid, None)
            .unwrap();
        assert!(detection.is_empty());
        assert!(detection.segmentation.is_all_nodata());
    }

    #[test]
    fn test_min_height_above_every_cell() {
        let grid = HeightGrid::filled(6, 6, 5.0);
        let detection = plain(50.0).detect(&grid, None).unwrap();
        assert!(detection.is_empty());
        assert!(detection.segmentation.is_all_nodata());
    }

    #[test]
    fn test_segmentation_labels_match_points() {
        let data: Vec<f64> = (0..100).map(|i| ((i * 7) % 13) as f64).collect();
        let grid = HeightGrid::new(10, 10, data).unwrap();
        let detection = plain(1.0).detect(&grid, None).unwrap();
        assert!(!detection.is_empty());
        assert_eq!(detection.segmentation.labeled_count(), detection.points.len());
        for p in &detection.points {
            assert_eq!(detection.segmentation.get(p.row, p.col), Some(p.id));
            assert_eq!(grid.get(p.row, p.col), Some(p.height));
        }
    }

    #[test]
    fn test_conversion_applies_before_threshold() {
        // 4 m is below 10 but 13.124 ft is not
        let grid = HeightGrid::filled(3, 3, 4.0);
        let detector = TreeDetector::new(DetectorParams {
            smooth: false,
            convert_units: true,
            min_height: 10.0,
            ..DetectorParams::default()
        })
        .unwrap();
        let detection = detector.detect(&grid, None).unwrap();
        assert_eq!(detection.points.len(), 9);
        assert!((detection.points[0].height - 13.124).abs() < 1e-9);
    }

    fn lower_left_block() -> MultiPolygon<f64> {
        // lower-left 3x3 block of a unit grid covering (0,0)..(6,6)
        MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 3.0, y: 0.0),
            (x: 3.0, y: 3.0),
            (x: 0.0, y: 3.0),
        ]])
    }

    fn smoothing(clip_smoothed: bool) -> TreeDetector {
        TreeDetector::new(DetectorParams {
            smooth: true,
            clip_smoothed,
            convert_units: false,
            min_height: 1.0,
            ..DetectorParams::default()
        })
        .unwrap()
    }

    #[test]
    fn test_boundary_mask_without_smoothing() {
        let grid = HeightGrid::filled(6, 6, 12.0);
        let detection = plain(1.0).detect(&grid, Some(&lower_left_block())).unwrap();
        assert_eq!(detection.height_grid.valid_count(), 9);
        assert_eq!(detection.points.len(), 9);
        assert!(detection.points.iter().all(|p| p.row >= 3 && p.col < 3));
    }

    #[test]
    fn test_smoothing_fills_interior_gap() {
        let mut data = vec![12.0; 49];
        data[3 * 7 + 3] = f64::NAN;
        let grid = HeightGrid::new(7, 7, data).unwrap();
        assert_eq!(grid.get(3, 3), None);

        let detection = smoothing(false).detect(&grid, None).unwrap();
        assert_eq!(detection.height_grid.get(3, 3), Some(12.0));
        assert_eq!(detection.points.len(), 49);
    }

    #[test]
    fn test_smoothing_reaches_past_boundary_unless_clipped() {
        let grid = HeightGrid::filled(6, 6, 12.0);

        // the ring of cells next to the block picks up its values
        let detection = smoothing(false).detect(&grid, Some(&lower_left_block())).unwrap();
        assert_eq!(detection.height_grid.valid_count(), 16);

        let detection = smoothing(true).detect(&grid, Some(&lower_left_block())).unwrap();
        assert_eq!(detection.height_grid.valid_count(), 9);
        assert_eq!(detection.points.len(), 9);
        assert!(detection.points.iter().all(|p| p.row >= 3 && p.col < 3));
    }

    #[test]
    fn test_malformed_boundary_is_a_geometry_error() {
        let grid = HeightGrid::filled(5, 5, 15.0);
        let err = plain(1.0)
            .detect(&grid, Some(&MultiPolygon::new(vec![])))
            .unwrap_err();
        assert!(matches!(err, TreeTopError::GeometryInput { .. }));
        assert!(err.to_string().contains("boundary"));

        let nan = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: f64::NAN, y: 0.0),
            (x: 1.0, y: 1.0),
        ]]);
        assert!(plain(1.0).detect(&grid, Some(&nan)).is_err());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let err = TreeDetector::new(DetectorParams {
            min_height: f64::NAN,
            ..DetectorParams::default()
        })
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(TreeDetector::new(DetectorParams {
            unit_factor: 0.0,
            ..DetectorParams::default()
        })
        .is_err());
    }
}
