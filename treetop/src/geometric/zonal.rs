//! Per-stand tree counts, densities and height statistics.
//!
//! A point belongs to a stand only when it lies strictly inside the stand
//! polygon; points on a stand edge count for no stand.

use std::collections::HashMap;

use geo::{Contains, MultiPolygon};
use log::{debug, info, warn};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

use crate::commons::basic_functions::{mean, median_sorted, round2, sort_values};
use crate::commons::maybe_rayon::*;
use crate::error::{Result, TreeTopError};
use crate::geo_core::BoundingBox;
use crate::geometric::stand::{Stand, StandCollection};
use crate::geometric::tree_detector::TreePoint;

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Inclusive height band; `max` of `None` is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightBand {
    pub min: f64,
    pub max: Option<f64>,
}

impl HeightBand {
    pub fn new(min: f64, max: Option<f64>) -> Result<Self> {
        let band = HeightBand { min, max };
        band.validate("band")?;
        Ok(band)
    }

    pub fn validate(&self, name: &'static str) -> Result<()> {
        if !self.min.is_finite() {
            return Err(TreeTopError::InvalidParameter {
                name,
                value: self.min.to_string(),
                reason: "minimum must be finite".to_string(),
            });
        }
        if let Some(max) = self.max {
            if !max.is_finite() || max < self.min {
                return Err(TreeTopError::InvalidParameter {
                    name,
                    value: format!("{}..{}", self.min, max),
                    reason: "maximum must be finite and not below the minimum".to_string(),
                });
            }
        }
        Ok(())
    }

    #[inline]
    pub fn contains(&self, height: f64) -> bool {
        height >= self.min && self.max.map_or(true, |max| height <= max)
    }
}

/// Points whose height falls within `band`
pub fn select_band(points: &[TreePoint], band: &HeightBand) -> Vec<TreePoint> {
    points
        .iter()
        .filter(|p| band.contains(p.height))
        .copied()
        .collect()
}

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// R-tree over tree-top locations, payload is the position in the input slice
pub struct PointIndex {
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    pub fn new(points: &[TreePoint]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.location.x(), p.location.y()], i))
            .collect();
        PointIndex {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Positions of the points strictly inside `polygon`, ascending
    pub fn within(&self, points: &[TreePoint], polygon: &MultiPolygon<f64>) -> Vec<usize> {
        let Some(bbox) = BoundingBox::of(&geo::Geometry::MultiPolygon(polygon.clone())) else {
            return Vec::new();
        };
        let envelope = AABB::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y]);
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|entry| entry.data)
            .filter(|&i| polygon.contains(&points[i].location))
            .collect();
        hits.sort_unstable();
        hits
    }
}

/// Number of `points` strictly inside each stand, in stand order.
///
/// Stands without any joined point are missing from the join and are set to
/// zero here.
pub fn count_by_stand(points: &[TreePoint], stands: &StandCollection) -> Vec<usize> {
    let index = PointIndex::new(points);
    let joined: HashMap<&str, usize> = stands
        .stands()
        .par_iter()
        .filter_map(|stand| {
            let n = index.within(points, &stand.geometry).len();
            (n > 0).then_some((stand.setting_id.as_str(), n))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect();

    stands
        .iter()
        .map(|stand| match joined.get(stand.setting_id.as_str()) {
            Some(&n) => n,
            None => 0,
        })
        .collect()
}

/// Trees per acre rounded to 2 decimals; zero area is an error
pub fn density(count: usize, acres: f64, setting_id: &str) -> Result<f64> {
    if acres == 0.0 {
        return Err(TreeTopError::ZeroArea {
            setting_id: setting_id.to_string(),
        });
    }
    if !acres.is_finite() || acres < 0.0 {
        return Err(TreeTopError::InvalidParameter {
            name: "Acres",
            value: acres.to_string(),
            reason: format!("stand {} needs a finite, positive area", setting_id),
        });
    }
    Ok(round2(count as f64 / acres))
}

/// Height order statistics of one stand, rounded to 2 decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

/// Statistics of `heights`; `None` when there are none
pub fn height_statistics(heights: &[f64]) -> Option<HeightStatistics> {
    let mut sorted = heights.to_vec();
    sort_values(&mut sorted);
    let median = median_sorted(&sorted)?;
    let mean = mean(&sorted)?;
    Some(HeightStatistics {
        min: round2(sorted[0]),
        max: round2(sorted[sorted.len() - 1]),
        mean: round2(mean),
        median: round2(median),
    })
}

/// One row of the stand table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandSummary {
    #[serde(rename = "SETTING_ID")]
    pub setting_id: String,
    #[serde(rename = "Acres")]
    pub acres: f64,
    #[serde(rename = "Regen_Count")]
    pub regen_count: usize,
    #[serde(rename = "Regen_TPA")]
    pub regen_tpa: f64,
    #[serde(rename = "CT_Count")]
    pub ct_count: usize,
    #[serde(rename = "CT_TPA")]
    pub ct_tpa: f64,
    #[serde(rename = "MinHeight")]
    pub min_height: Option<f64>,
    #[serde(rename = "MaxHeight")]
    pub max_height: Option<f64>,
    #[serde(rename = "MeanHeight")]
    pub mean_height: Option<f64>,
    #[serde(rename = "MedianHeight")]
    pub median_height: Option<f64>,
}

impl StandSummary {
    pub fn statistics(&self) -> Option<HeightStatistics> {
        Some(HeightStatistics {
            min: self.min_height?,
            max: self.max_height?,
            mean: self.mean_height?,
            median: self.median_height?,
        })
    }
}

/// Joins tree tops to stands for the regen and commercial-thin bands
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonalAggregator {
    regen: HeightBand,
    ct: HeightBand,
}

impl ZonalAggregator {
    pub fn new(regen: HeightBand, ct: HeightBand) -> Result<Self> {
        regen.validate("regen band")?;
        ct.validate("commercial thin band")?;
        Ok(ZonalAggregator { regen, ct })
    }

    pub fn regen(&self) -> &HeightBand {
        &self.regen
    }

    pub fn ct(&self) -> &HeightBand {
        &self.ct
    }

    /// One summary per stand, in stand order.
    ///
    /// Counts use the band-selected points; height statistics use every point
    /// inside the stand.
    pub fn summarize(
        &self,
        points: &[TreePoint],
        stands: &StandCollection,
    ) -> Result<Vec<StandSummary>> {
        info!(
            "Summarizing {} tree tops over {} stands",
            points.len(),
            stands.len()
        );

        let regen_points = select_band(points, &self.regen);
        let ct_points = select_band(points, &self.ct);
        debug!(
            "{} regen and {} commercial thin tree tops",
            regen_points.len(),
            ct_points.len()
        );

        let regen_counts = count_by_stand(&regen_points, stands);
        let ct_counts = count_by_stand(&ct_points, stands);

        let index = PointIndex::new(points);

        #[cfg(feature = "indicatif")]
        let pb = {
            let pb = ProgressBar::new(stands.len() as u64);
            pb.set_style(progress_style());
            pb.set_message("Stands");
            pb
        };

        let rows: Vec<Result<StandSummary>> = stands
            .stands()
            .par_iter()
            .zip(regen_counts.par_iter().zip(ct_counts.par_iter()))
            .map(|(stand, (&regen_count, &ct_count))| {
                let row = self.summarize_stand(stand, points, &index, regen_count, ct_count);
                #[cfg(feature = "indicatif")]
                pb.inc(1);
                row
            })
            .collect();

        #[cfg(feature = "indicatif")]
        pb.finish_with_message("Stands summarized");

        rows.into_iter().collect()
    }

    fn summarize_stand(
        &self,
        stand: &Stand,
        points: &[TreePoint],
        index: &PointIndex,
        regen_count: usize,
        ct_count: usize,
    ) -> Result<StandSummary> {
        let heights: Vec<f64> = index
            .within(points, &stand.geometry)
            .into_iter()
            .map(|i| points[i].height)
            .collect();
        let stats = height_statistics(&heights);
        if stats.is_none() {
            warn!("Stand {} contains no tree tops", stand.setting_id);
        }

        Ok(StandSummary {
            setting_id: stand.setting_id.clone(),
            acres: stand.acres,
            regen_count,
            regen_tpa: density(regen_count, stand.acres, &stand.setting_id)?,
            ct_count,
            ct_tpa: density(ct_count, stand.acres, &stand.setting_id)?,
            min_height: stats.map(|s| s.min),
            max_height: stats.map(|s| s.max),
            mean_height: stats.map(|s| s.mean),
            median_height: stats.map(|s| s.median),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Point};

    fn tree(id: u32, x: f64, y: f64, height: f64) -> TreePoint {
        TreePoint {
            id,
            row: 0,
            col: 0,
            location: Point::new(x, y),
            height,
        }
    }

    fn square_stand(id: &str, min: f64, max: f64, acres: f64) -> Stand {
        let geometry = MultiPolygon::new(vec![polygon![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
        ]]);
        Stand::new(id, geometry, acres).unwrap()
    }

    #[test]
    fn test_select_band_inclusive() {
        let points = vec![
            tree(1, 0.0, 0.0, 4.99),
            tree(2, 0.0, 0.0, 5.0),
            tree(3, 0.0, 0.0, 20.0),
            tree(4, 0.0, 0.0, 20.01),
        ];
        let band = HeightBand::new(5.0, Some(20.0)).unwrap();
        let ids: Vec<u32> = select_band(&points, &band).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3]);

        let open = HeightBand::new(20.0, None).unwrap();
        assert_eq!(select_band(&points, &open).len(), 2);
    }

    #[test]
    fn test_band_max_below_min() {
        assert!(HeightBand::new(10.0, Some(5.0)).unwrap_err().is_configuration());
    }

    #[test]
    fn test_density() {
        assert_eq!(density(10, 3.0, "S").unwrap(), 3.33);
        assert_eq!(density(0, 3.0, "S").unwrap(), 0.0);
        assert_eq!(density(1, 8.0, "S").unwrap(), 0.13);
        let err = density(4, 0.0, "S-1").unwrap_err();
        assert!(matches!(err, TreeTopError::ZeroArea { .. }));
        assert!(err.to_string().contains("S-1"));
    }

    #[test]
    fn test_height_statistics() {
        let stats = height_statistics(&[12.0, 8.0, 20.0, 16.0]).unwrap();
        assert_eq!(stats.median, 14.0);
        assert_eq!(stats.min, 8.0);
        assert_eq!(stats.max, 20.0);
        assert_eq!(stats.mean, 14.0);
        assert_eq!(height_statistics(&[5.0, 9.0, 7.0]).unwrap().median, 7.0);
        assert_eq!(height_statistics(&[]), None);
        assert_eq!(height_statistics(&[10.0, 10.0, 11.0]).unwrap().mean, 10.33);
    }

    #[test]
    fn test_boundary_points_belong_to_no_stand() {
        let points = vec![tree(1, 5.0, 0.0, 12.0), tree(2, 5.0, 5.0, 12.0)];
        let stands = StandCollection::new(vec![square_stand("A", 0.0, 10.0, 1.0)]).unwrap();
        assert_eq!(count_by_stand(&points, &stands), vec![1]);
    }

    #[test]
    fn test_count_by_stand_coerces_missing_to_zero() {
        let points = vec![tree(1, 1.0, 1.0, 12.0), tree(2, 2.0, 2.0, 12.0)];
        let stands = StandCollection::new(vec![
            square_stand("A", 0.0, 10.0, 1.0),
            square_stand("B", 20.0, 30.0, 1.0),
        ])
        .unwrap();
        assert_eq!(count_by_stand(&points, &stands), vec![2, 0]);
        assert_eq!(count_by_stand(&[], &stands), vec![0, 0]);
    }

    #[test]
    fn test_summarize_bands_and_statistics() {
        let points = vec![
            tree(1, 1.0, 1.0, 3.0),
            tree(2, 2.0, 2.0, 8.0),
            tree(3, 3.0, 3.0, 30.0),
            tree(4, 4.0, 4.0, 45.0),
            // outside every stand
            tree(5, 50.0, 50.0, 30.0),
        ];
        let stands = StandCollection::new(vec![
            square_stand("A", 0.0, 10.0, 2.0),
            square_stand("B", 20.0, 30.0, 4.0),
        ])
        .unwrap();
        let aggregator = ZonalAggregator::new(
            HeightBand::new(2.0, Some(10.0)).unwrap(),
            HeightBand::new(25.0, None).unwrap(),
        )
        .unwrap();

        let rows = aggregator.summarize(&points, &stands).unwrap();
        assert_eq!(rows.len(), 2);

        let a = &rows[0];
        assert_eq!(a.setting_id, "A");
        assert_eq!((a.regen_count, a.regen_tpa), (2, 1.0));
        assert_eq!((a.ct_count, a.ct_tpa), (2, 1.0));
        assert_eq!(a.min_height, Some(3.0));
        assert_eq!(a.max_height, Some(45.0));
        assert_eq!(a.mean_height, Some(21.5));
        assert_eq!(a.median_height, Some(19.0));

        let b = &rows[1];
        assert_eq!((b.regen_count, b.regen_tpa, b.ct_count, b.ct_tpa), (0, 0.0, 0, 0.0));
        assert_eq!(b.statistics(), None);
        assert_eq!(b.min_height, None);
    }

    #[test]
    fn test_summarize_zero_area_fails() {
        let stands = StandCollection::new(vec![square_stand("Z", 0.0, 10.0, 0.0)]).unwrap();
        let aggregator = ZonalAggregator::new(
            HeightBand::new(0.0, None).unwrap(),
            HeightBand::new(0.0, None).unwrap(),
        )
        .unwrap();
        let err = aggregator.summarize(&[], &stands).unwrap_err();
        assert!(matches!(err, TreeTopError::ZeroArea { .. }));
    }
}
