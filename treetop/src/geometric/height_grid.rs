//! Canopy height grid with nodata semantics.
//!
//! Cells are stored row-major with the origin at the top-left corner:
//!   x = origin_x + (col + 0.5) * cell_size
//!   y = origin_y - (row + 0.5) * cell_size
//! Nodata is stored as NaN and never leaks out of the public API: accessors
//! return `Option<f64>`.

use geo::{Intersects, MultiPolygon, Point};

use crate::commons::maybe_rayon::*;
use crate::error::{Result, TreeTopError};
use crate::geo_core::BoundingBox;

/// Shape and georeference shared by every grid derived from one input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub rows: usize,
    pub cols: usize,
    /// X of the left edge
    pub origin_x: f64,
    /// Y of the top edge
    pub origin_y: f64,
    /// Square cell side in CRS units
    pub cell_size: f64,
    pub epsg: Option<i32>,
}

impl GridGeometry {
    /// Unit cells with the origin placed so the grid covers (0, 0)..(cols, rows)
    pub fn new(rows: usize, cols: usize) -> Self {
        GridGeometry {
            rows,
            cols,
            origin_x: 0.0,
            origin_y: rows as f64,
            cell_size: 1.0,
            epsg: None,
        }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Cell centre in CRS coordinates
    pub fn cell_center(&self, row: usize, col: usize) -> Point<f64> {
        Point::new(
            self.origin_x + (col as f64 + 0.5) * self.cell_size,
            self.origin_y - (row as f64 + 0.5) * self.cell_size,
        )
    }

    /// Cell containing (x, y), `None` outside the extent
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.origin_x) / self.cell_size).floor();
        let row = ((self.origin_y - y) / self.cell_size).floor();
        if col < 0.0 || row < 0.0 || col >= self.cols as f64 || row >= self.rows as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }

    pub fn extent(&self) -> BoundingBox {
        BoundingBox::new(
            self.origin_x,
            self.origin_y - self.rows as f64 * self.cell_size,
            self.origin_x + self.cols as f64 * self.cell_size,
            self.origin_y,
        )
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.len() {
            return Err(TreeTopError::InvalidDimensions {
                rows: self.rows,
                cols: self.cols,
                len,
            });
        }
        Ok(())
    }

    pub(crate) fn check_same_shape(&self, other: &GridGeometry) -> Result<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(TreeTopError::SizeMismatch {
                er: self.rows,
                ec: self.cols,
                ar: other.rows,
                ac: other.cols,
            });
        }
        Ok(())
    }
}

/// Immutable canopy height raster
///
/// Every transformation returns a new grid with the same [`GridGeometry`].
#[derive(Debug, Clone)]
pub struct HeightGrid {
    geometry: GridGeometry,
    data: Vec<f64>,
}

impl HeightGrid {
    /// Create a grid from row-major heights. NaN and infinite values are nodata.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        Self::from_parts(GridGeometry::new(rows, cols), data)
    }

    /// Create a grid from row-major values using an external nodata sentinel
    pub fn from_vec_with_nodata(
        rows: usize,
        cols: usize,
        data: Vec<f64>,
        nodata: Option<f64>,
    ) -> Result<Self> {
        let data = match nodata {
            Some(sentinel) if !sentinel.is_nan() => data
                .into_iter()
                .map(|v| if v == sentinel { f64::NAN } else { v })
                .collect(),
            _ => data,
        };
        Self::new(rows, cols, data)
    }

    /// Create a grid with given geometry and row-major heights
    pub fn from_parts(geometry: GridGeometry, data: Vec<f64>) -> Result<Self> {
        geometry.check_len(data.len())?;
        if !(geometry.cell_size.is_finite() && geometry.cell_size > 0.0) {
            return Err(TreeTopError::InvalidParameter {
                name: "cell_size",
                value: geometry.cell_size.to_string(),
                reason: "must be a positive finite number".to_string(),
            });
        }
        let data = data
            .into_iter()
            .map(|v| if v.is_finite() { v } else { f64::NAN })
            .collect();
        Ok(HeightGrid { geometry, data })
    }

    /// Create a grid filled with a constant height
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        let value = if value.is_finite() { value } else { f64::NAN };
        HeightGrid {
            geometry: GridGeometry::new(rows, cols),
            data: vec![value; rows * cols],
        }
    }

    /// Create an all-nodata grid with the given geometry
    pub fn nodata_like(geometry: GridGeometry) -> Self {
        HeightGrid {
            geometry,
            data: vec![f64::NAN; geometry.len()],
        }
    }

    /// Place the grid: top-left corner and square cell size
    pub fn with_georeference(mut self, origin_x: f64, origin_y: f64, cell_size: f64) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(TreeTopError::InvalidParameter {
                name: "cell_size",
                value: cell_size.to_string(),
                reason: "must be a positive finite number".to_string(),
            });
        }
        self.geometry.origin_x = origin_x;
        self.geometry.origin_y = origin_y;
        self.geometry.cell_size = cell_size;
        Ok(self)
    }

    pub fn with_epsg(mut self, epsg: i32) -> Self {
        self.geometry.epsg = Some(epsg);
        self
    }

    /// New grid with this grid's geometry; `data` must be row-major and complete
    pub(crate) fn derive(&self, data: Vec<f64>) -> HeightGrid {
        debug_assert_eq!(data.len(), self.data.len());
        HeightGrid {
            geometry: self.geometry,
            data,
        }
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn rows(&self) -> usize {
        self.geometry.rows
    }

    pub fn cols(&self) -> usize {
        self.geometry.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.geometry.rows, self.geometry.cols)
    }

    pub fn cell_size(&self) -> f64 {
        self.geometry.cell_size
    }

    pub fn extent(&self) -> BoundingBox {
        self.geometry.extent()
    }

    pub fn epsg(&self) -> Option<i32> {
        self.geometry.epsg
    }

    /// Height at (row, col); `None` for nodata or out of bounds
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.geometry.rows && col < self.geometry.cols {
            let v = self.data[self.geometry.index(row, col)];
            if v.is_nan() {
                None
            } else {
                Some(v)
            }
        } else {
            None
        }
    }

    /// Raw row-major cells, nodata as NaN
    pub(crate) fn raw(&self) -> &[f64] {
        &self.data
    }

    /// Row-major values with nodata replaced by `nodata`, for export
    pub fn to_vec_with_nodata(&self, nodata: f64) -> Vec<f64> {
        self.data
            .iter()
            .map(|v| if v.is_nan() { nodata } else { *v })
            .collect()
    }

    /// Valid cells in row-major order as (row, col, height)
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let cols = self.geometry.cols;
        self.data
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .map(move |(i, v)| (i / cols, i % cols, *v))
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    pub fn is_all_nodata(&self) -> bool {
        self.data.iter().all(|v| v.is_nan())
    }

    pub fn cell_center(&self, row: usize, col: usize) -> Point<f64> {
        self.geometry.cell_center(row, col)
    }

    /// True when both grids share extent and cell size
    pub fn same_geometry(&self, other: &HeightGrid) -> bool {
        self.geometry == other.geometry
    }

    /// Masked view: cells whose centre is outside `boundary` become nodata.
    ///
    /// Centres on the boundary line are kept. Masking twice with the same
    /// boundary returns an identical grid.
    pub fn masked(&self, boundary: &MultiPolygon<f64>) -> HeightGrid {
        let geometry = self.geometry;
        let bbox = BoundingBox::of(&geo::Geometry::MultiPolygon(boundary.clone()));

        let rows: Vec<Vec<f64>> = (0..geometry.rows)
            .into_par_iter()
            .map(|row| {
                (0..geometry.cols)
                    .map(|col| {
                        let v = self.data[geometry.index(row, col)];
                        if v.is_nan() {
                            return f64::NAN;
                        }
                        let center = geometry.cell_center(row, col);
                        let inside = bbox
                            .map(|b| b.contains_point(center.x(), center.y()))
                            .unwrap_or(false)
                            && boundary.intersects(&center);
                        if inside {
                            v
                        } else {
                            f64::NAN
                        }
                    })
                    .collect::<Vec<f64>>()
            })
            .collect();

        self.derive(rows.into_iter().flatten().collect())
    }

    /// Apply `f` to every valid cell; nodata stays nodata and non-finite
    /// results become nodata
    pub fn map_valid<F: Fn(f64) -> f64>(&self, f: F) -> HeightGrid {
        let data = self
            .data
            .iter()
            .map(|&v| {
                if v.is_nan() {
                    v
                } else {
                    let out = f(v);
                    if out.is_finite() {
                        out
                    } else {
                        f64::NAN
                    }
                }
            })
            .collect();
        self.derive(data)
    }

    /// Multiply every valid cell by a linear factor (unit conversion)
    pub fn scaled(&self, factor: f64) -> HeightGrid {
        self.map_valid(|v| v * factor)
    }
}
