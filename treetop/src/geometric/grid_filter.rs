//! Windowed (focal) operators over a [`HeightGrid`].
//!
//! Every operator returns a new grid with the input's geometry. Windows that
//! reach past the grid edge only see the in-bounds cells; nodata cells are
//! ignored, and a window with no valid cell yields nodata.

use crate::commons::basic_functions::{percentile_sorted, sort_values};
use crate::commons::maybe_rayon::*;
use crate::error::{Result, TreeTopError};
use crate::geometric::height_grid::HeightGrid;

/// Rectangular window of `width` x `height` cells, both odd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    width: usize,
    height: usize,
}

impl Window {
    /// 3x3 smoothing window
    pub const SMOOTH: Window = Window {
        width: 3,
        height: 3,
    };

    /// 5x5 local maximum window
    pub const LOCAL_MAX: Window = Window {
        width: 5,
        height: 5,
    };

    pub fn new(width: usize, height: usize) -> Result<Self> {
        for (name, size) in [("window width", width), ("window height", height)] {
            if size == 0 || size % 2 == 0 {
                return Err(TreeTopError::InvalidParameter {
                    name,
                    value: size.to_string(),
                    reason: "must be an odd number of cells".to_string(),
                });
            }
        }
        Ok(Window { width, height })
    }

    pub fn square(size: usize) -> Result<Self> {
        Self::new(size, size)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> usize {
        self.width * self.height
    }
}

/// Statistic computed over a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocalStatistic {
    /// Arithmetic mean
    Mean,
    /// Maximum value
    Maximum,
    /// Percentile (0-100) by rounded rank; 100 is the maximum
    Percentile(f64),
}

impl FocalStatistic {
    fn validate(&self) -> Result<()> {
        if let FocalStatistic::Percentile(p) = *self {
            if !(0.0..=100.0).contains(&p) {
                return Err(TreeTopError::InvalidParameter {
                    name: "percentile",
                    value: p.to_string(),
                    reason: "must be between 0 and 100".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Statistic of a non-empty buffer; the buffer may be reordered
    fn compute(&self, values: &mut [f64]) -> f64 {
        match *self {
            FocalStatistic::Mean => values.iter().sum::<f64>() / values.len() as f64,
            FocalStatistic::Maximum => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            FocalStatistic::Percentile(p) => {
                sort_values(values);
                percentile_sorted(values, p).unwrap_or(f64::NAN)
            }
        }
    }
}

/// Compute `statistic` over `window` centred on every cell.
///
/// Rows are processed in parallel with the `rayon` feature; the output does
/// not depend on the thread count.
pub fn focal_statistics(
    grid: &HeightGrid,
    window: Window,
    statistic: FocalStatistic,
) -> Result<HeightGrid> {
    statistic.validate()?;

    let (rows, cols) = grid.shape();
    let raw = grid.raw();
    let half_h = (window.height / 2) as isize;
    let half_w = (window.width / 2) as isize;

    let out_rows: Vec<Vec<f64>> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut values: Vec<f64> = Vec::with_capacity(window.cells());

            for (col, out) in row_data.iter_mut().enumerate() {
                values.clear();
                for dr in -half_h..=half_h {
                    let nr = row as isize + dr;
                    if nr < 0 || nr as usize >= rows {
                        continue;
                    }
                    for dc in -half_w..=half_w {
                        let nc = col as isize + dc;
                        if nc < 0 || nc as usize >= cols {
                            continue;
                        }
                        let v = raw[nr as usize * cols + nc as usize];
                        if !v.is_nan() {
                            values.push(v);
                        }
                    }
                }

                if !values.is_empty() {
                    *out = statistic.compute(&mut values);
                }
            }

            row_data
        })
        .collect();

    Ok(grid.derive(out_rows.into_iter().flatten().collect()))
}

/// Percentile smoothing (default 90th over 3x3 in the detector)
pub fn smooth(grid: &HeightGrid, window: Window, percentile: f64) -> Result<HeightGrid> {
    focal_statistics(grid, window, FocalStatistic::Percentile(percentile))
}

/// Per-cell window extremum, e.g. the local maximum used for tree-top search
pub fn local_extreme(
    grid: &HeightGrid,
    window: Window,
    statistic: FocalStatistic,
) -> Result<HeightGrid> {
    focal_statistics(grid, window, statistic)
}

/// Cells failing `predicate` become nodata; others pass through unchanged
pub fn threshold<P: Fn(f64) -> bool>(grid: &HeightGrid, predicate: P) -> HeightGrid {
    let data = grid
        .raw()
        .iter()
        .map(|&v| if !v.is_nan() && predicate(v) { v } else { f64::NAN })
        .collect();
    grid.derive(data)
}

/// Cells below `min_height` become nodata
pub fn threshold_min(grid: &HeightGrid, min_height: f64) -> HeightGrid {
    threshold(grid, |v| v >= min_height)
}

/// Keep the cells of `values` that are valid in both grids and exactly equal
/// to `reference`; everything else becomes nodata
pub fn keep_where_equal(values: &HeightGrid, reference: &HeightGrid) -> Result<HeightGrid> {
    values.geometry().check_same_shape(reference.geometry())?;
    let data = values
        .raw()
        .iter()
        .zip(reference.raw().iter())
        .map(|(&v, &r)| if !v.is_nan() && v == r { v } else { f64::NAN })
        .collect();
    Ok(values.derive(data))
}
