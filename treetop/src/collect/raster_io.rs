//! GeoTIFF import of canopy height models and export of derived grids.

use std::path::Path;

use anyhow::{Context, Result};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use log::info;

use crate::collect::global_variables::RASTER_NODATA;
use crate::geometric::height_grid::{GridGeometry, HeightGrid};
use crate::geometric::tree_detector::SegmentationGrid;

/// Read band 1 of a north-up raster as a height grid.
///
/// The band's nodata value becomes nodata; rotated rasters and non-square
/// cells are rejected.
pub fn read_height_grid<P: AsRef<Path>>(path: P) -> Result<HeightGrid> {
    let path = path.as_ref();
    let dataset =
        Dataset::open(path).with_context(|| format!("Failed to open raster {:?}", path))?;
    let (width, height) = dataset.raster_size();
    let gt = dataset.geo_transform().context("Raster has no geotransform")?;

    if gt[2] != 0.0 || gt[4] != 0.0 {
        anyhow::bail!("Rotated rasters are not supported: {:?}", path);
    }
    if (gt[1] - gt[5].abs()).abs() > 1e-9 * gt[1].abs() {
        anyhow::bail!(
            "Raster cells must be square, got {} x {}",
            gt[1],
            gt[5].abs()
        );
    }

    let band = dataset.rasterband(1).context("Failed to get band 1")?;
    let nodata = band.no_data_value();
    let buffer = band
        .read_as::<f64>((0, 0), (width, height), (width, height), None)
        .context("Failed to read band 1")?;

    let epsg = dataset
        .spatial_ref()
        .ok()
        .and_then(|srs| srs.auth_code().ok());

    let geometry = GridGeometry {
        rows: height,
        cols: width,
        origin_x: gt[0],
        origin_y: gt[3],
        cell_size: gt[1],
        epsg,
    };
    let grid = HeightGrid::from_parts(geometry, apply_nodata(buffer.data(), nodata))?;
    info!(
        "Read {}x{} height grid from {:?} ({} valid cells)",
        height,
        width,
        path,
        grid.valid_count()
    );
    Ok(grid)
}

fn apply_nodata(data: &[f64], nodata: Option<f64>) -> Vec<f64> {
    match nodata {
        Some(sentinel) if !sentinel.is_nan() => data
            .iter()
            .map(|&v| if v == sentinel { f64::NAN } else { v })
            .collect(),
        _ => data.to_vec(),
    }
}

fn write_band<P: AsRef<Path>>(path: P, geometry: &GridGeometry, data: Vec<f64>) -> Result<()> {
    let path = path.as_ref();
    let driver =
        DriverManager::get_driver_by_name("GTiff").context("Failed to get GTiff driver")?;
    let mut dataset = driver
        .create_with_band_type::<f64, _>(path, geometry.cols, geometry.rows, 1)
        .with_context(|| format!("Failed to create GeoTIFF {:?}", path))?;

    let transform = [
        geometry.origin_x,
        geometry.cell_size,
        0.0,
        geometry.origin_y,
        0.0,
        -geometry.cell_size,
    ];
    dataset
        .set_geo_transform(&transform)
        .context("Failed to set geotransform")?;

    if let Some(epsg) = geometry.epsg {
        let srs = SpatialRef::from_epsg(epsg as u32)
            .context("Failed to create spatial reference")?;
        dataset
            .set_spatial_ref(&srs)
            .context("Failed to set spatial reference")?;
    }

    let mut band = dataset.rasterband(1).context("Failed to get band 1")?;
    let mut buffer = Buffer::new((geometry.cols, geometry.rows), data);
    band.write((0, 0), (geometry.cols, geometry.rows), &mut buffer)
        .context("Failed to write band 1")?;
    band.set_no_data_value(Some(RASTER_NODATA))
        .context("Failed to set no data value")?;

    info!("Raster saved to: {:?}", path);
    Ok(())
}

/// Write a height grid as a single-band Float64 GeoTIFF
pub fn write_height_grid<P: AsRef<Path>>(path: P, grid: &HeightGrid) -> Result<()> {
    write_band(path, grid.geometry(), grid.to_vec_with_nodata(RASTER_NODATA))
}

/// Write the tree-id grid; unlabeled cells are nodata
pub fn write_segmentation<P: AsRef<Path>>(path: P, segmentation: &SegmentationGrid) -> Result<()> {
    write_band(
        path,
        segmentation.geometry(),
        segmentation.to_vec_with_nodata(RASTER_NODATA),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_nodata() {
        let out = apply_nodata(&[1.0, -9999.0, 3.0], Some(-9999.0));
        assert!(out[1].is_nan());
        assert_eq!(out[2], 3.0);
        assert_eq!(apply_nodata(&[1.0], None), vec![1.0]);
    }

    #[test]
    fn test_write_then_read_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chm.tif");
        let grid = HeightGrid::new(2, 3, vec![1.0, f64::NAN, 3.0, 4.0, 5.0, 6.0])
            .unwrap()
            .with_georeference(500_000.0, 4_000_000.0, 1.0)
            .unwrap();
        write_height_grid(&path, &grid).unwrap();

        let back = read_height_grid(&path).unwrap();
        assert_eq!(back.shape(), grid.shape());
        assert_eq!(back.extent(), grid.extent());
        assert_eq!(back.get(0, 1), None);
        assert_eq!(back.get(1, 2), Some(6.0));
    }
}
