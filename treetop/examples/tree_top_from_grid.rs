// Example: tree tops and canopy segmentation from an in-memory height grid
use anyhow::Result;
use treetop::geometric::height_grid::HeightGrid;
use treetop::geometric::tree_top::TreeTop;
use treetop::PipelineConfig;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Example: TreeTop from a synthetic canopy height model ===\n");

    // 40 x 40 cells of 1 m with three crowns (heights in metres)
    let (rows, cols) = (40, 40);
    let crowns = [(10.0, 12.0, 18.0), (25.0, 28.0, 24.0), (30.0, 8.0, 9.0)];
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let h = crowns
                .iter()
                .map(|&(cr, cc, top)| {
                    let d = ((row as f64 - cr).powi(2) + (col as f64 - cc).powi(2)).sqrt();
                    (top - d * 1.5_f64).max(0.0)
                })
                .fold(0.0, f64::max);
            data.push(h);
        }
    }
    let grid = HeightGrid::new(rows, cols, data)?
        .with_georeference(500_000.0, 4_100_040.0, 1.0)?
        .with_epsg(26911);

    let config = PipelineConfig::from_json_str(
        r#"{
            "smooth": true,
            "convertMetersToFeet": true,
            "minTreeHeightFt": 15.0,
            "regenMin": 1.0,
            "regenMax": 15.0,
            "ctMin": 40.0
        }"#,
    )?;

    let mut tree_top = TreeTop::new(Some("./output".to_string()), &config, None)?;
    tree_top.set_height_grid(grid);

    println!("Detecting tree tops...");
    let tree_top = tree_top.run()?;

    if let Some(detection) = tree_top.get_detection() {
        println!("  - Tree tops: {}", detection.points.len());
        for p in detection.points.iter().take(5) {
            println!(
                "    #{} at ({:.1}, {:.1}) height {:.2} ft",
                p.id,
                p.location.x(),
                p.location.y(),
                p.height
            );
        }
    }

    println!("\nSaving to GeoJSON...");
    let path = tree_top.to_geojson(None)?;
    println!("  - Output file: {:?}", path);

    Ok(())
}
