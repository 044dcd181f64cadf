// Example: per-stand regen / commercial thin summary from GeoJSON stands
use anyhow::Result;
use treetop::geometric::lidar_summary::LidarSummary;
use treetop::geometric::stand::StandCollection;
use treetop::geometric::tree_detector::TreePoint;
use treetop::{GeoCore, PipelineConfig};

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Example: LidarSummary from GeoJSON stands ===\n");

    let stands_geojson = r#"
    {
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "SETTING_ID": "0101", "Acres": 2.47 },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 0], [100, 0], [100, 100], [0, 100], [0, 0]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "SETTING_ID": 102 },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[100, 0], [200, 0], [200, 100], [100, 100], [100, 0]]]
                }
            }
        ]
    }"#;

    let config = PipelineConfig::from_text_params([
        ("minTreeHeightFt", "6"),
        ("regenMin", "1"),
        ("regenMax", "15"),
        ("ctMin", "40"),
        ("ctMax", ""),
    ])?;

    let mut summary = LidarSummary::new(Some("./output".to_string()), &config, Some(26911))?;
    summary.set_stands(StandCollection::from_geojson_str(stands_geojson, &GeoCore::new(26911))?);

    // A loose grid of tree tops across the first stand; the second has none
    let points: Vec<TreePoint> = (0..25)
        .map(|i| TreePoint {
            id: i + 1,
            row: (i / 5) as usize,
            col: (i % 5) as usize,
            location: geo::Point::new(10.0 + 20.0 * (i % 5) as f64, 10.0 + 20.0 * (i / 5) as f64),
            height: 5.0 + 3.0 * i as f64,
        })
        .collect();
    summary.set_points(points);

    let summary = summary.run()?;
    for row in summary.get_summaries().unwrap_or_default() {
        println!(
            "  - {}: regen {} ({} TPA), CT {} ({} TPA), median {:?}",
            row.setting_id, row.regen_count, row.regen_tpa, row.ct_count, row.ct_tpa, row.median_height
        );
    }

    summary.to_geojson(None)?;
    summary.to_csv(None)?;
    let df = summary.to_polars_df()?;
    println!("\n{}", df);

    Ok(())
}
