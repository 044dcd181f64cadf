use geo::{polygon, MultiPolygon};
use treetop::geometric::grid_filter::{local_extreme, FocalStatistic, Window};
use treetop::{
    HeightBand, HeightGrid, LidarSummary, PipelineConfig, Stand, StandCollection, TreeTop,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: min_x, y: min_y),
        (x: max_x, y: min_y),
        (x: max_x, y: max_y),
        (x: min_x, y: max_y),
    ]])
}

fn plain_config(min_height: f64) -> PipelineConfig {
    PipelineConfig::new(
        min_height,
        HeightBand { min: 0.0, max: Some(12.0) },
        HeightBand { min: 12.0, max: None },
    )
}

#[test]
fn constant_grid_yields_one_point_per_cell() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let out = Some(dir.path().to_string_lossy().to_string());

    let mut tree_top = TreeTop::new(out.clone(), &plain_config(10.0), None).unwrap();
    tree_top.set_height_grid(HeightGrid::filled(10, 10, 15.0));
    let tree_top = tree_top.run().unwrap();
    let detection = tree_top.get_detection().unwrap();
    assert_eq!(detection.points.len(), 100);
    assert!(detection.points.iter().all(|p| p.height == 15.0));
    assert_eq!(detection.segmentation.labeled_count(), 100);
}

#[test]
fn tree_tops_flow_into_stand_summary_through_files() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let out = Some(dir.path().to_string_lossy().to_string());
    let config = plain_config(5.0);

    // two separated peaks on a 10 x 10 unit grid
    let mut data = vec![1.0; 100];
    data[2 * 10 + 2] = 20.0;
    data[7 * 10 + 7] = 8.0;
    let grid = HeightGrid::new(10, 10, data).unwrap();

    let mut tree_top = TreeTop::new(out.clone(), &config, None).unwrap();
    tree_top.set_height_grid(grid);
    let tree_top = tree_top.run().unwrap();
    let points_path = tree_top.to_geojson(None).unwrap();
    assert_eq!(tree_top.get_detection().unwrap().points.len(), 2);

    // (2,2) has its centre at (2.5, 7.5); (7,7) at (7.5, 2.5)
    let stands = StandCollection::new(vec![
        Stand::new("north", square(0.0, 5.0, 5.0, 10.0), 1.0).unwrap(),
        Stand::new("south", square(5.0, 0.0, 10.0, 5.0), 4.0).unwrap(),
        Stand::new("empty", square(20.0, 20.0, 30.0, 30.0), 2.0).unwrap(),
    ])
    .unwrap();

    let mut summary = LidarSummary::new(out, &config, None).unwrap();
    summary.load_points_geojson(&points_path).unwrap();
    summary.set_stands(stands);
    let summary = summary.run().unwrap();
    let rows = summary.get_summaries().unwrap();

    assert_eq!(rows[0].setting_id, "north");
    assert_eq!((rows[0].regen_count, rows[0].ct_count), (0, 1));
    assert_eq!(rows[0].ct_tpa, 1.0);
    assert_eq!(rows[0].max_height, Some(20.0));

    assert_eq!((rows[1].regen_count, rows[1].ct_count), (1, 0));
    assert_eq!(rows[1].regen_tpa, 0.25);
    assert_eq!(rows[1].median_height, Some(8.0));

    assert_eq!((rows[2].regen_count, rows[2].regen_tpa), (0, 0.0));
    assert_eq!((rows[2].ct_count, rows[2].ct_tpa), (0, 0.0));
    assert_eq!(rows[2].statistics(), None);

    let written = summary.to_geojson(None).unwrap();
    let text = std::fs::read_to_string(written).unwrap();
    assert!(text.contains("\"MinHeight\":null"));
}

#[test]
fn masked_out_grid_gives_empty_outputs() {
    init_logger();
    let mut tree_top = TreeTop::new(None, &plain_config(0.0), None).unwrap();
    tree_top.set_height_grid(HeightGrid::filled(5, 5, 30.0));
    // boundary far away from the grid extent
    tree_top
        .set_boundary(square(100.0, 100.0, 110.0, 110.0))
        .unwrap();
    let tree_top = tree_top.run().unwrap();
    let detection = tree_top.get_detection().unwrap();
    assert!(detection.points.is_empty());
    assert!(detection.segmentation.is_all_nodata());
    assert!(detection.height_grid.is_all_nodata());
}

#[test]
fn local_maximum_dominates_input_after_masking() {
    let data: Vec<f64> = (0..144).map(|i| ((i * 29) % 17) as f64 * 0.7).collect();
    let grid = HeightGrid::new(12, 12, data).unwrap();
    let boundary = MultiPolygon::new(vec![polygon![
        (x: 1.0, y: 1.0),
        (x: 11.0, y: 2.5),
        (x: 6.0, y: 11.0),
    ]]);
    let masked = grid.masked(&boundary);
    let max = local_extreme(&masked, Window::LOCAL_MAX, FocalStatistic::Maximum).unwrap();
    for (row, col, v) in masked.iter_valid() {
        assert!(max.get(row, col).unwrap() >= v);
    }
    let again = masked.masked(&boundary);
    assert_eq!(masked.to_vec_with_nodata(-1.0), again.to_vec_with_nodata(-1.0));
}

#[test]
fn config_from_text_drives_both_tools() {
    let config = PipelineConfig::from_text_params([
        ("smooth", "false"),
        ("convertMetersToFeet", "true"),
        ("minTreeHeightFt", "30"),
        ("regenMin", "1"),
        ("regenMax", "15"),
        ("ctMin", "30"),
    ])
    .unwrap();

    // 10 m is 32.81 ft, above the 30 ft minimum
    let mut tree_top = TreeTop::new(None, &config, None).unwrap();
    tree_top.set_height_grid(HeightGrid::filled(3, 3, 10.0));
    let tree_top = tree_top.run().unwrap();
    let detection = tree_top.get_detection().unwrap();
    assert_eq!(detection.points.len(), 9);
    assert!(detection.points.iter().all(|p| (p.height - 32.81).abs() < 1e-9));

    let mut summary = LidarSummary::new(None, &config, None).unwrap();
    summary.set_points(detection.points.clone());
    summary.set_stands(
        StandCollection::new(vec![Stand::new("all", square(-1.0, -1.0, 4.0, 4.0), 3.0).unwrap()])
            .unwrap(),
    );
    let summary = summary.run().unwrap();
    let row = &summary.get_summaries().unwrap()[0];
    assert_eq!((row.regen_count, row.ct_count, row.ct_tpa), (0, 9, 3.0));
    assert_eq!(row.mean_height, Some(32.81));
}
