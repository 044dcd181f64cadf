//! GeoJSON reading and writing for boundaries, tree tops and stand tables.

use std::collections::HashMap;
use std::path::Path;

use geo::{Geometry as GeoGeometry, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};

use crate::collect::global_variables::{COL_FIELD, HEIGHT_FIELD, ROW_FIELD, TREE_ID_FIELD};
use crate::error::{Result, TreeTopError};
use crate::geo_core::polygonal;
use crate::geometric::stand::StandCollection;
use crate::geometric::tree_detector::TreePoint;
use crate::geometric::zonal::StandSummary;

fn features_of(geojson: GeoJson) -> Vec<Feature> {
    match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    }
}

fn to_geo(entity: &str, geometry: &geojson::Geometry) -> Result<GeoGeometry<f64>> {
    geometry
        .try_into()
        .map_err(|e| TreeTopError::geometry(entity, format!("{}", e)))
}

/// Mask boundary from a GeoJSON geometry, feature or collection.
///
/// Every feature must be polygonal; all polygons together form the mask.
pub fn boundary_from_geojson(text: &str) -> Result<MultiPolygon<f64>> {
    let geojson: GeoJson = text.parse()?;
    let mut polygons = Vec::new();

    for (i, feature) in features_of(geojson).iter().enumerate() {
        let entity = format!("boundary feature #{}", i);
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| TreeTopError::geometry(&entity, "missing geometry"))?;
        let multi = polygonal(&entity, to_geo(&entity, geometry)?)?;
        polygons.extend(multi.0);
    }

    if polygons.is_empty() {
        return Err(TreeTopError::geometry("boundary", "no polygon features"));
    }
    Ok(MultiPolygon::new(polygons))
}

/// Tree tops as Point features with `TreeId`, `Height`, `Row` and `Col`
pub fn tree_points_to_geojson(points: &[TreePoint]) -> GeoJson {
    let features = points
        .iter()
        .map(|p| {
            let mut properties = JsonObject::new();
            properties.insert(TREE_ID_FIELD.to_string(), JsonValue::from(p.id));
            properties.insert(HEIGHT_FIELD.to_string(), JsonValue::from(p.height));
            properties.insert(ROW_FIELD.to_string(), JsonValue::from(p.row));
            properties.insert(COL_FIELD.to_string(), JsonValue::from(p.col));
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&p.location))),
                id: Some(geojson::feature::Id::Number(p.id.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Read tree tops written by [`tree_points_to_geojson`].
///
/// `TreeId` and `Height` are required; `Row` and `Col` default to 0 when the
/// source carries no grid cell.
pub fn tree_points_from_geojson(text: &str) -> Result<Vec<TreePoint>> {
    let geojson: GeoJson = text.parse()?;
    features_of(geojson)
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let entity = format!("tree top feature #{}", i);
            let id = feature
                .property(TREE_ID_FIELD)
                .and_then(JsonValue::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    TreeTopError::Configuration(format!(
                        "{} needs an unsigned integer {}",
                        entity, TREE_ID_FIELD
                    ))
                })?;
            let height = feature
                .property(HEIGHT_FIELD)
                .and_then(JsonValue::as_f64)
                .ok_or_else(|| {
                    TreeTopError::Configuration(format!(
                        "{} needs a numeric {}",
                        entity, HEIGHT_FIELD
                    ))
                })?;
            let cell = |name: &str| {
                feature
                    .property(name)
                    .and_then(JsonValue::as_u64)
                    .unwrap_or(0) as usize
            };

            let geometry = feature
                .geometry
                .as_ref()
                .ok_or_else(|| TreeTopError::geometry(&entity, "missing geometry"))?;
            let location: Point<f64> = match to_geo(&entity, geometry)? {
                GeoGeometry::Point(p) if p.x().is_finite() && p.y().is_finite() => p,
                _ => return Err(TreeTopError::geometry(&entity, "expected a finite Point")),
            };

            Ok(TreePoint {
                id,
                row: cell(ROW_FIELD),
                col: cell(COL_FIELD),
                location,
                height,
            })
        })
        .collect()
}

/// Stand summaries as polygon features; absent statistics are `null`
pub fn summaries_to_geojson(
    summaries: &[StandSummary],
    stands: &StandCollection,
) -> Result<GeoJson> {
    let geometries: HashMap<&str, &MultiPolygon<f64>> = stands
        .iter()
        .map(|s| (s.setting_id.as_str(), &s.geometry))
        .collect();

    let features = summaries
        .iter()
        .map(|summary| -> Result<Feature> {
            let properties = match serde_json::to_value(summary)? {
                JsonValue::Object(map) => map,
                _ => JsonObject::new(),
            };
            let geometry = geometries
                .get(summary.setting_id.as_str())
                .map(|mp| geojson::Geometry::new(geojson::Value::from(*mp)));
            Ok(Feature {
                bbox: None,
                geometry,
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }))
}

/// Write any GeoJSON document to `path`
pub fn write_geojson<P: AsRef<Path>>(path: P, geojson: &GeoJson) -> Result<()> {
    std::fs::write(path.as_ref(), geojson.to_string())?;
    Ok(())
}
