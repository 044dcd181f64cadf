//! Stand polygons read from a GeoJSON FeatureCollection.

use std::collections::HashSet;

use geo::{Area, Geometry as GeoGeometry, MultiPolygon};
use geojson::{Feature, GeoJson};
use log::{debug, info};
use serde_json::Value as JsonValue;

use crate::collect::global_variables::{ACRES_FIELD, SETTING_ID_FIELD};
use crate::error::{Result, TreeTopError};
use crate::geo_core::{polygonal, GeoCore};

/// One management stand
#[derive(Debug, Clone, PartialEq)]
pub struct Stand {
    pub setting_id: String,
    pub geometry: MultiPolygon<f64>,
    pub acres: f64,
}

impl Stand {
    /// Build a stand; the geometry must be a valid polygon and acres
    /// finite and non-negative
    pub fn new(setting_id: impl Into<String>, geometry: MultiPolygon<f64>, acres: f64) -> Result<Self> {
        let setting_id = setting_id.into();
        let geometry = polygonal(
            &format!("stand {}", setting_id),
            GeoGeometry::MultiPolygon(geometry),
        )?;
        if !acres.is_finite() || acres < 0.0 {
            return Err(TreeTopError::InvalidParameter {
                name: "Acres",
                value: acres.to_string(),
                reason: format!("stand {} needs a finite, non-negative area", setting_id),
            });
        }
        Ok(Stand {
            setting_id,
            geometry,
            acres,
        })
    }

    /// Build a stand with its area computed from the geometry
    pub fn with_computed_acres(
        setting_id: impl Into<String>,
        geometry: MultiPolygon<f64>,
        geo_core: &GeoCore,
    ) -> Result<Self> {
        let acres = geo_core
            .get_linear_unit()
            .area_to_acres(geometry.unsigned_area());
        Self::new(setting_id, geometry, acres)
    }
}

/// Validated stands of one run, in input order
#[derive(Debug, Clone, Default)]
pub struct StandCollection {
    stands: Vec<Stand>,
}

impl StandCollection {
    /// Collect stands; duplicate `SETTING_ID`s are rejected
    pub fn new(stands: Vec<Stand>) -> Result<Self> {
        let mut seen = HashSet::new();
        for stand in &stands {
            if !seen.insert(stand.setting_id.as_str()) {
                return Err(TreeTopError::Configuration(format!(
                    "duplicate {} {}",
                    SETTING_ID_FIELD, stand.setting_id
                )));
            }
        }
        Ok(StandCollection { stands })
    }

    /// Parse a FeatureCollection of stands.
    ///
    /// Each feature needs a `SETTING_ID` (string or integer) and a polygonal
    /// geometry. `Acres` is used when present, otherwise it is computed from
    /// the polygon area in the CRS of `geo_core`. Other attributes are dropped.
    pub fn from_geojson_str(text: &str, geo_core: &GeoCore) -> Result<Self> {
        let geojson: GeoJson = text.parse()?;
        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(TreeTopError::Configuration(
                    "stands must be GeoJSON features carrying a SETTING_ID".to_string(),
                ))
            }
        };

        let stands = features
            .iter()
            .enumerate()
            .map(|(i, feature)| stand_from_feature(i, feature, geo_core))
            .collect::<Result<Vec<_>>>()?;

        info!("Loaded {} stands", stands.len());
        Self::new(stands)
    }

    pub fn stands(&self) -> &[Stand] {
        &self.stands
    }

    pub fn len(&self) -> usize {
        self.stands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stands.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stand> {
        self.stands.iter()
    }
}

impl<'a> IntoIterator for &'a StandCollection {
    type Item = &'a Stand;
    type IntoIter = std::slice::Iter<'a, Stand>;

    fn into_iter(self) -> Self::IntoIter {
        self.stands.iter()
    }
}

fn stand_from_feature(index: usize, feature: &Feature, geo_core: &GeoCore) -> Result<Stand> {
    let setting_id = match feature.property(SETTING_ID_FIELD) {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(JsonValue::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
        Some(other) => {
            return Err(TreeTopError::Configuration(format!(
                "stand feature #{}: {} must be a string or integer, got {}",
                index, SETTING_ID_FIELD, other
            )))
        }
        None => {
            return Err(TreeTopError::Configuration(format!(
                "stand feature #{} has no {}",
                index, SETTING_ID_FIELD
            )))
        }
    };
    let entity = format!("stand {}", setting_id);

    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| TreeTopError::geometry(&entity, "missing geometry"))?;
    let geometry: GeoGeometry<f64> = geometry
        .try_into()
        .map_err(|e| TreeTopError::geometry(&entity, format!("{}", e)))?;
    let geometry = polygonal(&entity, geometry)?;

    match feature.property(ACRES_FIELD) {
        Some(JsonValue::Null) | None => {
            debug!("{}: computing acres from geometry", entity);
            Stand::with_computed_acres(setting_id, geometry, geo_core)
        }
        Some(value) => {
            let acres = value.as_f64().ok_or_else(|| {
                TreeTopError::Configuration(format!(
                    "{}: {} must be numeric, got {}",
                    entity, ACRES_FIELD, value
                ))
            })?;
            Stand::new(setting_id, geometry, acres)
        }
    }
}
