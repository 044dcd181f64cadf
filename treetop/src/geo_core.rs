use geo::{BoundingRect, Geometry, MultiPolygon};

use crate::error::{Result, TreeTopError};

/// Square metres in one international acre
pub const SQUARE_METERS_PER_ACRE: f64 = 4_046.856_422_4;

/// Linear unit of a projected CRS, used to turn planar areas into acres
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinearUnit {
    #[default]
    Meter,
    /// International foot (0.3048 m)
    Foot,
    /// US survey foot (1200/3937 m)
    UsSurveyFoot,
}

impl LinearUnit {
    /// Length of one unit in metres
    pub fn meters(&self) -> f64 {
        match self {
            LinearUnit::Meter => 1.0,
            LinearUnit::Foot => 0.3048,
            LinearUnit::UsSurveyFoot => 1200.0 / 3937.0,
        }
    }

    /// Convert an area in squared CRS units to acres
    pub fn area_to_acres(&self, area: f64) -> f64 {
        let m = self.meters();
        area * m * m / SQUARE_METERS_PER_ACRE
    }
}

/// Base struct for a single processing run
/// Holds the CRS (EPSG code and its linear unit) and the output path.
/// A GeoCore is created per run and passed explicitly.
#[derive(Debug, Clone)]
pub struct GeoCore {
    /// EPSG code of the projected CRS all inputs share
    pub epsg: i32,
    /// Linear unit of `epsg`
    pub linear_unit: LinearUnit,
    /// Output path for written products
    pub output_path: Option<String>,
}

impl GeoCore {
    /// Create a new GeoCore with EPSG, assuming a metric CRS
    pub fn new(epsg: i32) -> Self {
        GeoCore {
            epsg,
            linear_unit: LinearUnit::Meter,
            output_path: None,
        }
    }

    /// Create a GeoCore with EPSG and linear unit
    pub fn with_unit(epsg: i32, linear_unit: LinearUnit) -> Self {
        GeoCore {
            linear_unit,
            ..GeoCore::new(epsg)
        }
    }

    /// Get EPSG code
    pub fn get_epsg(&self) -> i32 {
        self.epsg
    }

    /// Set EPSG code
    pub fn set_epsg(&mut self, epsg: i32) {
        self.epsg = epsg;
    }

    /// Get linear unit
    pub fn get_linear_unit(&self) -> LinearUnit {
        self.linear_unit
    }

    /// Set linear unit
    pub fn set_linear_unit(&mut self, linear_unit: LinearUnit) {
        self.linear_unit = linear_unit;
    }

    /// Get output path
    pub fn get_output_path(&self) -> Option<&String> {
        self.output_path.as_ref()
    }

    /// Set output path
    pub fn set_output_path(&mut self, output_path: Option<String>) {
        self.output_path = output_path;
    }
}

impl Default for GeoCore {
    /// NAD83 / UTM zone 11N, the CRS the stand and CHM layers are delivered in
    fn default() -> Self {
        GeoCore::new(26911)
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounding box of any geometry, `None` for empty geometries
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        geometry.bounding_rect().map(|rect| BoundingBox {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        })
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Validate a polygonal geometry and return it as a MultiPolygon.
///
/// Fails with a geometry input error naming `entity` for non-polygonal,
/// empty, unclosed, degenerate or non-finite geometries.
pub fn polygonal(entity: &str, geometry: Geometry<f64>) -> Result<MultiPolygon<f64>> {
    let multi = match geometry {
        Geometry::Polygon(poly) => MultiPolygon::new(vec![poly]),
        Geometry::MultiPolygon(mp) => mp,
        Geometry::Rect(rect) => MultiPolygon::new(vec![rect.to_polygon()]),
        other => {
            return Err(TreeTopError::geometry(
                entity,
                format!("expected a polygon, got {}", geometry_name(&other)),
            ))
        }
    };

    if multi.0.is_empty() {
        return Err(TreeTopError::geometry(entity, "empty multipolygon"));
    }

    for poly in &multi.0 {
        for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
            if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                return Err(TreeTopError::geometry(entity, "non-finite coordinate"));
            }
        }
        // geo closes rings on construction; fewer than 4 coords means < 3 distinct vertices
        if poly.exterior().0.len() < 4 {
            return Err(TreeTopError::geometry(
                entity,
                "exterior ring has fewer than three vertices",
            ));
        }
    }

    Ok(multi)
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon};

    #[test]
    fn test_geo_core_default() {
        let gc = GeoCore::default();
        assert_eq!(gc.get_epsg(), 26911);
        assert_eq!(gc.get_linear_unit(), LinearUnit::Meter);
    }

    #[test]
    fn test_bounding_box() {
        let bbox: BoundingBox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(bbox.min_x, 0.0);
        assert_eq!(bbox.max_x, 1.0);
        assert!(bbox.contains_point(0.5, 1.0));
        assert!(!bbox.contains_point(1.5, 0.5));
    }

    #[test]
    fn test_area_to_acres() {
        // One acre is 43,560 international square feet
        let acres = LinearUnit::Foot.area_to_acres(43_560.0);
        assert!((acres - 1.0).abs() < 1e-9);
        let acres = LinearUnit::Meter.area_to_acres(SQUARE_METERS_PER_ACRE * 2.5);
        assert!((acres - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_polygonal_accepts_polygon() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ];
        let mp = polygonal("boundary", Geometry::Polygon(poly)).unwrap();
        assert_eq!(mp.0.len(), 1);
    }

    #[test]
    fn test_polygonal_rejects_point() {
        let err = polygonal("stand 7", Geometry::Point(point!(x: 1.0, y: 2.0))).unwrap_err();
        assert!(err.to_string().contains("stand 7"));
        assert!(err.to_string().contains("Point"));
    }

    #[test]
    fn test_polygonal_rejects_non_finite() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: f64::NAN, y: 0.0),
            (x: 1.0, y: 1.0),
        ];
        assert!(polygonal("boundary", Geometry::Polygon(poly)).is_err());
    }
}
