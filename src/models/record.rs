//! POI record structure shared by extract and combined datasets.

use geo_types::Geometry;
use serde::{Deserialize, Serialize};

/// Geometry collection a raw layer file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Point,
    Polygon,
}

impl Category {
    /// Categories in processing order
    pub fn all() -> &'static [Category] {
        &[Category::Point, Category::Polygon]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Point => "point",
            Category::Polygon => "polygon",
        }
    }

    /// Infix between layer name and file number in raw layer file names
    pub fn raw_infix(&self) -> &'static str {
        match self {
            Category::Point => "_free_",
            Category::Polygon => "_a_free_",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry kind resolved from the geometry itself, not from the source category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl GeometryKind {
    /// Classify a geometry
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                GeometryKind::Line
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => GeometryKind::Polygon,
            _ => GeometryKind::Point,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "point",
            GeometryKind::Line => "line",
            GeometryKind::Polygon => "polygon",
        }
    }

    /// File name of the combined dataset for a leaf, e.g. `diner_point.csv`
    pub fn combined_file_name(&self, leaf: &str) -> String {
        format!("{}_{}.csv", leaf, self.as_str())
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A geometry with its normalized tag string and provenance.
///
/// Stored as one CSV row; the geometry column holds WKT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiRecord {
    #[serde(with = "wkt_column")]
    pub geometry: Geometry<f64>,

    /// Normalized tag string, possibly `;`-separated
    pub tag: String,

    pub partition: String,
    pub layer: String,
    pub category: Category,
}

impl PoiRecord {
    pub fn kind(&self) -> GeometryKind {
        GeometryKind::of(&self.geometry)
    }
}

/// Parse a WKT string into a geometry
pub fn parse_wkt(text: &str) -> Result<Geometry<f64>, String> {
    use std::str::FromStr;
    wkt::Wkt::<f64>::from_str(text)
        .map_err(|e| format!("{:?}", e))
        .and_then(|w| w.try_into().map_err(|e: wkt::conversion::Error| format!("{:?}", e)))
}

/// Serde adapter storing a geometry as a WKT string
pub(crate) mod wkt_column {
    use geo_types::Geometry;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use wkt::ToWkt;

    pub fn serialize<S: Serializer>(geometry: &Geometry<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&geometry.wkt_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Geometry<f64>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_wkt(&text).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, point, polygon};

    #[test]
    fn test_geometry_kind() {
        assert_eq!(GeometryKind::of(&point!(x: 1.0, y: 2.0).into()), GeometryKind::Point);
        assert_eq!(
            GeometryKind::of(&line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into()),
            GeometryKind::Line
        );
        assert_eq!(
            GeometryKind::of(
                &polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)].into()
            ),
            GeometryKind::Polygon
        );
    }

    #[test]
    fn test_parse_wkt() {
        let geometry = parse_wkt("POINT(-100 45)").unwrap();
        assert_eq!(geometry, Geometry::Point(point!(x: -100.0, y: 45.0)));
        assert!(parse_wkt("POINT(oops)").is_err());
    }

    #[test]
    fn test_combined_file_name() {
        assert_eq!(GeometryKind::Line.combined_file_name("diner"), "diner_line.csv");
    }
}
