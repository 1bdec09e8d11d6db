//! Vector output types
//!
//! `geo-types` has no z coordinate, so traced lines are kept as
//! [`Polyline`]s of [`Vertex`] and converted to `geo_types::LineString`
//! when 2D geometry operations are needed.

use geo_types::{Coord, LineString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A line vertex in world coordinates, with optional elevation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Vertex {
    /// 2D vertex
    pub fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    /// 3D vertex
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }
}

/// Ordered sequence of vertices, 2D or 3D
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    vertices: Vec<Vertex>,
}

impl Polyline {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// True when every vertex carries a z value
    pub fn has_z(&self) -> bool {
        !self.vertices.is_empty() && self.vertices.iter().all(|v| v.z.is_some())
    }

    /// Length along the line including the vertical component.
    ///
    /// Vertices without z contribute only their horizontal distance.
    pub fn length_3d(&self) -> f64 {
        self.vertices
            .windows(2)
            .map(|w| {
                let dx = w[1].x - w[0].x;
                let dy = w[1].y - w[0].y;
                let dz = match (w[0].z, w[1].z) {
                    (Some(a), Some(b)) => b - a,
                    _ => 0.0,
                };
                (dx * dx + dy * dy + dz * dz).sqrt()
            })
            .sum()
    }

    /// Drop z and convert to a `geo_types::LineString`
    pub fn to_line_string(&self) -> LineString<f64> {
        LineString::new(
            self.vertices
                .iter()
                .map(|v| Coord { x: v.x, y: v.y })
                .collect(),
        )
    }
}

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<usize> for AttributeValue {
    fn from(v: usize) -> Self {
        AttributeValue::Int(v as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

/// A line feature with attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Polyline,
    /// Feature attributes, kept sorted for stable output
    pub properties: BTreeMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<u64>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Polyline) -> Self {
        Self {
            geometry,
            properties: BTreeMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    /// CRS of every geometry in the collection
    pub crs: Option<crate::CRS>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}
