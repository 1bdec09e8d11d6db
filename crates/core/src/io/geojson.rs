//! GeoJSON output for traced lines (RFC 7946, plus the legacy named `crs`
//! member when the EPSG code is known)

use crate::error::Result;
use crate::vector::{AttributeValue, Feature, FeatureCollection, Polyline};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Serialize)]
struct GeoJsonCollection<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    crs: Option<NamedCrs>,
    features: Vec<GeoJsonFeature<'a>>,
}

#[derive(Serialize)]
struct NamedCrs {
    #[serde(rename = "type")]
    kind: &'static str,
    properties: NamedCrsProperties,
}

#[derive(Serialize)]
struct NamedCrsProperties {
    name: String,
}

#[derive(Serialize)]
struct GeoJsonFeature<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    geometry: LineStringGeometry,
    properties: &'a BTreeMap<String, AttributeValue>,
}

#[derive(Serialize)]
struct LineStringGeometry {
    #[serde(rename = "type")]
    kind: &'static str,
    coordinates: Vec<Vec<f64>>,
}

impl From<&Polyline> for LineStringGeometry {
    fn from(line: &Polyline) -> Self {
        // Mixed 2D/3D positions are not allowed; z is written only when every vertex has one
        let with_z = line.has_z();
        let coordinates = line
            .vertices()
            .iter()
            .map(|v| match v.z {
                Some(z) if with_z => vec![v.x, v.y, z],
                _ => vec![v.x, v.y],
            })
            .collect();
        Self {
            kind: "LineString",
            coordinates,
        }
    }
}

impl<'a> From<&'a Feature> for GeoJsonFeature<'a> {
    fn from(feature: &'a Feature) -> Self {
        Self {
            kind: "Feature",
            id: feature.id,
            geometry: LineStringGeometry::from(&feature.geometry),
            properties: &feature.properties,
        }
    }
}

fn to_document(collection: &FeatureCollection) -> GeoJsonCollection<'_> {
    GeoJsonCollection {
        kind: "FeatureCollection",
        crs: collection
            .crs
            .as_ref()
            .and_then(|crs| crs.ogc_urn())
            .map(|name| NamedCrs {
                kind: "name",
                properties: NamedCrsProperties { name },
            }),
        features: collection.iter().map(GeoJsonFeature::from).collect(),
    }
}

/// Serialize a feature collection as a pretty-printed GeoJSON string
pub fn to_geojson_string(collection: &FeatureCollection) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_document(collection))?)
}

/// Write a feature collection to a GeoJSON file
pub fn write_geojson<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(&mut writer, &to_document(collection))?;
    writer.flush()?;
    Ok(())
}
