//! Coordinate Reference System handling
//!
//! Rivulet does not reproject; the CRS is carried from the flow direction
//! raster to the output so consumers know what the coordinates mean.

use serde::{Deserialize, Serialize};
use std::fmt;

/// GeoKey ids (GeoTIFF 1.1, section 7) that carry an EPSG code
const GEOGRAPHIC_TYPE_GEOKEY: u32 = 2048;
const PROJECTED_CS_TYPE_GEOKEY: u32 = 3072;
/// "User-defined" marker value for geokeys
const USER_DEFINED: u32 = 32767;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: Some(code) }
    }

    /// Extract the CRS from a GeoTIFF GeoKeyDirectory.
    ///
    /// The directory is a flat list of shorts: a 4-entry header
    /// `[version, revision, minor, key_count]` followed by `key_count` entries
    /// of `[key_id, tiff_tag_location, count, value]`. Only keys stored inline
    /// (`tiff_tag_location == 0`) are read. A projected CRS wins over a
    /// geographic one.
    pub fn from_geokeys(directory: &[u32]) -> Option<Self> {
        if directory.len() < 4 {
            return None;
        }
        let key_count = directory[3] as usize;
        let mut geographic = None;
        let mut projected = None;

        for entry in directory[4..].chunks_exact(4).take(key_count) {
            let (key, location, value) = (entry[0], entry[1], entry[3]);
            if location != 0 || value == 0 || value == USER_DEFINED {
                continue;
            }
            match key {
                GEOGRAPHIC_TYPE_GEOKEY => geographic = Some(value),
                PROJECTED_CS_TYPE_GEOKEY => projected = Some(value),
                _ => {}
            }
        }

        projected.or(geographic).map(Self::from_epsg)
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// OGC URN for this CRS (`urn:ogc:def:crs:EPSG::<code>`), when the EPSG code is known
    pub fn ogc_urn(&self) -> Option<String> {
        self.epsg.map(|code| format!("urn:ogc:def:crs:EPSG::{}", code))
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        match self.epsg {
            Some(code) => format!("EPSG:{}", code),
            None => "Unknown".to_string(),
        }
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(32719);
        assert_eq!(crs.epsg(), Some(32719));
        assert_eq!(crs.identifier(), "EPSG:32719");
        assert_eq!(crs.ogc_urn().as_deref(), Some("urn:ogc:def:crs:EPSG::32719"));
    }

    #[test]
    fn test_crs_from_geokeys_projected() {
        let keys = [
            1, 1, 0, 3, //
            1024, 0, 1, 1, // GTModelType = projected
            1025, 0, 1, 1, // GTRasterType = area
            3072, 0, 1, 32719, // ProjectedCSType
        ];
        assert_eq!(CRS::from_geokeys(&keys), Some(CRS::from_epsg(32719)));
    }

    #[test]
    fn test_crs_from_geokeys_geographic_and_user_defined() {
        let geographic = [1, 1, 0, 1, 2048, 0, 1, 4326];
        assert_eq!(CRS::from_geokeys(&geographic), Some(CRS::wgs84()));

        let user_defined = [1, 1, 0, 1, 3072, 0, 1, 32767];
        assert_eq!(CRS::from_geokeys(&user_defined), None);

        assert_eq!(CRS::from_geokeys(&[1, 1]), None);
    }
}
