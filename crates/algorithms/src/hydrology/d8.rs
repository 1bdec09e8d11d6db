//! D8 direction codes and source encodings
//!
//! Flow direction rasters store one code per cell naming the neighbor that
//! receives its flow. Producers disagree on the codes, so the mapping is a
//! parameter ([`D8Encoding`]) rather than a constant. The ESRI encoding is
//! the default:
//!
//! ```text
//!   32  64  128
//!   16   X    1
//!    8   4    2
//! ```

use std::fmt;
use std::str::FromStr;
use rivulet_core::{Error, Result};

/// One of the eight D8 neighbors, clockwise from East
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D8Direction {
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    North,
    NorthEast,
}

/// (row_offset, col_offset) per direction, in [`D8Direction::ALL`] order
const D8_OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // E
    (1, 1),   // SE
    (1, 0),   // S
    (1, -1),  // SW
    (0, -1),  // W
    (-1, -1), // NW
    (-1, 0),  // N
    (-1, 1),  // NE
];

impl D8Direction {
    /// All directions, clockwise from East
    pub const ALL: [D8Direction; 8] = [
        D8Direction::East,
        D8Direction::SouthEast,
        D8Direction::South,
        D8Direction::SouthWest,
        D8Direction::West,
        D8Direction::NorthWest,
        D8Direction::North,
        D8Direction::NorthEast,
    ];

    /// Position in [`D8Direction::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// (row_offset, col_offset) of the receiving neighbor
    pub fn offset(self) -> (isize, isize) {
        D8_OFFSETS[self.index()]
    }

    /// Direction pointing back at this cell from the receiving neighbor
    pub fn opposite(self) -> Self {
        Self::ALL[(self.index() + 4) % 8]
    }

    /// Neighbor of (row, col) in this direction, `None` when it leaves a
    /// `rows` x `cols` grid
    pub fn step(self, row: usize, col: usize, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (dr, dc) = self.offset();
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
            return None;
        }
        Some((nr as usize, nc as usize))
    }

    /// Short compass name ("E", "SE", ...)
    pub fn abbreviation(self) -> &'static str {
        match self {
            D8Direction::East => "E",
            D8Direction::SouthEast => "SE",
            D8Direction::South => "S",
            D8Direction::SouthWest => "SW",
            D8Direction::West => "W",
            D8Direction::NorthWest => "NW",
            D8Direction::North => "N",
            D8Direction::NorthEast => "NE",
        }
    }
}

impl fmt::Display for D8Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Decoded content of a flow direction cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowCell {
    /// Flow leaves toward the given neighbor
    Flow(D8Direction),
    /// No downhill neighbor
    Sink,
    /// Outside the valid data area
    NoData,
}

/// Mapping from raw raster codes to D8 directions.
///
/// `codes` lists the raw value for each direction in [`D8Direction::ALL`]
/// order (E, SE, S, SW, W, NW, N, NE). Values listed in `sink_codes` decode
/// to [`FlowCell::Sink`]; anything else is undecodable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D8Encoding {
    name: String,
    codes: [i64; 8],
    sink_codes: Vec<i64>,
    /// Negative codes mean "flow leaves the map" and decode by magnitude (GRASS)
    signed_outflow: bool,
}

impl D8Encoding {
    /// ESRI / ArcGIS: 1=E, 2=SE, 4=S, 8=SW, 16=W, 32=NW, 64=N, 128=NE
    pub fn esri() -> Self {
        Self::preset("esri", [1, 2, 4, 8, 16, 32, 64, 128])
    }

    /// TauDEM / SAGA-style sequential codes, counter-clockwise from East:
    /// 1=E, 2=NE, 3=N, 4=NW, 5=W, 6=SW, 7=S, 8=SE
    pub fn taudem() -> Self {
        Self::preset("taudem", [1, 8, 7, 6, 5, 4, 3, 2])
    }

    /// WhiteboxTools D8 pointer: 1=NE, 2=E, 4=SE, 8=S, 16=SW, 32=W, 64=NW, 128=N
    pub fn whitebox() -> Self {
        Self::preset("whitebox", [2, 4, 8, 16, 32, 64, 128, 1])
    }

    /// GRASS r.watershed drainage: 1=NE, 2=N, 3=NW, 4=W, 5=SW, 6=S, 7=SE, 8=E.
    /// Negative values flow off the map and are decoded by magnitude.
    pub fn grass() -> Self {
        let mut encoding = Self::preset("grass", [8, 7, 6, 5, 4, 3, 2, 1]);
        encoding.signed_outflow = true;
        encoding
    }

    /// Custom codes in E, SE, S, SW, W, NW, N, NE order.
    ///
    /// 0 is the sink code unless it is one of the direction codes, in which
    /// case the encoding has no sink code. Fails if a code is repeated.
    pub fn custom(codes: [i64; 8]) -> Result<Self> {
        let sink_codes = if codes.contains(&0) { Vec::new() } else { vec![0] };
        Self::custom_with_sinks(codes, sink_codes)
    }

    /// Custom codes with explicit sink codes.
    ///
    /// Fails if a code is repeated or a sink code is also a direction code.
    pub fn custom_with_sinks(codes: [i64; 8], sink_codes: Vec<i64>) -> Result<Self> {
        Self::preset("custom", codes).with_sink_codes(sink_codes)
    }

    fn preset(name: &str, codes: [i64; 8]) -> Self {
        Self {
            name: name.to_string(),
            codes,
            sink_codes: vec![0],
            signed_outflow: false,
        }
    }

    /// Replace the sink codes.
    ///
    /// Fails if a sink code is also a direction code.
    pub fn with_sink_codes(mut self, sink_codes: Vec<i64>) -> Result<Self> {
        for (i, code) in self.codes.iter().enumerate() {
            if self.codes[..i].contains(code) {
                return Err(Error::InvalidParameter {
                    name: "encoding",
                    value: format!("{:?}", self.codes),
                    reason: format!("code {} is used for two directions", code),
                });
            }
            if sink_codes.contains(code) {
                return Err(Error::InvalidParameter {
                    name: "sink_codes",
                    value: format!("{:?}", sink_codes),
                    reason: format!("code {} is already the {} direction", code, D8Direction::ALL[i]),
                });
            }
        }
        self.sink_codes = sink_codes;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw codes in E, SE, S, SW, W, NW, N, NE order
    pub fn codes(&self) -> &[i64; 8] {
        &self.codes
    }

    pub fn sink_codes(&self) -> &[i64] {
        &self.sink_codes
    }

    /// Raw code for a direction
    pub fn code_for(&self, direction: D8Direction) -> i64 {
        self.codes[direction.index()]
    }

    /// Decode a raw value. `None` if the value is not a code of this encoding.
    ///
    /// No-data is not handled here; it depends on the raster, not the encoding.
    pub fn decode(&self, value: f64) -> Option<FlowCell> {
        if !value.is_finite() || value.fract() != 0.0 {
            return None;
        }
        let code = value as i64;
        if self.sink_codes.contains(&code) {
            return Some(FlowCell::Sink);
        }
        let code = if self.signed_outflow { code.abs() } else { code };
        self.codes
            .iter()
            .position(|&c| c == code)
            .and_then(D8Direction::from_index)
            .map(FlowCell::Flow)
    }
}

impl Default for D8Encoding {
    fn default() -> Self {
        Self::esri()
    }
}

impl fmt::Display for D8Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.name)?;
        for (i, direction) in D8Direction::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", self.codes[i], direction)?;
        }
        f.write_str(")")
    }
}

impl FromStr for D8Encoding {
    type Err = Error;

    /// Parse a preset name (`esri`, `arcgis`, `taudem`, `whitebox`, `grass`)
    /// or eight comma-separated codes in E, SE, S, SW, W, NW, N, NE order.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "esri" | "arcgis" => return Ok(Self::esri()),
            "taudem" | "saga" => return Ok(Self::taudem()),
            "whitebox" | "wbt" => return Ok(Self::whitebox()),
            "grass" => return Ok(Self::grass()),
            _ => {}
        }

        let invalid = |reason: String| Error::InvalidParameter {
            name: "encoding",
            value: s.to_string(),
            reason,
        };

        let parsed: Vec<i64> = s
            .split(',')
            .map(|part| part.trim().parse::<i64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| {
                invalid("expected esri, taudem, whitebox, grass or 8 comma-separated codes".into())
            })?;
        let codes: [i64; 8] = parsed
            .try_into()
            .map_err(|v: Vec<i64>| invalid(format!("expected 8 codes, got {}", v.len())))?;
        Self::custom(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_distinct_neighbors() {
        let mut seen = std::collections::HashSet::new();
        for direction in D8Direction::ALL {
            let (dr, dc) = direction.offset();
            assert!(dr.abs() <= 1 && dc.abs() <= 1 && (dr, dc) != (0, 0));
            assert!(seen.insert((dr, dc)), "duplicate offset for {}", direction);
        }
    }

    #[test]
    fn test_opposite_direction() {
        assert_eq!(D8Direction::East.opposite(), D8Direction::West);
        assert_eq!(D8Direction::North.opposite(), D8Direction::South);
        assert_eq!(D8Direction::SouthEast.opposite(), D8Direction::NorthWest);
        for direction in D8Direction::ALL {
            let (dr, dc) = direction.offset();
            assert_eq!(direction.opposite().offset(), (-dr, -dc));
        }
    }

    #[test]
    fn test_step_off_grid() {
        assert_eq!(D8Direction::East.step(0, 0, 3, 3), Some((0, 1)));
        assert_eq!(D8Direction::North.step(0, 1, 3, 3), None);
        assert_eq!(D8Direction::SouthEast.step(2, 2, 3, 3), None);
        assert_eq!(D8Direction::SouthWest.step(1, 1, 3, 3), Some((2, 0)));
    }

    #[test]
    fn test_esri_decoding_matches_diagram() {
        let esri = D8Encoding::esri();
        assert_eq!(esri.decode(1.0), Some(FlowCell::Flow(D8Direction::East)));
        assert_eq!(esri.decode(2.0), Some(FlowCell::Flow(D8Direction::SouthEast)));
        assert_eq!(esri.decode(4.0), Some(FlowCell::Flow(D8Direction::South)));
        assert_eq!(esri.decode(8.0), Some(FlowCell::Flow(D8Direction::SouthWest)));
        assert_eq!(esri.decode(16.0), Some(FlowCell::Flow(D8Direction::West)));
        assert_eq!(esri.decode(32.0), Some(FlowCell::Flow(D8Direction::NorthWest)));
        assert_eq!(esri.decode(64.0), Some(FlowCell::Flow(D8Direction::North)));
        assert_eq!(esri.decode(128.0), Some(FlowCell::Flow(D8Direction::NorthEast)));
        assert_eq!(esri.decode(0.0), Some(FlowCell::Sink));
        assert_eq!(esri.decode(3.0), None);
        assert_eq!(esri.decode(1.5), None);
        assert_eq!(esri.decode(f64::NAN), None);
    }

    #[test]
    fn test_presets_agree_on_geometry() {
        // Every preset must decode its own code for each direction back to that direction
        for encoding in [
            D8Encoding::esri(),
            D8Encoding::taudem(),
            D8Encoding::whitebox(),
            D8Encoding::grass(),
        ] {
            for direction in D8Direction::ALL {
                let code = encoding.code_for(direction) as f64;
                assert_eq!(
                    encoding.decode(code),
                    Some(FlowCell::Flow(direction)),
                    "{} code {}",
                    encoding.name(),
                    code
                );
            }
        }
        assert_eq!(
            D8Encoding::taudem().decode(2.0),
            Some(FlowCell::Flow(D8Direction::NorthEast))
        );
        assert_eq!(
            D8Encoding::whitebox().decode(1.0),
            Some(FlowCell::Flow(D8Direction::NorthEast))
        );
    }

    #[test]
    fn test_grass_negative_outflow() {
        let grass = D8Encoding::grass();
        assert_eq!(grass.decode(-8.0), Some(FlowCell::Flow(D8Direction::East)));
        assert_eq!(grass.decode(-2.0), Some(FlowCell::Flow(D8Direction::North)));
        assert_eq!(D8Encoding::esri().decode(-1.0), None);
    }

    #[test]
    fn test_parse_presets_and_custom() {
        assert_eq!("ESRI".parse::<D8Encoding>().unwrap(), D8Encoding::esri());
        assert_eq!("taudem".parse::<D8Encoding>().unwrap(), D8Encoding::taudem());

        let custom: D8Encoding = "10, 20, 30, 40, 50, 60, 70, 80".parse().unwrap();
        assert_eq!(custom.decode(70.0), Some(FlowCell::Flow(D8Direction::North)));
        assert_eq!(custom.decode(0.0), Some(FlowCell::Sink));

        assert!(matches!(
            "1,2,3".parse::<D8Encoding>(),
            Err(Error::InvalidParameter { name: "encoding", .. })
        ));
        assert!(matches!(
            "nonsense".parse::<D8Encoding>(),
            Err(Error::InvalidParameter { .. })
        ));
        assert!("1,1,2,3,4,5,6,7".parse::<D8Encoding>().is_err());
    }

    #[test]
    fn test_zero_based_custom_codes() {
        let zero_based: D8Encoding = "0,1,2,3,4,5,6,7".parse().unwrap();
        assert_eq!(zero_based.decode(0.0), Some(FlowCell::Flow(D8Direction::East)));
        assert_eq!(zero_based.decode(6.0), Some(FlowCell::Flow(D8Direction::North)));
        assert!(zero_based.sink_codes().is_empty());

        let with_sink = zero_based.with_sink_codes(vec![-1]).unwrap();
        assert_eq!(with_sink.decode(-1.0), Some(FlowCell::Sink));

        let direct = D8Encoding::custom_with_sinks([0, 1, 2, 3, 4, 5, 6, 7], vec![255]).unwrap();
        assert_eq!(direct.decode(255.0), Some(FlowCell::Sink));
        assert!(D8Encoding::custom_with_sinks([0, 1, 2, 3, 4, 5, 6, 7], vec![0]).is_err());
    }

    #[test]
    fn test_sink_codes() {
        let encoding = D8Encoding::esri().with_sink_codes(vec![0, 255]).unwrap();
        assert_eq!(encoding.decode(255.0), Some(FlowCell::Sink));
        assert!(D8Encoding::esri().with_sink_codes(vec![64]).is_err());
    }

    #[test]
    fn test_display() {
        let text = D8Encoding::esri().to_string();
        assert!(text.starts_with("esri (1=E, 2=SE"));
        assert!(text.ends_with("128=NE)"));
    }
}
