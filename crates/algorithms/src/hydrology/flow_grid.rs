//! Flow direction grid loader
//!
//! Reads a single-band D8 raster and decodes every cell through a
//! [`D8Encoding`] into a canonical grid. Decoding happens once at load time,
//! so tracing never sees a raw code and never needs the encoding again.

use std::path::Path;
use rivulet_core::io::{read_geotiff, read_geotiff_from_buffer};
use rivulet_core::raster::{GeoTransform, Raster, RasterElement};
use rivulet_core::{Error, Result, CRS};

use super::d8::{D8Direction, D8Encoding, FlowCell};

/// Canonical cell codes: 0 = sink, 1..=8 = direction index + 1, 255 = no-data
const SINK_CODE: u8 = 0;
const NODATA_CODE: u8 = 255;

fn encode_cell(cell: FlowCell) -> u8 {
    match cell {
        FlowCell::Sink => SINK_CODE,
        FlowCell::NoData => NODATA_CODE,
        FlowCell::Flow(direction) => direction.index() as u8 + 1,
    }
}

fn decode_cell(code: u8) -> FlowCell {
    match code {
        SINK_CODE => FlowCell::Sink,
        NODATA_CODE => FlowCell::NoData,
        c => D8Direction::from_index(c as usize - 1)
            .map(FlowCell::Flow)
            .unwrap_or(FlowCell::NoData),
    }
}

/// Parameters for loading a flow direction raster
#[derive(Debug, Clone, Default)]
pub struct FlowGridParams {
    /// Code-to-direction mapping of the source raster
    pub encoding: D8Encoding,
    /// No-data value overriding the one stored in the file
    pub nodata: Option<f64>,
}

/// A decoded D8 flow direction grid.
///
/// Read-only after construction and `Sync`, so one grid can serve any number
/// of concurrent traces.
#[derive(Debug, Clone)]
pub struct FlowDirectionGrid {
    cells: Raster<u8>,
}

impl FlowDirectionGrid {
    /// Decode a raster of raw direction codes.
    ///
    /// Cells equal to the raster's no-data value (or NaN) become
    /// [`FlowCell::NoData`]. Any other value must decode through `encoding`,
    /// otherwise this fails with [`Error::InvalidRaster`] naming the first
    /// offending cell in row-major order.
    pub fn decode<T: RasterElement>(raster: &Raster<T>, encoding: &D8Encoding) -> Result<Self> {
        let (rows, cols) = raster.shape();
        let mut cells = raster.with_same_meta::<u8>(rows, cols);
        cells.set_nodata(Some(NODATA_CODE));

        for ((row, col), &value) in raster.data().indexed_iter() {
            let cell = if raster.is_nodata(value) {
                FlowCell::NoData
            } else {
                let raw = value.to_f64().unwrap_or(f64::NAN);
                encoding.decode(raw).ok_or_else(|| {
                    Error::invalid_raster(format!(
                        "undecodable flow direction value {} at cell ({}, {}) for encoding {}",
                        raw,
                        row,
                        col,
                        encoding.name()
                    ))
                })?
            };
            cells.data_mut()[(row, col)] = encode_cell(cell);
        }

        Ok(Self { cells })
    }

    /// Build a grid directly from decoded cells, north-up with unit cells
    /// unless a transform is set afterwards
    pub fn from_cells(cells: Vec<FlowCell>, rows: usize, cols: usize) -> Result<Self> {
        let codes = cells.into_iter().map(encode_cell).collect();
        let mut raster = Raster::from_vec(codes, rows, cols)?;
        raster.set_nodata(Some(NODATA_CODE));
        Ok(Self { cells: raster })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.cells.rows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cells.cols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.cells.shape()
    }

    pub fn transform(&self) -> &GeoTransform {
        self.cells.transform()
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.cells.set_transform(transform);
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.cells.crs()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.cells.set_crs(crs);
    }

    /// Decoded cell at (row, col), `None` outside the grid
    pub fn cell(&self, row: usize, col: usize) -> Option<FlowCell> {
        self.cells.get(row, col).ok().map(decode_cell)
    }

    /// Cell (row, col) containing a world coordinate
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        self.cells.geo_to_cell(x, y)
    }

    /// Canonical code raster (0 = sink, 1..=8 = E, SE, S, SW, W, NW, N, NE, 255 = no-data)
    pub fn codes(&self) -> &Raster<u8> {
        &self.cells
    }
}

/// Reads flow direction rasters with a fixed set of [`FlowGridParams`]
#[derive(Debug, Clone, Default)]
pub struct FlowDirectionLoader {
    params: FlowGridParams,
}

impl FlowDirectionLoader {
    pub fn new(params: FlowGridParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FlowGridParams {
        &self.params
    }

    /// Load and decode a single-band GeoTIFF
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<FlowDirectionGrid> {
        let raster: Raster<f64> = read_geotiff(path)?;
        self.decode(raster)
    }

    /// Load and decode a GeoTIFF held in memory
    pub fn load_from_buffer(&self, data: &[u8]) -> Result<FlowDirectionGrid> {
        let raster: Raster<f64> = read_geotiff_from_buffer(data)?;
        self.decode(raster)
    }

    fn decode(&self, mut raster: Raster<f64>) -> Result<FlowDirectionGrid> {
        if let Some(nodata) = self.params.nodata {
            raster.set_nodata(Some(nodata));
        }
        FlowDirectionGrid::decode(&raster, &self.params.encoding)
    }
}

/// Read a flow direction GeoTIFF with the given parameters
pub fn read_flow_direction<P: AsRef<Path>>(path: P, params: FlowGridParams) -> Result<FlowDirectionGrid> {
    FlowDirectionLoader::new(params).load(path)
}
