//! Trace path to line geometry
//!
//! Converts the cells of a [`TracePath`] into world coordinates at cell
//! centers, optionally draped onto an elevation raster.

use std::str::FromStr;
use rivulet_core::raster::{GeoTransform, Raster};
use rivulet_core::vector::{Polyline, Vertex};
use rivulet_core::{Error, Result};

use super::trace::TracePath;

/// How to handle a no-data elevation sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElevationNoData {
    /// Fail with [`Error::ElevationSample`]
    #[default]
    Fail,
    /// Reuse the previous valid z. A no-data first vertex still fails.
    CarryForward,
}

impl FromStr for ElevationNoData {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fail" | "error" => Ok(ElevationNoData::Fail),
            "carry" | "carry-forward" | "previous" => Ok(ElevationNoData::CarryForward),
            _ => Err(Error::InvalidParameter {
                name: "elevation_nodata",
                value: s.to_string(),
                reason: "expected fail or carry".into(),
            }),
        }
    }
}

/// Parameters for building trace geometry
#[derive(Debug, Clone, Default)]
pub struct BuildParams {
    /// Sample elevation by world position when the elevation grid differs
    /// from the flow grid, instead of failing with [`Error::GridMismatch`]
    pub resample: bool,
    /// No-data handling for elevation samples
    pub elevation_nodata: ElevationNoData,
    /// Exact seed coordinate to use for the first vertex instead of the seed
    /// cell center
    pub seed_location: Option<(f64, f64)>,
}

/// Build a polyline from a trace path.
///
/// `transform` and `shape` describe the flow direction grid the path was
/// traced on. With an elevation raster every vertex gets a z value; the
/// elevation raster must cover the same cells unless `params.resample` is set.
pub fn build_trace_geometry(
    path: &TracePath,
    transform: &GeoTransform,
    shape: (usize, usize),
    elevation: Option<&Raster<f64>>,
    params: &BuildParams,
) -> Result<Polyline> {
    if let Some(dem) = elevation {
        check_grid(dem, transform, shape, params.resample)?;
    }

    let mut vertices = Vec::with_capacity(path.len());
    let mut last_z: Option<f64> = None;

    for (i, &(row, col)) in path.cells().iter().enumerate() {
        let (x, y) = match params.seed_location {
            Some(seed) if i == 0 => seed,
            _ => transform.pixel_to_geo(col, row),
        };

        let Some(dem) = elevation else {
            vertices.push(Vertex::xy(x, y));
            continue;
        };

        let sample_error = |reason| Error::ElevationSample { row, col, x, y, reason };

        let sample = if params.resample {
            // Cell center, not the seed location: the trace is about cells
            let (cx, cy) = transform.pixel_to_geo(col, row);
            let (er, ec) = dem
                .geo_to_cell(cx, cy)
                .ok_or_else(|| sample_error("outside the elevation grid"))?;
            dem.get(er, ec)?
        } else {
            dem.get(row, col)?
        };

        let z = if dem.is_nodata(sample) {
            match (params.elevation_nodata, last_z) {
                (ElevationNoData::CarryForward, Some(z)) => z,
                (ElevationNoData::CarryForward, None) => {
                    return Err(sample_error("no-data with no previous elevation to carry"))
                }
                (ElevationNoData::Fail, _) => return Err(sample_error("no-data elevation")),
            }
        } else {
            sample
        };

        last_z = Some(z);
        vertices.push(Vertex::xyz(x, y, z));
    }

    Ok(Polyline::new(vertices))
}

fn check_grid(
    dem: &Raster<f64>,
    transform: &GeoTransform,
    shape: (usize, usize),
    resample: bool,
) -> Result<()> {
    if resample || dem.matches_grid(shape, transform) {
        return Ok(());
    }
    let describe = |shape: (usize, usize), gt: &GeoTransform| {
        format!(
            "{}x{} cells at ({}, {}) with cell size {}",
            shape.0,
            shape.1,
            gt.origin_x,
            gt.origin_y,
            gt.cell_size()
        )
    };
    Err(Error::GridMismatch {
        expected: describe(shape, transform),
        actual: describe(dem.shape(), dem.transform()),
    })
}

/// Builds trace geometry with a fixed set of [`BuildParams`]
#[derive(Debug, Clone, Default)]
pub struct PathBuilder {
    params: BuildParams,
}

impl PathBuilder {
    pub fn new(params: BuildParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BuildParams {
        &self.params
    }

    /// Build a polyline for a path traced on a grid of `shape` with `transform`
    pub fn build(
        &self,
        path: &TracePath,
        transform: &GeoTransform,
        shape: (usize, usize),
        elevation: Option<&Raster<f64>>,
    ) -> Result<Polyline> {
        build_trace_geometry(path, transform, shape, elevation, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::d8::D8Encoding;
    use crate::hydrology::flow_grid::FlowDirectionGrid;
    use crate::hydrology::trace::{trace_flow_path, TraceParams};
    use approx::assert_relative_eq;

    const GT: GeoTransform = GeoTransform {
        origin_x: 100.0,
        origin_y: 200.0,
        pixel_width: 10.0,
        pixel_height: -10.0,
        row_rotation: 0.0,
        col_rotation: 0.0,
    };

    /// 3x3 grid flowing SE along the diagonal into a sink at (2, 2)
    fn diagonal_path() -> (FlowDirectionGrid, TracePath) {
        let mut raster = Raster::from_vec(vec![2, 4, 4, 1, 2, 4, 1, 1, 0], 3, 3).unwrap();
        raster.set_transform(GT);
        let grid = FlowDirectionGrid::decode(&raster, &D8Encoding::esri()).unwrap();
        let path = trace_flow_path(&grid, 0, 0, &TraceParams::default()).unwrap();
        (grid, path)
    }

    fn dem(values: Vec<f64>) -> Raster<f64> {
        let mut dem = Raster::from_vec(values, 3, 3).unwrap();
        dem.set_transform(GT);
        dem.set_nodata(Some(-9999.0));
        dem
    }

    #[test]
    fn test_single_cell_path_is_transformed_cell() {
        let (grid, _) = diagonal_path();
        let path = trace_flow_path(&grid, 2, 2, &TraceParams::default()).unwrap();
        let line = build_trace_geometry(&path, &GT, grid.shape(), None, &BuildParams::default())
            .unwrap();

        let (x, y) = GT.pixel_to_geo(2, 2);
        assert_eq!(line.vertices(), &[Vertex::xy(x, y)]);
    }

    #[test]
    fn test_2d_vertices_at_cell_centers() {
        let (grid, path) = diagonal_path();
        let line = PathBuilder::default().build(&path, &GT, grid.shape(), None).unwrap();

        assert_eq!(line.len(), path.len());
        assert!(!line.has_z());
        let xy: Vec<_> = line.vertices().iter().map(|v| (v.x, v.y)).collect();
        assert_eq!(xy, vec![(105.0, 195.0), (115.0, 185.0), (125.0, 175.0)]);
    }

    #[test]
    fn test_draped_z_matches_elevation() {
        let (grid, path) = diagonal_path();
        let dem = dem(vec![30.5, 29.0, 28.0, 27.0, 20.25, 19.0, 18.0, 17.0, 10.125]);
        let line = PathBuilder::default()
            .build(&path, &GT, grid.shape(), Some(&dem))
            .unwrap();

        assert!(line.has_z());
        let z: Vec<f64> = line.vertices().iter().filter_map(|v| v.z).collect();
        for (actual, expected) in z.iter().zip([30.5, 20.25, 10.125]) {
            assert_relative_eq!(*actual, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_mismatched_grid() {
        let (grid, path) = diagonal_path();
        let mut shifted = dem(vec![1.0; 9]);
        shifted.set_transform(GeoTransform::new(110.0, 200.0, 10.0, -10.0));

        let err = PathBuilder::default()
            .build(&path, &GT, grid.shape(), Some(&shifted))
            .unwrap_err();
        assert!(matches!(err, Error::GridMismatch { .. }));

        let small = Raster::filled(2, 2, 1.0);
        let err = PathBuilder::default()
            .build(&path, &GT, grid.shape(), Some(&small))
            .unwrap_err();
        assert!(matches!(err, Error::GridMismatch { .. }));
    }

    #[test]
    fn test_resample_finer_elevation() {
        let (grid, path) = diagonal_path();
        // 6x6 grid at half the cell size over the same extent; z = 100 * row + col
        let mut fine = Raster::from_vec(
            (0..36).map(|i| (100 * (i / 6) + i % 6) as f64).collect(),
            6,
            6,
        )
        .unwrap();
        fine.set_transform(GeoTransform::new(100.0, 200.0, 5.0, -5.0));

        let builder = PathBuilder::new(BuildParams {
            resample: true,
            ..Default::default()
        });
        let line = builder.build(&path, &GT, grid.shape(), Some(&fine)).unwrap();
        let z: Vec<f64> = line.vertices().iter().filter_map(|v| v.z).collect();
        // Coarse centers land on fine cells (1, 1), (3, 3), (5, 5)
        assert_eq!(z, vec![101.0, 303.0, 505.0]);
    }

    #[test]
    fn test_resample_outside_elevation_extent() {
        let (grid, path) = diagonal_path();
        let mut partial = Raster::filled(1, 1, 5.0);
        partial.set_transform(GeoTransform::new(100.0, 200.0, 10.0, -10.0));

        let builder = PathBuilder::new(BuildParams {
            resample: true,
            ..Default::default()
        });
        let err = builder.build(&path, &GT, grid.shape(), Some(&partial)).unwrap_err();
        assert!(matches!(err, Error::ElevationSample { row: 1, col: 1, .. }));
    }

    #[test]
    fn test_nodata_elevation_policies() {
        let (grid, path) = diagonal_path();
        let dem = dem(vec![30.0, 0.0, 0.0, 0.0, -9999.0, 0.0, 0.0, 0.0, 10.0]);

        let err = PathBuilder::default()
            .build(&path, &GT, grid.shape(), Some(&dem))
            .unwrap_err();
        assert!(matches!(err, Error::ElevationSample { row: 1, col: 1, .. }));

        let carry = PathBuilder::new(BuildParams {
            elevation_nodata: ElevationNoData::CarryForward,
            ..Default::default()
        });
        let line = carry.build(&path, &GT, grid.shape(), Some(&dem)).unwrap();
        let z: Vec<f64> = line.vertices().iter().filter_map(|v| v.z).collect();
        assert_eq!(z, vec![30.0, 30.0, 10.0]);
    }

    #[test]
    fn test_carry_forward_cannot_start_on_nodata() {
        let (grid, path) = diagonal_path();
        let dem = dem(vec![-9999.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 1.0]);
        let carry = PathBuilder::new(BuildParams {
            elevation_nodata: ElevationNoData::CarryForward,
            ..Default::default()
        });
        let err = carry.build(&path, &GT, grid.shape(), Some(&dem)).unwrap_err();
        assert!(matches!(err, Error::ElevationSample { row: 0, col: 0, .. }));
    }

    #[test]
    fn test_seed_location_replaces_first_vertex() {
        let (grid, path) = diagonal_path();
        let builder = PathBuilder::new(BuildParams {
            seed_location: Some((101.0, 199.0)),
            ..Default::default()
        });
        let line = builder.build(&path, &GT, grid.shape(), None).unwrap();

        assert_eq!(line.len(), 3);
        assert_eq!(line.vertices()[0], Vertex::xy(101.0, 199.0));
        assert_eq!(line.vertices()[1], Vertex::xy(115.0, 185.0));
    }

    #[test]
    fn test_elevation_nodata_parse() {
        assert_eq!("carry".parse::<ElevationNoData>().unwrap(), ElevationNoData::CarryForward);
        assert_eq!("fail".parse::<ElevationNoData>().unwrap(), ElevationNoData::Fail);
        assert!("skip".parse::<ElevationNoData>().is_err());
    }
}
