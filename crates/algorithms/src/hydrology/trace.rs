//! Downstream flow tracing
//!
//! Follows D8 flow directions from a seed cell until the flow stops:
//!
//! ```text
//!            ┌──> SinkReached      (sink cell is the last vertex)
//!  Seeking ──┼──> BoundaryReached  (next cell would leave the grid)
//!            ├──> NoDataReached    (next cell is no-data)
//!            └──> CycleDetected    (next cell was already visited)
//! ```
//!
//! Every step moves to a cell not yet on the path, so a trace performs at
//! most rows × cols lookups.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use rivulet_core::{Error, Result};

use super::d8::FlowCell;
use super::flow_grid::FlowDirectionGrid;

/// Tracer state. `Seeking` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceState {
    Seeking,
    SinkReached,
    BoundaryReached,
    NoDataReached,
    CycleDetected,
}

impl TraceState {
    pub fn is_terminal(self) -> bool {
        self != TraceState::Seeking
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TraceState::Seeking => "seeking",
            TraceState::SinkReached => "sink_reached",
            TraceState::BoundaryReached => "boundary_reached",
            TraceState::NoDataReached => "nodata_reached",
            TraceState::CycleDetected => "cycle_detected",
        }
    }
}

impl fmt::Display for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when flow directions loop back onto the path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    /// Return the path up to the loop, tagged [`TraceState::CycleDetected`]
    #[default]
    Flag,
    /// Fail with [`Error::CyclicFlow`]
    Error,
}

impl FromStr for CyclePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "flag" | "partial" => Ok(CyclePolicy::Flag),
            "error" | "fail" => Ok(CyclePolicy::Error),
            _ => Err(Error::InvalidParameter {
                name: "on_cycle",
                value: s.to_string(),
                reason: "expected flag or error".into(),
            }),
        }
    }
}

/// Parameters for flow tracing
#[derive(Debug, Clone, Default)]
pub struct TraceParams {
    pub cycle_policy: CyclePolicy,
}

/// Ordered cells visited by one trace, seed first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePath {
    cells: Vec<(usize, usize)>,
    state: TraceState,
    steps: usize,
    revisited: Option<(usize, usize)>,
}

impl TracePath {
    /// Cells as (row, col), seed first; never empty
    pub fn cells(&self) -> &[(usize, usize)] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Always false: a path holds at least its seed
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn seed(&self) -> (usize, usize) {
        self.cells[0]
    }

    pub fn terminal(&self) -> (usize, usize) {
        self.cells[self.cells.len() - 1]
    }

    /// Terminal state
    pub fn state(&self) -> TraceState {
        self.state
    }

    /// Number of flow directions followed, including the one that ended the trace
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Cell the flow returned to, for [`TraceState::CycleDetected`]
    pub fn revisited(&self) -> Option<(usize, usize)> {
        self.revisited
    }
}

/// Trace downstream from (seed_row, seed_col).
///
/// Fails with [`Error::SeedOutOfBounds`] if the seed is off the grid or on
/// a no-data cell, and with [`Error::CyclicFlow`] on a loop when
/// `params.cycle_policy` is [`CyclePolicy::Error`].
pub fn trace_flow_path(
    grid: &FlowDirectionGrid,
    seed_row: usize,
    seed_col: usize,
    params: &TraceParams,
) -> Result<TracePath> {
    let seed_location = || format!("cell ({}, {})", seed_row, seed_col);
    match grid.cell(seed_row, seed_col) {
        None => {
            return Err(Error::SeedOutOfBounds {
                location: seed_location(),
                reason: "outside the flow direction grid",
            })
        }
        Some(FlowCell::NoData) => {
            return Err(Error::SeedOutOfBounds {
                location: seed_location(),
                reason: "on a no-data cell",
            })
        }
        Some(_) => {}
    }

    let (rows, cols) = grid.shape();
    let mut cells = vec![(seed_row, seed_col)];
    let mut visited = HashSet::from([(seed_row, seed_col)]);
    let mut state = TraceState::Seeking;
    let mut steps = 0;
    let mut revisited = None;
    let (mut row, mut col) = (seed_row, seed_col);

    while !state.is_terminal() {
        let direction = match grid.cell(row, col) {
            Some(FlowCell::Flow(direction)) => direction,
            Some(FlowCell::Sink) => {
                state = TraceState::SinkReached;
                continue;
            }
            // Only cells checked below are ever appended, so the current cell is valid
            _ => {
                state = TraceState::NoDataReached;
                continue;
            }
        };
        steps += 1;

        let Some((next_row, next_col)) = direction.step(row, col, rows, cols) else {
            state = TraceState::BoundaryReached;
            continue;
        };

        if grid.cell(next_row, next_col) == Some(FlowCell::NoData) {
            state = TraceState::NoDataReached;
        } else if !visited.insert((next_row, next_col)) {
            state = TraceState::CycleDetected;
            revisited = Some((next_row, next_col));
        } else {
            cells.push((next_row, next_col));
            (row, col) = (next_row, next_col);
        }
    }

    if let (Some((r, c)), CyclePolicy::Error) = (revisited, params.cycle_policy) {
        return Err(Error::CyclicFlow { row: r, col: c, steps });
    }

    Ok(TracePath {
        cells,
        state,
        steps,
        revisited,
    })
}

/// Traces flow paths with a fixed set of [`TraceParams`]
#[derive(Debug, Clone, Default)]
pub struct FlowTracer {
    params: TraceParams,
}

impl FlowTracer {
    pub fn new(params: TraceParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TraceParams {
        &self.params
    }

    /// Trace from a seed cell
    pub fn trace(&self, grid: &FlowDirectionGrid, seed_row: usize, seed_col: usize) -> Result<TracePath> {
        trace_flow_path(grid, seed_row, seed_col, &self.params)
    }

    /// Trace from the cell containing a world coordinate
    pub fn trace_point(&self, grid: &FlowDirectionGrid, x: f64, y: f64) -> Result<TracePath> {
        let (row, col) = grid.locate(x, y).ok_or_else(|| Error::SeedOutOfBounds {
            location: format!("point ({}, {})", x, y),
            reason: "outside the flow direction grid",
        })?;
        self.trace(grid, row, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::d8::{D8Direction, D8Encoding};
    use rivulet_core::{GeoTransform, Raster};

    fn esri_grid(codes: Vec<i32>, rows: usize, cols: usize) -> FlowDirectionGrid {
        let mut raster = Raster::from_vec(codes, rows, cols).unwrap();
        raster.set_nodata(Some(-1));
        FlowDirectionGrid::decode(&raster, &D8Encoding::esri()).unwrap()
    }

    /// 5x5 grid where every cell flows toward the center sink
    fn converging_grid() -> FlowDirectionGrid {
        let mut codes = Vec::with_capacity(25);
        for row in 0..5i32 {
            for col in 0..5i32 {
                let code = match ((2 - row).signum(), (2 - col).signum()) {
                    (0, 0) => 0,
                    (0, 1) => 1,    // E
                    (1, 1) => 2,    // SE
                    (1, 0) => 4,    // S
                    (1, -1) => 8,   // SW
                    (0, -1) => 16,  // W
                    (-1, -1) => 32, // NW
                    (-1, 0) => 64,  // N
                    (-1, 1) => 128, // NE
                    _ => unreachable!(),
                };
                codes.push(code);
            }
        }
        esri_grid(codes, 5, 5)
    }

    #[test]
    fn test_corner_seed_reaches_center_sink() {
        let grid = converging_grid();
        let path = trace_flow_path(&grid, 0, 0, &TraceParams::default()).unwrap();

        assert_eq!(path.cells(), &[(0, 0), (1, 1), (2, 2)]);
        assert_eq!(path.state(), TraceState::SinkReached);
        assert_eq!(path.terminal(), (2, 2));

        let path = trace_flow_path(&grid, 4, 0, &TraceParams::default()).unwrap();
        assert_eq!(path.cells(), &[(4, 0), (3, 1), (2, 2)]);
    }

    #[test]
    fn test_seed_on_sink_is_single_cell() {
        let grid = converging_grid();
        let path = trace_flow_path(&grid, 2, 2, &TraceParams::default()).unwrap();
        assert_eq!(path.cells(), &[(2, 2)]);
        assert_eq!(path.state(), TraceState::SinkReached);
        assert_eq!(path.steps(), 0);
    }

    #[test]
    fn test_two_cell_loop_is_flagged() {
        // A (0,0) flows E into B (0,1), B flows W back into A
        let grid = esri_grid(vec![1, 16], 1, 2);
        let path = trace_flow_path(&grid, 0, 0, &TraceParams::default()).unwrap();

        assert_eq!(path.state(), TraceState::CycleDetected);
        assert_eq!(path.steps(), 2);
        assert_eq!(path.cells(), &[(0, 0), (0, 1)]);
        assert_eq!(path.revisited(), Some((0, 0)));
    }

    #[test]
    fn test_loop_fails_under_error_policy() {
        let grid = esri_grid(vec![1, 16], 1, 2);
        let params = TraceParams {
            cycle_policy: CyclePolicy::Error,
        };
        let err = trace_flow_path(&grid, 0, 0, &params).unwrap_err();
        assert!(matches!(err, Error::CyclicFlow { row: 0, col: 0, steps: 2 }));
    }

    #[test]
    fn test_edge_seed_flowing_off_grid() {
        // Top row flows N, off the grid
        let grid = esri_grid(vec![64, 64, 64, 4, 4, 4, 0, 0, 0], 3, 3);
        let path = trace_flow_path(&grid, 0, 1, &TraceParams::default()).unwrap();

        assert_eq!(path.cells(), &[(0, 1)]);
        assert_eq!(path.state(), TraceState::BoundaryReached);
        assert_eq!(path.steps(), 1);
    }

    #[test]
    fn test_boundary_after_several_steps() {
        // Everything flows E; the trace ends on the east edge
        let grid = esri_grid(vec![1; 8], 2, 4);
        let path = trace_flow_path(&grid, 1, 0, &TraceParams::default()).unwrap();
        assert_eq!(path.cells(), &[(1, 0), (1, 1), (1, 2), (1, 3)]);
        assert_eq!(path.state(), TraceState::BoundaryReached);
    }

    #[test]
    fn test_stops_before_nodata() {
        let grid = esri_grid(vec![1, 1, -1, 0], 1, 4);
        let path = trace_flow_path(&grid, 0, 0, &TraceParams::default()).unwrap();
        assert_eq!(path.cells(), &[(0, 0), (0, 1)]);
        assert_eq!(path.state(), TraceState::NoDataReached);
    }

    #[test]
    fn test_invalid_seeds() {
        let grid = esri_grid(vec![1, -1], 1, 2);
        let params = TraceParams::default();

        assert!(matches!(
            trace_flow_path(&grid, 0, 1, &params),
            Err(Error::SeedOutOfBounds { reason: "on a no-data cell", .. })
        ));
        assert!(matches!(
            trace_flow_path(&grid, 1, 0, &params),
            Err(Error::SeedOutOfBounds { reason: "outside the flow direction grid", .. })
        ));
    }

    #[test]
    fn test_trace_point_uses_transform() {
        let mut grid = converging_grid();
        grid.set_transform(GeoTransform::new(1000.0, 2000.0, 10.0, -10.0));
        let tracer = FlowTracer::default();

        // Inside cell (0, 4), which flows SW
        let path = tracer.trace_point(&grid, 1045.0, 1995.0).unwrap();
        assert_eq!(path.cells(), &[(0, 4), (1, 3), (2, 2)]);

        assert!(matches!(
            tracer.trace_point(&grid, 999.0, 1995.0),
            Err(Error::SeedOutOfBounds { .. })
        ));
    }

    /// Deterministic pseudo-random ESRI grid with sinks and no-data sprinkled in
    fn scrambled_grid(rows: usize, cols: usize) -> FlowDirectionGrid {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let codes = (0..rows * cols)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                match (state >> 33) % 11 {
                    8 => 0,
                    9 => -1,
                    k => 1 << k.min(7),
                }
            })
            .collect();
        esri_grid(codes, rows, cols)
    }

    #[test]
    fn test_every_seed_terminates_without_repeats() {
        let grid = scrambled_grid(12, 9);
        let params = TraceParams::default();
        let limit = grid.rows() * grid.cols();

        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                let path = match trace_flow_path(&grid, row, col, &params) {
                    Ok(path) => path,
                    Err(Error::SeedOutOfBounds { .. }) => continue,
                    Err(e) => panic!("unexpected error: {}", e),
                };
                assert!(path.state().is_terminal());
                assert!(path.steps() <= limit);
                assert_eq!(path.seed(), (row, col));

                let unique: HashSet<_> = path.cells().iter().collect();
                assert_eq!(unique.len(), path.len(), "repeated cell from ({}, {})", row, col);

                // Consecutive cells are D8 neighbors
                for pair in path.cells().windows(2) {
                    let dr = pair[1].0 as isize - pair[0].0 as isize;
                    let dc = pair[1].1 as isize - pair[0].1 as isize;
                    assert!(D8Direction::ALL.iter().any(|d| d.offset() == (dr, dc)));
                }
            }
        }
    }

    #[test]
    fn test_trace_is_deterministic() {
        let grid = scrambled_grid(10, 10);
        let params = TraceParams::default();
        for (row, col) in [(0, 0), (3, 7), (9, 9), (5, 2)] {
            let first = trace_flow_path(&grid, row, col, &params);
            let second = trace_flow_path(&grid, row, col, &params);
            match (first, second) {
                (Ok(a), Ok(b)) => assert_eq!(a, b),
                (Err(_), Err(_)) => {}
                _ => panic!("trace from ({}, {}) changed outcome", row, col),
            }
        }
    }

    #[test]
    fn test_cycle_policy_parse() {
        assert_eq!("flag".parse::<CyclePolicy>().unwrap(), CyclePolicy::Flag);
        assert_eq!("ERROR".parse::<CyclePolicy>().unwrap(), CyclePolicy::Error);
        assert!("maybe".parse::<CyclePolicy>().is_err());
    }
}
