//! Trace Downstream
//!
//! Traces any number of seeds against one flow direction grid and returns
//! the paths as line features. Seeds are independent, so they are traced in
//! parallel over a single shared, read-only copy of each raster.

use geo::{Euclidean, Length};
use std::sync::Arc;
use rivulet_core::raster::Raster;
use rivulet_core::vector::{Feature, FeatureCollection};
use rivulet_core::{Algorithm, Error, ParallelAlgorithm, Result};

use crate::maybe_rayon::*;
use super::flow_grid::FlowDirectionGrid;
use super::path_builder::{build_trace_geometry, BuildParams};
use super::trace::{trace_flow_path, TraceParams, TracePath, TraceState};

/// Where a trace starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Seed {
    /// World coordinate in the flow grid's CRS
    Point { x: f64, y: f64 },
    /// Grid cell
    Cell { row: usize, col: usize },
}

impl Seed {
    /// Resolve to a grid cell
    pub fn cell(&self, grid: &FlowDirectionGrid) -> Result<(usize, usize)> {
        match *self {
            Seed::Cell { row, col } => Ok((row, col)),
            Seed::Point { x, y } => grid.locate(x, y).ok_or_else(|| Error::SeedOutOfBounds {
                location: format!("point ({}, {})", x, y),
                reason: "outside the flow direction grid",
            }),
        }
    }
}

/// Inputs for a batch of traces
#[derive(Debug, Clone)]
pub struct TraceRequest {
    pub grid: Arc<FlowDirectionGrid>,
    pub seeds: Vec<Seed>,
    /// Surface to drape the lines onto
    pub elevation: Option<Arc<Raster<f64>>>,
}

impl TraceRequest {
    pub fn new(grid: Arc<FlowDirectionGrid>, seeds: Vec<Seed>) -> Self {
        Self {
            grid,
            seeds,
            elevation: None,
        }
    }

    pub fn with_elevation(mut self, elevation: Arc<Raster<f64>>) -> Self {
        self.elevation = Some(elevation);
        self
    }
}

/// Parameters for [`trace_downstream`]
#[derive(Debug, Clone, Default)]
pub struct TraceDownstreamParams {
    pub trace: TraceParams,
    pub build: BuildParams,
    /// Start point seeds' first vertex at the exact seed coordinate
    pub keep_seed_location: bool,
}

/// One traced seed
#[derive(Debug, Clone)]
pub struct TraceOutcome {
    /// Index of the seed in the request
    pub seed_index: usize,
    pub path: TracePath,
    pub feature: Feature,
}

/// Trace every seed of the request in parallel.
///
/// Results keep seed order. The first failing seed in seed order fails the
/// whole batch, whatever order the workers finish in.
pub fn trace_all(request: &TraceRequest, params: &TraceDownstreamParams) -> Result<Vec<TraceOutcome>> {
    let results: Vec<Result<TraceOutcome>> = (0..request.seeds.len())
        .into_par_iter()
        .map(|index| trace_one(request, params, index))
        .collect();
    results.into_iter().collect()
}

fn trace_one(request: &TraceRequest, params: &TraceDownstreamParams, index: usize) -> Result<TraceOutcome> {
    let grid = request.grid.as_ref();
    let seed = request.seeds[index];
    let (row, col) = seed.cell(grid)?;
    let path = trace_flow_path(grid, row, col, &params.trace)?;

    let mut build = params.build.clone();
    if let (true, Seed::Point { x, y }) = (params.keep_seed_location, seed) {
        build.seed_location = Some((x, y));
    }
    let geometry = build_trace_geometry(
        &path,
        grid.transform(),
        grid.shape(),
        request.elevation.as_deref(),
        &build,
    )?;

    let length = geometry.to_line_string().length::<Euclidean>();
    let mut feature = Feature::new(geometry);
    feature.id = Some(index as u64);
    feature.set_property("orig_fid", index);
    feature.set_property("seed_row", row);
    feature.set_property("seed_col", col);
    feature.set_property("state", path.state().as_str());
    feature.set_property("cells", path.len());
    feature.set_property("steps", path.steps());
    feature.set_property("length", length);
    if feature.geometry.has_z() {
        feature.set_property("length_3d", feature.geometry.length_3d());
    }
    if let (TraceState::CycleDetected, Some((r, c))) = (path.state(), path.revisited()) {
        feature.set_property("cycle_row", r);
        feature.set_property("cycle_col", c);
    }

    Ok(TraceOutcome {
        seed_index: index,
        path,
        feature,
    })
}

/// Gather traced seeds into a feature collection tagged with the grid's CRS
pub fn into_collection(request: &TraceRequest, outcomes: Vec<TraceOutcome>) -> FeatureCollection {
    let mut collection = FeatureCollection::new();
    collection.crs = request.grid.crs().cloned();
    for outcome in outcomes {
        collection.push(outcome.feature);
    }
    collection
}

/// Trace every seed and collect the lines, tagged with the grid's CRS
pub fn trace_downstream(request: &TraceRequest, params: &TraceDownstreamParams) -> Result<FeatureCollection> {
    let outcomes = trace_all(request, params)?;
    Ok(into_collection(request, outcomes))
}

/// Trace Downstream algorithm
#[derive(Debug, Clone, Default)]
pub struct TraceDownstream;

impl Algorithm for TraceDownstream {
    type Input = TraceRequest;
    type Output = FeatureCollection;
    type Params = TraceDownstreamParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Trace Downstream"
    }

    fn description(&self) -> &'static str {
        "Follow D8 flow directions downhill from seed points"
    }

    /// Traces the seeds one after another on the calling thread
    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let outcomes = (0..input.seeds.len())
            .map(|index| trace_one(&input, &params, index))
            .collect::<Result<Vec<_>>>()?;
        Ok(into_collection(&input, outcomes))
    }
}

impl ParallelAlgorithm for TraceDownstream {
    fn execute_parallel(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        trace_downstream(&input, &params)
    }
}
