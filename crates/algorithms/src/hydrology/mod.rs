//! Downstream flow tracing over D8 flow direction grids
//!
//! - D8 encodings: ESRI, TauDEM, Whitebox, GRASS or custom code tables
//! - Flow grid: decode a direction raster once into canonical cells
//! - Trace: walk from a seed cell until a sink, the grid edge, no-data or a cycle
//! - Path builder: turn the visited cells into a 2D or elevation-draped line
//! - Trace Downstream: batch pipeline from seeds to line features

mod d8;
mod downstream;
mod flow_grid;
mod path_builder;
mod trace;

pub use d8::{D8Direction, D8Encoding, FlowCell};
pub use downstream::{
    into_collection, trace_all, trace_downstream, Seed, TraceDownstream, TraceDownstreamParams,
    TraceOutcome, TraceRequest,
};
pub use flow_grid::{read_flow_direction, FlowDirectionGrid, FlowDirectionLoader, FlowGridParams};
pub use path_builder::{build_trace_geometry, BuildParams, ElevationNoData, PathBuilder};
pub use trace::{trace_flow_path, CyclePolicy, FlowTracer, TraceParams, TracePath, TraceState};
