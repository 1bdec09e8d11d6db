//! # Rivulet Algorithms
//!
//! Flow path tracing for Rivulet.
//!
//! ## Algorithm Categories
//!
//! - **hydrology**: D8 flow direction decoding, downstream tracing, path geometry

pub mod hydrology;
mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        read_flow_direction, trace_downstream, trace_flow_path, BuildParams, CyclePolicy,
        D8Encoding, ElevationNoData, FlowDirectionGrid, FlowDirectionLoader, FlowGridParams,
        Seed, TraceDownstream, TraceDownstreamParams, TraceParams, TraceRequest, TraceState,
    };
    pub use rivulet_core::prelude::*;
}
