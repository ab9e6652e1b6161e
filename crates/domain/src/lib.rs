//! Pure domain of the transmutation pipeline.
//!
//! Requests, the slider-to-parameter mapping, compute graphs, and job state.
//! Nothing here performs I/O; randomness arrives as a closure.

pub mod error;
pub mod graph;
pub mod image;
pub mod job;
pub mod mode;
pub mod model;
pub mod params;
pub mod request;
pub mod result;

pub use error::DomainError;
pub use graph::{
    build_graph, Checkpoint, ComputeGraph, GraphBuilder, GraphNode, GraphSettings, GraphSpec,
    Link, LinkRef, NodeId, Operation, OperationKind, SamplerInputs, SamplerSettings,
};
pub use image::ImageRef;
pub use job::{BackendKind, Job, JobState};
pub use mode::TransmuteMode;
pub use model::ModelRef;
pub use params::{
    map_parameters, steps_for, BackendParameters, MappingInput, BASE_GUIDANCE_SCALE,
    DEFAULT_SCHEDULER, INPAINT_STRENGTH, NEGATIVE_PROMPT,
};
pub use request::{GenerationRequest, SLIDER_MAX, SLIDER_MIN};
pub use result::GeneratedResult;
