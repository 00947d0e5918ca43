//! huehop-core: Pluggable color transfer framework (sans-IO).
//!
//! Two cooperating pieces:
//!
//! * an [`AlgorithmRegistry`] of self-describing algorithm descriptors
//!   with isolated capability probing and lazy, memoized instantiation;
//! * a [`Pipeline`] engine that chains algorithm invocations, threading
//!   each step's output into the next against a fixed (or per-step
//!   rebound) reference image, with partial-failure semantics and
//!   per-step diagnostics.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! [`PixelBuffer`]s and returns structured data. Image decoding,
//! encoding, and the command line live in the `huehop` binary crate;
//! the built-in algorithms live in `huehop-algorithms`.

pub mod buffer;
pub mod descriptor;
pub mod params;
pub mod pipeline;
pub mod probe;
pub mod registry;

pub use buffer::{ChannelOrder, Dimensions, PixelBuffer};
pub use descriptor::{
    Algorithm, AlgorithmDescriptor, AlgorithmMetadata, CapabilityError, FactoryError,
    TransferError,
};
pub use params::{Params, Value};
pub use pipeline::{
    BuildError, ExecutionRecord, Pipeline, PipelineBuilder, PipelineResult, PipelineStatus,
    StepError, StepSpec, StepStatus,
};
pub use probe::ProbeResult;
pub use registry::{AlgorithmRegistry, RegistryError, TransferRunError};
