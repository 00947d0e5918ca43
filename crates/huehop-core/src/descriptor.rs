//! The plugin contract: algorithm instances and their static
//! registration records.
//!
//! An [`AlgorithmDescriptor`] is the only thing a plugin hands to the
//! registry: a stable name, declared capability requirements, an
//! optional probe hook that checks those requirements, and a factory
//! that builds the actual [`Algorithm`] instance. The descriptor is
//! registered unconditionally; whether it currently *works* is decided
//! later by probing (see [`crate::probe`]).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::params::Params;

/// Error raised by an algorithm while performing a transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum TransferError {
    /// A recognized parameter carried an unusable value.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter key.
        name: String,
        /// What was wrong with the value.
        reason: String,
    },

    /// Any other algorithm-internal failure.
    #[error("{0}")]
    Other(String),
}

impl TransferError {
    /// An [`InvalidParameter`](Self::InvalidParameter) error.
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// An [`Other`](Self::Other) error with the given message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// An unsatisfied capability requirement, reported by a probe hook.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CapabilityError(String);

impl CapabilityError {
    /// Create a capability error with the given diagnostic message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A factory failure: the probe said available but construction failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FactoryError(String);

impl FactoryError {
    /// Create a factory error with the given diagnostic message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A constructed, ready-to-invoke color transfer operator.
///
/// Instances are owned by the registry's cache and handed out behind
/// `Arc`, so the same instance may serve concurrent invocations. The
/// contract for implementors:
///
/// - `transfer` is a pure function over its explicit inputs: no hidden
///   mutable state between calls (or internal synchronization if state
///   is unavoidable);
/// - the output buffer has the same width and height as `source`
///   (`reference` may differ; the pipeline checks this post-condition
///   and rejects violations);
/// - unrecognized parameter keys are ignored, not rejected.
pub trait Algorithm: Send + Sync {
    /// Transfer color characteristics of `reference` onto `source`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] when a recognized parameter is
    /// unusable or the transform itself fails.
    fn transfer(
        &self,
        source: &PixelBuffer,
        reference: &PixelBuffer,
        params: &Params,
    ) -> Result<PixelBuffer, TransferError>;
}

impl fmt::Debug for dyn Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<dyn Algorithm>")
    }
}

/// Wrap a closure as an [`Algorithm`].
///
/// Handy for small operators and for tests that need a throwaway
/// deterministic transform.
pub fn from_fn<F>(f: F) -> impl Algorithm
where
    F: Fn(&PixelBuffer, &PixelBuffer, &Params) -> Result<PixelBuffer, TransferError>
        + Send
        + Sync
        + 'static,
{
    struct FnAlgorithm<F>(F);

    impl<F> Algorithm for FnAlgorithm<F>
    where
        F: Fn(&PixelBuffer, &PixelBuffer, &Params) -> Result<PixelBuffer, TransferError>
            + Send
            + Sync
            + 'static,
    {
        fn transfer(
            &self,
            source: &PixelBuffer,
            reference: &PixelBuffer,
            params: &Params,
        ) -> Result<PixelBuffer, TransferError> {
            (self.0)(source, reference, params)
        }
    }

    FnAlgorithm(f)
}

/// Descriptive metadata attached to a descriptor.
///
/// Plain documentation for listings and tooling; nothing here affects
/// probing or execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmMetadata {
    /// One-line description of the transform.
    pub description: String,
    /// Author or origin of the method.
    pub author: String,
    /// Paper the method is based on, if any.
    pub paper: Option<String>,
    /// Project or reference URL, if any.
    pub url: Option<String>,
    /// Version of the implementation.
    pub version: String,
}

impl Default for AlgorithmMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            author: String::new(),
            paper: None,
            url: None,
            version: "1.0.0".to_owned(),
        }
    }
}

/// Probe hook shared with timeout worker threads.
pub type ProbeFn = Arc<dyn Fn() -> Result<(), CapabilityError> + Send + Sync>;

/// Factory shared with the registry's instance cache.
pub type FactoryFn = Arc<dyn Fn() -> Result<Box<dyn Algorithm>, FactoryError> + Send + Sync>;

/// Static registration record for one algorithm.
///
/// Built once, immutable thereafter. The probe hook defaults to
/// "always satisfiable" for algorithms with no optional dependencies.
///
/// ```rust
/// # use huehop_core::descriptor::{from_fn, AlgorithmDescriptor, CapabilityError};
/// let descriptor = AlgorithmDescriptor::new("invert", || {
///     Ok(Box::new(from_fn(|source, _reference, _params| {
///         Ok(source.clone())
///     })))
/// })
/// .with_requirement("none")
/// .with_probe(|| Err(CapabilityError::new("disabled in this build")));
/// assert_eq!(descriptor.name(), "invert");
/// ```
#[derive(Clone)]
pub struct AlgorithmDescriptor {
    name: String,
    requirements: Vec<String>,
    metadata: AlgorithmMetadata,
    probe: ProbeFn,
    factory: FactoryFn,
}

impl AlgorithmDescriptor {
    /// Create a descriptor with the given unique name and factory.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Algorithm>, FactoryError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            requirements: Vec::new(),
            metadata: AlgorithmMetadata::default(),
            probe: Arc::new(|| Ok(())),
            factory: Arc::new(factory),
        }
    }

    /// Declare a capability requirement (opaque diagnostic string).
    #[must_use]
    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    /// Attach descriptive metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: AlgorithmMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach the requirement-check hook run by the capability probe.
    ///
    /// The hook may lazily load the plugin's own dependency graph; the
    /// probe runs it inside a failure boundary, so it is allowed to
    /// fail, or even panic, without affecting other descriptors.
    #[must_use]
    pub fn with_probe<P>(mut self, probe: P) -> Self
    where
        P: Fn() -> Result<(), CapabilityError> + Send + Sync + 'static,
    {
        self.probe = Arc::new(probe);
        self
    }

    /// The unique algorithm name used to resolve it in a registry.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared capability requirements, in declaration order.
    #[must_use]
    pub fn requirements(&self) -> &[String] {
        &self.requirements
    }

    /// Descriptive metadata.
    #[must_use]
    pub const fn metadata(&self) -> &AlgorithmMetadata {
        &self.metadata
    }

    /// Clone of the probe hook (cheap; `Arc`).
    #[must_use]
    pub(crate) fn probe_hook(&self) -> ProbeFn {
        Arc::clone(&self.probe)
    }

    /// Clone of the factory (cheap; `Arc`).
    #[must_use]
    pub(crate) fn factory_hook(&self) -> FactoryFn {
        Arc::clone(&self.factory)
    }
}

impl fmt::Debug for AlgorithmDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmDescriptor")
            .field("name", &self.name)
            .field("requirements", &self.requirements)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
