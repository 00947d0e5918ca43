//! huehop-algorithms: Built-in color transfer algorithms.
//!
//! Ships three algorithms behind [`AlgorithmDescriptor`]s:
//!
//! * `reinhard` -- mean/std matching in CIELAB (Reinhard et al., 2001)
//! * `lhm` -- per-channel linear histogram matching in RGB
//! * `identity` -- returns the source unchanged; useful for wiring and
//!   timing tests of pipelines
//!
//! All built-ins are pure Rust with no optional backends, so their
//! capability probes always succeed. The descriptors still go through
//! the registry's probe machinery like any third-party plugin would.

pub mod color;
pub mod lhm;
pub mod reinhard;

use huehop_core::descriptor::{from_fn, AlgorithmDescriptor, AlgorithmMetadata};
use huehop_core::registry::{AlgorithmRegistry, RegistryError};

pub use lhm::LinearHistogramMatching;
pub use reinhard::Reinhard;

/// Descriptors for every built-in algorithm, in a fixed order
/// (`reinhard`, `lhm`, `identity`).
#[must_use]
pub fn descriptors() -> Vec<AlgorithmDescriptor> {
    vec![
        AlgorithmDescriptor::new("reinhard", || Ok(Box::new(Reinhard)))
            .with_metadata(AlgorithmMetadata {
                description: "Mean and standard deviation matching in CIELAB".to_owned(),
                author: "Reinhard et al.".to_owned(),
                paper: Some("Color Transfer between Images (2001)".to_owned()),
                ..AlgorithmMetadata::default()
            }),
        AlgorithmDescriptor::new("lhm", || Ok(Box::new(LinearHistogramMatching)))
            .with_metadata(AlgorithmMetadata {
                description: "Per-channel linear histogram matching in RGB".to_owned(),
                paper: Some(
                    "Algorithms for Rendering in Artistic Styles (Hertzmann, 2001)".to_owned(),
                ),
                ..AlgorithmMetadata::default()
            }),
        AlgorithmDescriptor::new("identity", || {
            Ok(Box::new(from_fn(|source, _reference, _params| {
                Ok(source.clone())
            })))
        })
        .with_metadata(AlgorithmMetadata {
            description: "Pass the source through unchanged".to_owned(),
            ..AlgorithmMetadata::default()
        }),
    ]
}

/// Register every built-in with `registry`.
///
/// # Errors
///
/// Returns [`RegistryError::DuplicateName`] if a built-in's name is
/// already taken, which happens when called twice on one registry.
pub fn register_builtins(registry: &mut AlgorithmRegistry) -> Result<(), RegistryError> {
    for descriptor in descriptors() {
        tracing::debug!(name = descriptor.name(), "registering built-in");
        registry.register(descriptor)?;
    }
    Ok(())
}
