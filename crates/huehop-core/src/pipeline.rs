//! The pipeline engine: ordered composition of algorithm invocations.
//!
//! A [`Pipeline`] is built from named steps resolved against a registry
//! *at build time*: a pipeline referencing an unknown or currently
//! unavailable algorithm is not buildable, which turns partial
//! availability into an explicit, inspectable decision instead of a
//! runtime surprise mid-chain.
//!
//! Execution threads each step's output into the next step's source
//! while the reference buffer stays fixed (or is rebound per step via a
//! named override). A failing step stops the chain at that point; the
//! failure is captured into that step's [`ExecutionRecord`], never
//! re-raised, so batch callers can always inspect partial results.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buffer::{Dimensions, PixelBuffer};
use crate::descriptor::{Algorithm, TransferError};
use crate::params::Params;
use crate::probe;
use crate::registry::{AlgorithmRegistry, RegistryError};

/// One configured invocation of a named algorithm.
///
/// Serializable so whole pipelines can be described in JSON:
///
/// ```json
/// [
///   { "algorithm": "reinhard", "params": { "intensity": 0.5 } },
///   { "algorithm": "lhm", "reference": "evening" }
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Name resolved against the registry at build time.
    pub algorithm: String,

    /// Parameters passed to every invocation of this step.
    #[serde(default)]
    pub params: Params,

    /// Key of a named reference buffer supplied to the builder; `None`
    /// uses the pipeline's primary reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl StepSpec {
    /// A step invoking `algorithm` with no parameters and the primary
    /// reference.
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            params: Params::new(),
            reference: None,
        }
    }

    /// Set the step's parameters.
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Rebind the step to a named reference buffer.
    #[must_use]
    pub fn with_reference(mut self, key: impl Into<String>) -> Self {
        self.reference = Some(key.into());
        self
    }
}

/// Errors from pipeline construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    /// A step's algorithm is unknown, unavailable, or failed to build.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A step declared a reference-override key the builder was never
    /// given. Fail fast rather than silently falling back to the
    /// primary reference.
    #[error("step {step_index} references unknown reference key `{key}`")]
    UnknownReference {
        /// Zero-based index of the offending step.
        step_index: usize,
        /// The missing key.
        key: String,
    },
}

/// Why a step failed, captured into its [`ExecutionRecord`].
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum StepError {
    /// The algorithm returned a transfer error.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The output broke the structural post-condition: a step's output
    /// must keep its input's width and height.
    #[error("output dimensions {actual} do not match step input {expected}")]
    ContractViolation {
        /// The step's input dimensions.
        expected: Dimensions,
        /// The dimensions the algorithm actually produced.
        actual: Dimensions,
    },

    /// The step exceeded the configured timeout.
    #[error("step timed out after {0:?}")]
    Timeout(Duration),

    /// The algorithm panicked; the panic was contained.
    #[error("algorithm panicked: {0}")]
    Panicked(String),
}

/// Outcome of one attempted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// The step produced a valid output buffer.
    Success,
    /// The step was never attempted. The engine stops recording at the
    /// first failure, so this only appears when a caller pads records
    /// out to the full chain length.
    Skipped,
    /// The step failed; see the record's error.
    Failed,
}

/// Overall outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    /// Every step succeeded.
    Success,
    /// Some step failed; earlier outputs are preserved.
    PartialFailure,
    /// The step list was empty; the source passes through unchanged.
    Empty,
}

/// Diagnostic record for one attempted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Zero-based position in the chain.
    pub step_index: usize,
    /// Name of the invoked algorithm.
    pub algorithm: String,
    /// Outcome of the attempt.
    pub status: StepStatus,
    /// Wall-clock time spent in the step.
    pub duration: Duration,
    /// Failure detail when `status` is [`StepStatus::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

/// Result of executing a pipeline against one source buffer.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Overall outcome.
    pub status: PipelineStatus,
    /// The final output, present only when every step succeeded (or
    /// the chain was empty, in which case it equals the source).
    pub final_buffer: Option<PixelBuffer>,
    /// One buffer per successfully completed step, in step order.
    pub intermediate: Vec<PixelBuffer>,
    /// One record per attempted step, in step order.
    pub records: Vec<ExecutionRecord>,
}

impl PipelineResult {
    /// The last successfully produced buffer: the final output on
    /// success, otherwise the best-effort partial result.
    #[must_use]
    pub fn last_buffer(&self) -> Option<&PixelBuffer> {
        self.final_buffer.as_ref().or_else(|| self.intermediate.last())
    }

    /// Returns `true` when every step succeeded (including the empty
    /// chain).
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(
            self.status,
            PipelineStatus::Success | PipelineStatus::Empty
        )
    }
}

/// A step resolved against the registry: ready to invoke.
#[derive(Debug)]
struct ResolvedStep {
    name: String,
    instance: Arc<dyn Algorithm>,
    params: Params,
    /// Per-step reference override; `None` uses the primary reference.
    reference: Option<Arc<PixelBuffer>>,
}

/// Builds a [`Pipeline`], resolving every step up front.
pub struct PipelineBuilder<'a> {
    registry: &'a AlgorithmRegistry,
    steps: Vec<StepSpec>,
    references: BTreeMap<String, Arc<PixelBuffer>>,
    step_timeout: Option<Duration>,
}

impl<'a> PipelineBuilder<'a> {
    /// Start a builder over `registry`.
    #[must_use]
    pub const fn new(registry: &'a AlgorithmRegistry) -> Self {
        Self {
            registry,
            steps: Vec::new(),
            references: BTreeMap::new(),
            step_timeout: None,
        }
    }

    /// Append one step.
    #[must_use]
    pub fn step(mut self, spec: StepSpec) -> Self {
        self.steps.push(spec);
        self
    }

    /// Append several steps in order.
    #[must_use]
    pub fn steps(mut self, specs: impl IntoIterator<Item = StepSpec>) -> Self {
        self.steps.extend(specs);
        self
    }

    /// Supply a named reference buffer that steps may rebind to via
    /// [`StepSpec::with_reference`].
    #[must_use]
    pub fn reference(mut self, key: impl Into<String>, buffer: PixelBuffer) -> Self {
        self.references.insert(key.into(), Arc::new(buffer));
        self
    }

    /// Bound each step's transfer by `limit`. A step that exceeds it is
    /// recorded as failed with [`StepError::Timeout`].
    #[must_use]
    pub const fn step_timeout(mut self, limit: Duration) -> Self {
        self.step_timeout = Some(limit);
        self
    }

    /// Resolve every step and produce an executable [`Pipeline`].
    ///
    /// # Errors
    ///
    /// Fails fast with [`BuildError::Registry`] when any step names an
    /// unknown or unavailable algorithm (or its factory fails), and
    /// with [`BuildError::UnknownReference`] when a step's override key
    /// was never supplied via [`reference`](Self::reference).
    pub fn build(self) -> Result<Pipeline, BuildError> {
        let mut resolved = Vec::with_capacity(self.steps.len());
        for (step_index, spec) in self.steps.into_iter().enumerate() {
            let instance = self.registry.get(&spec.algorithm)?;
            let reference = match spec.reference {
                None => None,
                Some(key) => Some(Arc::clone(self.references.get(&key).ok_or_else(
                    || BuildError::UnknownReference {
                        step_index,
                        key: key.clone(),
                    },
                )?)),
            };
            resolved.push(ResolvedStep {
                name: spec.algorithm,
                instance,
                params: spec.params,
                reference,
            });
        }
        Ok(Pipeline {
            steps: resolved,
            step_timeout: self.step_timeout,
        })
    }
}

/// An ordered, build-time-validated chain of transfer steps.
///
/// The pipeline borrows instances from the registry (behind `Arc`) and
/// owns nothing else but the step configuration, so it is cheap to keep
/// around and safe to run from several threads at once.
#[derive(Debug)]
pub struct Pipeline {
    steps: Vec<ResolvedStep>,
    step_timeout: Option<Duration>,
}

impl Pipeline {
    /// Start building a pipeline over `registry`.
    #[must_use]
    pub const fn builder(registry: &AlgorithmRegistry) -> PipelineBuilder<'_> {
        PipelineBuilder::new(registry)
    }

    /// Number of steps in the chain.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` when the chain has no steps.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Algorithm names in step order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Execute the chain against a source/reference pair.
    ///
    /// `source` feeds step 0; each successful step's output becomes the
    /// next step's source. The reference is `reference` unless a step
    /// declared an override at build time. An empty chain returns
    /// [`PipelineStatus::Empty`] with the source passed through
    /// unchanged.
    ///
    /// Never returns an error: per-step failures (transfer errors,
    /// post-condition violations, timeouts, contained panics) are
    /// recovered into the result's records.
    #[must_use]
    pub fn execute(&self, source: &PixelBuffer, reference: &PixelBuffer) -> PipelineResult {
        if self.steps.is_empty() {
            return PipelineResult {
                status: PipelineStatus::Empty,
                final_buffer: Some(source.clone()),
                intermediate: Vec::new(),
                records: Vec::new(),
            };
        }

        let mut current = source.clone();
        let mut intermediate = Vec::with_capacity(self.steps.len());
        let mut records = Vec::with_capacity(self.steps.len());

        for (step_index, step) in self.steps.iter().enumerate() {
            let step_reference = step.reference.as_deref().unwrap_or(reference);
            let expected = current.dimensions();
            let started = Instant::now();
            let outcome = self.run_step(step, &current, step_reference);
            let duration = started.elapsed();

            let error = match outcome {
                Ok(output) if output.dimensions() == expected => {
                    tracing::debug!(
                        step = step_index,
                        algorithm = %step.name,
                        ?duration,
                        "step succeeded",
                    );
                    records.push(ExecutionRecord {
                        step_index,
                        algorithm: step.name.clone(),
                        status: StepStatus::Success,
                        duration,
                        error: None,
                    });
                    intermediate.push(output.clone());
                    current = output;
                    continue;
                }
                Ok(output) => StepError::ContractViolation {
                    expected,
                    actual: output.dimensions(),
                },
                Err(err) => err,
            };

            tracing::warn!(
                step = step_index,
                algorithm = %step.name,
                %error,
                "step failed; stopping chain",
            );
            records.push(ExecutionRecord {
                step_index,
                algorithm: step.name.clone(),
                status: StepStatus::Failed,
                duration,
                error: Some(error),
            });
            return PipelineResult {
                status: PipelineStatus::PartialFailure,
                final_buffer: None,
                intermediate,
                records,
            };
        }

        PipelineResult {
            status: PipelineStatus::Success,
            final_buffer: Some(current),
            intermediate,
            records,
        }
    }

    /// Execute the chain independently for each source buffer.
    ///
    /// Runs are embarrassingly parallel (no shared mutable state
    /// crosses image runs), so they are spread across the rayon pool.
    /// Results come back in source order.
    #[must_use]
    pub fn execute_batch(
        &self,
        sources: &[PixelBuffer],
        reference: &PixelBuffer,
    ) -> Vec<PipelineResult> {
        sources
            .par_iter()
            .map(|source| self.execute(source, reference))
            .collect()
    }

    /// Run one step inside the failure boundary, honoring the timeout.
    fn run_step(
        &self,
        step: &ResolvedStep,
        source: &PixelBuffer,
        reference: &PixelBuffer,
    ) -> Result<PixelBuffer, StepError> {
        match self.step_timeout {
            None => transfer_guarded(&step.instance, source, reference, &step.params),
            Some(limit) => transfer_with_timeout(step, source, reference, limit),
        }
    }
}

/// Invoke a transfer, converting panics into step errors.
fn transfer_guarded(
    instance: &Arc<dyn Algorithm>,
    source: &PixelBuffer,
    reference: &PixelBuffer,
    params: &Params,
) -> Result<PixelBuffer, StepError> {
    match panic::catch_unwind(AssertUnwindSafe(|| {
        instance.transfer(source, reference, params)
    })) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) => Err(StepError::Transfer(err)),
        Err(payload) => Err(StepError::Panicked(probe::panic_message(payload.as_ref()))),
    }
}

/// Invoke a transfer on a worker thread with a deadline.
///
/// The inputs are cloned into the worker so it can outlive the caller;
/// on expiry the worker keeps running in the background and its late
/// result is discarded.
fn transfer_with_timeout(
    step: &ResolvedStep,
    source: &PixelBuffer,
    reference: &PixelBuffer,
    limit: Duration,
) -> Result<PixelBuffer, StepError> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let instance = Arc::clone(&step.instance);
    let source = source.clone();
    let reference = reference.clone();
    let params = step.params.clone();
    let spawned = std::thread::Builder::new()
        .name("huehop-step".to_owned())
        .spawn(move || {
            let _ = tx.send(transfer_guarded(&instance, &source, &reference, &params));
        });
    if let Err(err) = spawned {
        return Err(StepError::Panicked(format!(
            "failed to spawn step worker: {err}"
        )));
    }
    match rx.recv_timeout(limit) {
        Ok(outcome) => outcome,
        Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(StepError::Timeout(limit)),
        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(StepError::Panicked(
            "step worker exited without reporting".to_owned(),
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::buffer::ChannelOrder;
    use crate::descriptor::{from_fn, AlgorithmDescriptor, CapabilityError, FactoryError};

    /// Adds `delta` (wrapping) to every sample; a deterministic pure
    /// transform.
    fn add_descriptor(name: &str, delta: u8) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new(name, move || {
            Ok(Box::new(from_fn(move |source, _reference, _params| {
                let data = source.data().iter().map(|s| s.wrapping_add(delta)).collect();
                PixelBuffer::from_raw(source.width(), source.height(), source.order(), data)
                    .map_err(|e| TransferError::other(e.to_string()))
            })))
        })
    }

    /// Averages source samples toward the reference's top-left pixel,
    /// weighted by the `intensity` parameter.
    fn blend_descriptor(name: &str) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new(name, || {
            Ok(Box::new(from_fn(|source, reference, params| {
                let intensity = params.get_f64("intensity").unwrap_or(1.0);
                let target = reference
                    .pixel(0, 0)
                    .ok_or_else(|| TransferError::other("empty reference"))?;
                let data = source
                    .data()
                    .iter()
                    .enumerate()
                    .map(|(i, &s)| {
                        let t = f64::from(target[i % 3]);
                        (f64::from(s) * (1.0 - intensity) + t * intensity)
                            .round()
                            .clamp(0.0, 255.0) as u8
                    })
                    .collect();
                PixelBuffer::from_raw(source.width(), source.height(), source.order(), data)
                    .map_err(|e| TransferError::other(e.to_string()))
            })))
        })
    }

    fn failing_descriptor(name: &str) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new(name, || {
            Ok(Box::new(from_fn(|_, _, _| {
                Err(TransferError::other("deliberate failure"))
            })))
        })
    }

    /// Returns a buffer with the wrong dimensions, breaking the
    /// post-condition.
    fn shrinking_descriptor(name: &str) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new(name, || {
            Ok(Box::new(from_fn(|source, _, _| {
                PixelBuffer::filled(source.width() / 2 + 1, 1, source.order(), [0, 0, 0])
                    .map_err(|e| TransferError::other(e.to_string()))
            })))
        })
    }

    fn buffer(value: u8) -> PixelBuffer {
        PixelBuffer::filled(4, 4, ChannelOrder::Rgb, [value, value, value]).unwrap()
    }

    fn test_registry() -> AlgorithmRegistry {
        let mut registry = AlgorithmRegistry::new();
        registry.register(add_descriptor("add-one", 1)).unwrap();
        registry.register(add_descriptor("add-ten", 10)).unwrap();
        registry.register(blend_descriptor("blend")).unwrap();
        registry.register(failing_descriptor("fails")).unwrap();
        registry.register(shrinking_descriptor("shrinks")).unwrap();
        registry
    }

    #[test]
    fn build_fails_fast_on_unknown_algorithm() {
        let registry = test_registry();
        let err = Pipeline::builder(&registry)
            .step(StepSpec::new("add-one"))
            .step(StepSpec::new("no-such-algorithm"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Registry(RegistryError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn build_fails_fast_on_unavailable_algorithm() {
        let mut registry = AlgorithmRegistry::new();
        registry
            .register(
                add_descriptor("dark", 1)
                    .with_probe(|| Err(CapabilityError::new("needs cuda"))),
            )
            .unwrap();
        let err = Pipeline::builder(&registry)
            .step(StepSpec::new("dark"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Registry(RegistryError::Unavailable { .. })
        ));
    }

    #[test]
    fn build_fails_fast_on_construction_error() {
        let mut registry = AlgorithmRegistry::new();
        registry
            .register(AlgorithmDescriptor::new("hollow", || {
                Err(FactoryError::new("no workspace"))
            }))
            .unwrap();
        let err = Pipeline::builder(&registry)
            .step(StepSpec::new("hollow"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Registry(RegistryError::Construction { .. })
        ));
    }

    #[test]
    fn build_fails_fast_on_unknown_reference_key() {
        let registry = test_registry();
        let err = Pipeline::builder(&registry)
            .step(StepSpec::new("add-one"))
            .step(StepSpec::new("add-ten").with_reference("evening"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownReference {
                step_index: 1,
                key: "evening".to_owned(),
            },
        );
    }

    #[test]
    fn empty_pipeline_returns_source_unchanged() {
        let registry = test_registry();
        let pipeline = Pipeline::builder(&registry).build().unwrap();
        let source = buffer(37);
        let result = pipeline.execute(&source, &buffer(200));
        assert_eq!(result.status, PipelineStatus::Empty);
        assert_eq!(result.final_buffer.as_ref(), Some(&source));
        assert!(result.intermediate.is_empty());
        assert!(result.records.is_empty());
        assert!(result.succeeded());
    }

    #[test]
    fn output_threads_into_next_step() {
        let registry = test_registry();
        let pipeline = Pipeline::builder(&registry)
            .step(StepSpec::new("add-one"))
            .step(StepSpec::new("add-ten"))
            .build()
            .unwrap();
        let result = pipeline.execute(&buffer(0), &buffer(255));
        assert_eq!(result.status, PipelineStatus::Success);
        let final_buffer = result.final_buffer.unwrap();
        assert_eq!(final_buffer.pixel(0, 0), Some([11, 11, 11]));
        assert_eq!(result.intermediate.len(), 2);
        assert_eq!(result.intermediate[0].pixel(0, 0), Some([1, 1, 1]));
        assert_eq!(result.records.len(), 2);
        assert!(result
            .records
            .iter()
            .all(|r| r.status == StepStatus::Success));
    }

    #[test]
    fn execute_is_deterministic() {
        let registry = test_registry();
        let pipeline = Pipeline::builder(&registry)
            .step(StepSpec::new("blend").with_params(Params::new().with("intensity", 0.5)))
            .step(StepSpec::new("add-ten"))
            .build()
            .unwrap();
        let source = buffer(10);
        let reference = buffer(250);
        let first = pipeline.execute(&source, &reference);
        let second = pipeline.execute(&source, &reference);
        assert_eq!(first.final_buffer, second.final_buffer);
        assert_eq!(first.intermediate.len(), second.intermediate.len());
    }

    #[test]
    fn failure_at_step_k_preserves_earlier_outputs() {
        let registry = test_registry();
        let pipeline = Pipeline::builder(&registry)
            .step(StepSpec::new("add-one"))
            .step(StepSpec::new("add-ten"))
            .step(StepSpec::new("fails"))
            .step(StepSpec::new("add-one"))
            .build()
            .unwrap();
        let result = pipeline.execute(&buffer(0), &buffer(255));

        assert_eq!(result.status, PipelineStatus::PartialFailure);
        assert!(result.final_buffer.is_none());
        // Step 3 (index 2) failed: two intermediates, three records.
        assert_eq!(result.intermediate.len(), 2);
        assert_eq!(result.records.len(), 3);
        assert_eq!(result.records[0].status, StepStatus::Success);
        assert_eq!(result.records[1].status, StepStatus::Success);
        assert_eq!(result.records[2].status, StepStatus::Failed);
        assert!(matches!(
            result.records[2].error,
            Some(StepError::Transfer(_))
        ));
        // Best-effort partial result is step 2's output.
        assert_eq!(result.last_buffer().unwrap().pixel(0, 0), Some([11, 11, 11]));
    }

    #[test]
    fn contract_violation_stops_the_chain() {
        let registry = test_registry();
        let pipeline = Pipeline::builder(&registry)
            .step(StepSpec::new("add-one"))
            .step(StepSpec::new("shrinks"))
            .step(StepSpec::new("add-ten"))
            .build()
            .unwrap();
        let result = pipeline.execute(&buffer(0), &buffer(255));

        assert_eq!(result.status, PipelineStatus::PartialFailure);
        assert_eq!(result.intermediate.len(), 1);
        assert_eq!(result.records.len(), 2);
        assert!(matches!(
            result.records[1].error,
            Some(StepError::ContractViolation { .. })
        ));
    }

    #[test]
    fn panicking_algorithm_is_contained() {
        let mut registry = AlgorithmRegistry::new();
        registry
            .register(AlgorithmDescriptor::new("grenade", || {
                Ok(Box::new(from_fn(|_, _, _| panic!("kernel bug"))))
            }))
            .unwrap();
        let pipeline = Pipeline::builder(&registry)
            .step(StepSpec::new("grenade"))
            .build()
            .unwrap();
        let result = pipeline.execute(&buffer(0), &buffer(255));
        assert_eq!(result.status, PipelineStatus::PartialFailure);
        assert!(matches!(
            result.records[0].error,
            Some(StepError::Panicked(ref msg)) if msg == "kernel bug"
        ));
    }

    #[test]
    fn reference_override_rebinds_single_step() {
        let registry = test_registry();
        let white = buffer(255);
        let black = buffer(0);
        let pipeline = Pipeline::builder(&registry)
            .reference("black", black)
            .step(StepSpec::new("blend"))
            .step(StepSpec::new("blend").with_reference("black"))
            .build()
            .unwrap();
        // Step 0 blends fully toward the primary (white) reference,
        // step 1 fully toward the black override.
        let result = pipeline.execute(&buffer(128), &white);
        assert_eq!(result.status, PipelineStatus::Success);
        assert_eq!(result.intermediate[0].pixel(0, 0), Some([255, 255, 255]));
        assert_eq!(result.final_buffer.unwrap().pixel(0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn step_timeout_records_timeout_failure() {
        let mut registry = AlgorithmRegistry::new();
        registry
            .register(AlgorithmDescriptor::new("sleepy", || {
                Ok(Box::new(from_fn(|source, _, _| {
                    std::thread::sleep(Duration::from_secs(5));
                    Ok(source.clone())
                })))
            }))
            .unwrap();
        let pipeline = Pipeline::builder(&registry)
            .step(StepSpec::new("sleepy"))
            .step_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let result = pipeline.execute(&buffer(0), &buffer(255));
        assert_eq!(result.status, PipelineStatus::PartialFailure);
        assert!(matches!(
            result.records[0].error,
            Some(StepError::Timeout(_))
        ));
    }

    #[test]
    fn execute_batch_matches_sequential_runs() {
        let registry = test_registry();
        let pipeline = Pipeline::builder(&registry)
            .step(StepSpec::new("add-one"))
            .step(StepSpec::new("add-ten"))
            .build()
            .unwrap();
        let sources: Vec<PixelBuffer> = (0..8).map(|v| buffer(v * 16)).collect();
        let reference = buffer(255);

        let batch = pipeline.execute_batch(&sources, &reference);
        assert_eq!(batch.len(), sources.len());
        for (source, result) in sources.iter().zip(&batch) {
            let sequential = pipeline.execute(source, &reference);
            assert_eq!(result.final_buffer, sequential.final_buffer);
        }
    }

    #[test]
    fn step_spec_serde_round_trip() {
        let spec = StepSpec::new("reinhard")
            .with_params(Params::new().with("intensity", 0.5))
            .with_reference("evening");
        let json = serde_json::to_string(&spec).unwrap();
        let deserialized: StepSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, deserialized);
    }

    #[test]
    fn step_spec_json_defaults() {
        let spec: StepSpec = serde_json::from_str(r#"{"algorithm":"lhm"}"#).unwrap();
        assert_eq!(spec.algorithm, "lhm");
        assert!(spec.params.is_empty());
        assert!(spec.reference.is_none());
    }

    #[test]
    fn records_expose_step_names_and_durations() {
        let registry = test_registry();
        let pipeline = Pipeline::builder(&registry)
            .step(StepSpec::new("add-one"))
            .build()
            .unwrap();
        let result = pipeline.execute(&buffer(0), &buffer(255));
        let record = &result.records[0];
        assert_eq!(record.step_index, 0);
        assert_eq!(record.algorithm, "add-one");
        assert!(record.error.is_none());
    }

    #[test]
    fn step_names_in_order() {
        let registry = test_registry();
        let pipeline = Pipeline::builder(&registry)
            .step(StepSpec::new("add-ten"))
            .step(StepSpec::new("add-one"))
            .build()
            .unwrap();
        assert_eq!(pipeline.step_names(), ["add-ten", "add-one"]);
        assert_eq!(pipeline.len(), 2);
        assert!(!pipeline.is_empty());
    }
}
