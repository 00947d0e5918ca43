//! The algorithm registry: owns the descriptor set, orchestrates
//! probing, and mediates safe, lazy, memoized access to instances.
//!
//! One descriptor's failure (a broken requirement check, a panicking
//! factory) never affects the availability of another. The registry is
//! a plain value with an explicit lifecycle: construct one per process,
//! or several independent ones (tests use restricted descriptor sets),
//! and drop it to tear every cached instance down.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use once_cell::sync::OnceCell;
use rayon::prelude::*;

use crate::buffer::PixelBuffer;
use crate::descriptor::{Algorithm, AlgorithmDescriptor, TransferError};
use crate::params::Params;
use crate::probe::{self, ProbeResult};

/// Errors from registration and instance resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A descriptor with this name is already registered.
    #[error("algorithm `{0}` is already registered")]
    DuplicateName(String),

    /// No descriptor with this name is registered.
    #[error("unknown algorithm `{0}`")]
    UnknownAlgorithm(String),

    /// The most recent probe found the requirements unmet.
    #[error("algorithm `{name}` is unavailable: {reason}")]
    Unavailable {
        /// Algorithm name.
        name: String,
        /// Diagnostic reason from the probe.
        reason: String,
    },

    /// The probe succeeded but the factory failed on first build.
    #[error("failed to construct algorithm `{name}`: {reason}")]
    Construction {
        /// Algorithm name.
        name: String,
        /// Diagnostic reason from the factory.
        reason: String,
    },
}

/// Error from [`AlgorithmRegistry::transfer`]: either the algorithm
/// could not be resolved or the transfer itself failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransferRunError {
    /// Resolution failed (unknown, unavailable, or construction error).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The algorithm itself failed during transfer.
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// One registered descriptor plus its memoized instance slot.
struct Entry {
    descriptor: AlgorithmDescriptor,
    /// Single-flight cache: concurrent first `get` calls for the same
    /// name serialize on this cell so the factory runs at most once.
    instance: OnceCell<Arc<dyn Algorithm>>,
}

/// Registry of color transfer algorithm descriptors.
///
/// Descriptors are registered up front; availability is decided by
/// probing (lazily on first query, or explicitly via
/// [`probe_all`](Self::probe_all), which also re-checks after the
/// environment changes); instances are constructed lazily and memoized.
pub struct AlgorithmRegistry {
    /// Registration order is preserved; listings depend on it.
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    probe_timeout: Option<Duration>,
    /// Memoized probe results, aligned with `entries` by index.
    probes: Mutex<Option<Vec<ProbeResult>>>,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AlgorithmRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            probe_timeout: None,
            probes: Mutex::new(None),
        }
    }

    /// Bound each individual probe by `limit`.
    ///
    /// A probe that exceeds the limit is reported unavailable with a
    /// timeout reason; the memo stays consistent either way.
    #[must_use]
    pub fn with_probe_timeout(mut self, limit: Duration) -> Self {
        self.probe_timeout = Some(limit);
        self
    }

    /// Register a descriptor.
    ///
    /// Invalidates any memoized probe results so a registry extended
    /// after its first query re-probes on the next one.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is taken.
    pub fn register(&mut self, descriptor: AlgorithmDescriptor) -> Result<(), RegistryError> {
        let name = descriptor.name().to_owned();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        tracing::debug!(name = %name, "registered algorithm descriptor");
        self.index.insert(name, self.entries.len());
        self.entries.push(Entry {
            descriptor,
            instance: OnceCell::new(),
        });
        *self.lock_probes() = None;
        Ok(())
    }

    /// Number of registered descriptors (available or not).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no descriptors are registered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered names in registration order, regardless of
    /// availability.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.descriptor.name().to_owned())
            .collect()
    }

    /// The descriptor registered under `name`, if any.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&AlgorithmDescriptor> {
        self.index.get(name).map(|&i| &self.entries[i].descriptor)
    }

    /// Probe every registered descriptor independently and refresh the
    /// memo, returning `(name, result)` pairs in registration order.
    ///
    /// Never fails as a whole: individual probe failures are captured
    /// per entry. Probes run in parallel; each result lands in its own
    /// indexed slot, so no updates are lost to a shared accumulator.
    pub fn probe_all(&self) -> Vec<(String, ProbeResult)> {
        let results = self.run_probes();
        *self.lock_probes() = Some(results.clone());
        self.pair_with_names(results)
    }

    /// Memoized probe results in registration order, probing lazily on
    /// first call. Unlike [`probe_all`](Self::probe_all) this never
    /// re-probes.
    pub fn probe_results(&self) -> Vec<(String, ProbeResult)> {
        let results = self.memoized_probes();
        self.pair_with_names(results)
    }

    /// Names whose most recent probe succeeded, in registration order.
    ///
    /// Triggers probing lazily on first call; call
    /// [`probe_all`](Self::probe_all) to refresh availability after the
    /// environment changes.
    pub fn list_available(&self) -> Vec<String> {
        self.entries
            .iter()
            .zip(self.memoized_probes())
            .filter(|(_, result)| result.available)
            .map(|(entry, _)| entry.descriptor.name().to_owned())
            .collect()
    }

    /// Resolve a ready-to-use instance by name, constructing and
    /// memoizing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownAlgorithm`] for an unregistered
    /// name, [`RegistryError::Unavailable`] when the most recent probe
    /// failed, and [`RegistryError::Construction`] when the factory
    /// itself fails or panics on first build.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Algorithm>, RegistryError> {
        let &i = self
            .index
            .get(name)
            .ok_or_else(|| RegistryError::UnknownAlgorithm(name.to_owned()))?;
        let probes = self.memoized_probes();
        let probe = probes
            .get(i)
            .cloned()
            .unwrap_or_else(|| ProbeResult::unavailable("probe memo out of sync"));
        if !probe.available {
            return Err(RegistryError::Unavailable {
                name: name.to_owned(),
                reason: probe
                    .reason
                    .unwrap_or_else(|| "requirements unmet".to_owned()),
            });
        }
        let entry = &self.entries[i];
        entry
            .instance
            .get_or_try_init(|| construct(&entry.descriptor))
            .map(Arc::clone)
    }

    /// Resolve `name` and run a single transfer.
    ///
    /// Convenience for one-shot callers that do not need a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`TransferRunError::Registry`] when resolution fails and
    /// [`TransferRunError::Transfer`] when the algorithm itself fails.
    pub fn transfer(
        &self,
        name: &str,
        source: &PixelBuffer,
        reference: &PixelBuffer,
        params: &Params,
    ) -> Result<PixelBuffer, TransferRunError> {
        let instance = self.get(name)?;
        Ok(instance.transfer(source, reference, params)?)
    }

    /// Run all probes in parallel, one result per entry, entry order.
    fn run_probes(&self) -> Vec<ProbeResult> {
        self.entries
            .par_iter()
            .map(|entry| probe::probe_descriptor(&entry.descriptor, self.probe_timeout))
            .collect()
    }

    /// Memoized probe results, probing once lazily when missing.
    fn memoized_probes(&self) -> Vec<ProbeResult> {
        let mut memo = self.lock_probes();
        if memo.is_none() {
            // Lazy first probe. Runs while holding the memo lock so a
            // concurrent query waits for one probe pass instead of
            // starting a second.
            *memo = Some(self.run_probes());
        }
        memo.clone().unwrap_or_default()
    }

    fn pair_with_names(&self, results: Vec<ProbeResult>) -> Vec<(String, ProbeResult)> {
        self.entries
            .iter()
            .zip(results)
            .map(|(entry, result)| (entry.descriptor.name().to_owned(), result))
            .collect()
    }

    /// Lock the probe memo, recovering from poisoning: a panicking
    /// probe hook is already contained, but a caller panic elsewhere
    /// must not wedge the registry.
    fn lock_probes(&self) -> std::sync::MutexGuard<'_, Option<Vec<ProbeResult>>> {
        self.probes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run a descriptor's factory inside a failure boundary.
fn construct(descriptor: &AlgorithmDescriptor) -> Result<Arc<dyn Algorithm>, RegistryError> {
    let factory = descriptor.factory_hook();
    match panic::catch_unwind(AssertUnwindSafe(|| factory())) {
        Ok(Ok(instance)) => {
            tracing::debug!(name = descriptor.name(), "constructed algorithm instance");
            Ok(Arc::from(instance))
        }
        Ok(Err(err)) => Err(RegistryError::Construction {
            name: descriptor.name().to_owned(),
            reason: err.to_string(),
        }),
        Err(payload) => Err(RegistryError::Construction {
            name: descriptor.name().to_owned(),
            reason: probe::panic_message(payload.as_ref()),
        }),
    }
}
