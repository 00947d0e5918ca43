//! Isolated capability probing.
//!
//! A probe answers one question for one descriptor: can its declared
//! requirements currently be satisfied? The answer is always a
//! [`ProbeResult`] value: a failing requirement check, a panic inside
//! the plugin's own dependency-resolution code, and a timeout all
//! become `available: false` with a diagnostic reason. Nothing escapes
//! the probe boundary, and probing one descriptor never touches the
//! state of another.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::descriptor::{AlgorithmDescriptor, ProbeFn};

/// Outcome of probing one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Whether the descriptor's requirements are currently satisfiable.
    pub available: bool,
    /// Diagnostic reason when unavailable.
    pub reason: Option<String>,
}

impl ProbeResult {
    /// A satisfied probe.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    /// An unsatisfied probe with a diagnostic reason.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
        }
    }
}

/// Probe one descriptor, optionally bounded by `timeout`.
///
/// Runs the descriptor's requirement-check hook inside a failure
/// boundary. With a timeout, the hook runs on a worker thread; on
/// expiry the probe reports unavailable and the worker is left to
/// finish in the background and its late result is discarded.
#[must_use]
pub fn probe_descriptor(
    descriptor: &AlgorithmDescriptor,
    timeout: Option<Duration>,
) -> ProbeResult {
    let result = match timeout {
        None => run_guarded(&descriptor.probe_hook()),
        Some(limit) => run_with_timeout(descriptor.probe_hook(), limit),
    };
    if !result.available {
        tracing::debug!(
            name = descriptor.name(),
            reason = result.reason.as_deref(),
            "probe failed",
        );
    }
    result
}

/// Run a probe hook inline, converting errors and panics into values.
fn run_guarded(hook: &ProbeFn) -> ProbeResult {
    match panic::catch_unwind(AssertUnwindSafe(|| hook())) {
        Ok(Ok(())) => ProbeResult::ok(),
        Ok(Err(err)) => ProbeResult::unavailable(err.to_string()),
        Err(payload) => ProbeResult::unavailable(panic_message(payload.as_ref())),
    }
}

/// Run a probe hook on a worker thread with a deadline.
fn run_with_timeout(hook: ProbeFn, limit: Duration) -> ProbeResult {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let spawned = std::thread::Builder::new()
        .name("huehop-probe".to_owned())
        .spawn(move || {
            // Receiver may be gone if the deadline already expired.
            let _ = tx.send(run_guarded(&hook));
        });
    if let Err(err) = spawned {
        return ProbeResult::unavailable(format!("failed to spawn probe worker: {err}"));
    }
    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
            ProbeResult::unavailable(format!("probe timed out after {limit:?}"))
        }
        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
            ProbeResult::unavailable("probe worker exited without reporting")
        }
    }
}

/// Extract a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked with a non-string payload".to_owned()
    }
}
