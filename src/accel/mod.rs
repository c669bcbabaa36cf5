//! Accelerator bridge.
//!
//! Classifies flat batches of candidates against a flat batch of living
//! cells on a compute backend and reports the neighborhoods of changed cells.
//! The backend is resolved once per bridge:
//!
//! - `Gpu`: `wgpu` compute shader (cargo feature `gpu`).
//! - `Threads`: private rayon pool on the host.
//! - `Unavailable`: the probe failed; every dispatch reports why.
//!
//! Nothing here panics on a backend fault. Failures come back as
//! [`AccelError`] and the caller decides how to recover.

mod buffers;
#[cfg(feature = "gpu")]
mod gpu;
mod threads;
mod timing;

use std::time::Instant;

pub use buffers::{CellState, Classification, NeighborHints, RawCoord};
pub use timing::StageTimings;

use self::buffers::sort_for_lookup;
use self::threads::ThreadBackend;
use crate::config::{AcceleratorBackend, HybridConfig};
use crate::error::{AccelError, AccelResult};

enum Backend {
    Threads(ThreadBackend),
    #[cfg(feature = "gpu")]
    Gpu(gpu::GpuBackend),
    Unavailable(String),
}

pub struct AcceleratorBridge {
    backend: Backend,
    neighbor_capacity: usize,
    /// Sorted copy of the active batch, reused between dispatches.
    sorted_active: Vec<RawCoord>,
    injected_failure: Option<String>,
}

impl AcceleratorBridge {
    /// Probe and initialize the backend selected by `config`.
    pub fn new(config: &HybridConfig) -> Self {
        let backend = resolve_backend(config);
        match &backend {
            Backend::Unavailable(reason) => {
                tracing::warn!("accelerator unavailable: {reason}");
            }
            Backend::Threads(pool) => {
                tracing::info!("accelerator backend: threads ({} workers)", pool.thread_count());
            }
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => {
                tracing::info!("accelerator backend: gpu ({})", gpu.adapter_name());
            }
        }
        Self {
            backend,
            neighbor_capacity: config.neighbor_capacity,
            sorted_active: Vec::new(),
            injected_failure: None,
        }
    }

    /// Whether dispatches can run. Never panics.
    pub fn is_available(&self) -> bool {
        !matches!(self.backend, Backend::Unavailable(_))
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Threads(_) => AcceleratorBackend::Threads.name(),
            #[cfg(feature = "gpu")]
            Backend::Gpu(_) => AcceleratorBackend::Gpu.name(),
            Backend::Unavailable(_) => "unavailable",
        }
    }

    pub fn neighbor_capacity(&self) -> usize {
        self.neighbor_capacity
    }

    /// Classify every candidate and collect the neighborhoods of changed cells.
    ///
    /// `states` is in candidate order. Stage durations are written into
    /// `timings` even when the call fails partway. Hint overflow is not an
    /// error: it comes back as [`NeighborHints::Overflowed`].
    pub fn compute_classifications(
        &mut self,
        active: &[RawCoord],
        candidates: &[RawCoord],
        timings: &mut StageTimings,
    ) -> AccelResult<Classification> {
        let start = Instant::now();
        let result = self.dispatch(active, candidates, timings);
        timings.total = start.elapsed();
        result
    }

    fn dispatch(
        &mut self,
        active: &[RawCoord],
        candidates: &[RawCoord],
        timings: &mut StageTimings,
    ) -> AccelResult<Classification> {
        if let Backend::Unavailable(reason) = &self.backend {
            return Err(AccelError::unavailable(reason.clone()));
        }

        let prepare_start = Instant::now();
        self.sorted_active.clear();
        self.sorted_active.extend_from_slice(active);
        sort_for_lookup(&mut self.sorted_active);
        let sort_time = prepare_start.elapsed();

        let result = match &mut self.backend {
            Backend::Threads(pool) => Ok(pool.classify(
                &self.sorted_active,
                candidates,
                self.neighbor_capacity,
                timings,
            )),
            #[cfg(feature = "gpu")]
            Backend::Gpu(gpu) => gpu.classify(
                &self.sorted_active,
                candidates,
                self.neighbor_capacity,
                timings,
            ),
            Backend::Unavailable(reason) => Err(AccelError::unavailable(reason.clone())),
        };
        timings.prepare += sort_time;

        // The injected fault replaces whatever the backend produced.
        match self.injected_failure.take() {
            Some(reason) => Err(AccelError::DispatchFailure(reason)),
            None => result,
        }
    }

    /// Release cached buffers and scratch without tearing down the backend.
    pub fn reset_caches(&mut self) {
        self.sorted_active = Vec::new();
        #[cfg(feature = "gpu")]
        if let Backend::Gpu(gpu) = &mut self.backend {
            gpu.reset_caches();
        }
    }

    /// Make the next dispatch fail with [`AccelError::DispatchFailure`].
    #[doc(hidden)]
    pub fn inject_dispatch_failure(&mut self, reason: impl Into<String>) {
        self.injected_failure = Some(reason.into());
    }
}

impl std::fmt::Debug for AcceleratorBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceleratorBridge")
            .field("backend", &self.backend_name())
            .field("neighbor_capacity", &self.neighbor_capacity)
            .finish()
    }
}

fn resolve_backend(config: &HybridConfig) -> Backend {
    match config.backend {
        Some(AcceleratorBackend::Threads) => thread_backend(config),
        Some(AcceleratorBackend::Gpu) => gpu_backend(),
        None => match gpu_backend() {
            Backend::Unavailable(reason) => {
                tracing::debug!("GPU probe failed ({reason}), using thread pool");
                thread_backend(config)
            }
            backend => backend,
        },
    }
}

fn thread_backend(config: &HybridConfig) -> Backend {
    match ThreadBackend::new(config.resolved_thread_count()) {
        Ok(pool) => Backend::Threads(pool),
        Err(err) => Backend::Unavailable(err.to_string()),
    }
}

#[cfg(feature = "gpu")]
fn gpu_backend() -> Backend {
    match gpu::GpuBackend::new() {
        Ok(gpu) => Backend::Gpu(gpu),
        Err(err) => Backend::Unavailable(err.to_string()),
    }
}

#[cfg(not(feature = "gpu"))]
fn gpu_backend() -> Backend {
    Backend::Unavailable("built without the `gpu` feature".to_string())
}
