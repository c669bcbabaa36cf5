//! Hybrid CPU/accelerator stepping.
//!
//! [`HybridStepper`] owns the per-instance policy state: the acceleration
//! toggle, the lazily probed [`AcceleratorBridge`], flat scratch buffers,
//! diagnostics and the last recorded error. A step tries the accelerator when
//! enabled and otherwise (or on any accelerator fault) runs the sequential
//! engine. Both paths produce the same active and candidate sets.

mod diagnostics;

pub use diagnostics::AccelerationDiagnostics;

use crate::accel::{AcceleratorBridge, Classification, NeighborHints, RawCoord, StageTimings};
use crate::config::HybridConfig;
use crate::cpu;
use crate::error::{AccelError, AccelResult};
use crate::sparse::World;

pub struct HybridStepper {
    config: HybridConfig,
    acceleration_enabled: bool,
    bridge: Option<AcceleratorBridge>,
    diagnostics: AccelerationDiagnostics,
    last_error: Option<String>,
    /// Flattened active batch, reused between steps.
    flat_active: Vec<RawCoord>,
    /// Flattened candidate batch, reused between steps.
    flat_candidates: Vec<RawCoord>,
    /// Consumed world kept for its allocations.
    spare: Option<World>,
}

impl Default for HybridStepper {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridStepper {
    pub fn new() -> Self {
        Self::with_config(HybridConfig::default())
    }

    pub fn with_config(config: HybridConfig) -> Self {
        Self {
            acceleration_enabled: config.acceleration_enabled,
            config,
            bridge: None,
            diagnostics: AccelerationDiagnostics::default(),
            last_error: None,
            flat_active: Vec::new(),
            flat_candidates: Vec::new(),
            spare: None,
        }
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// Advance `current` by one generation.
    ///
    /// Never fails: accelerator faults are recorded in [`last_error`] and the
    /// CPU engine produces the result instead.
    ///
    /// [`last_error`]: Self::last_error
    pub fn calculate_next_generation(&mut self, current: World) -> World {
        let mut next = self.spare.take().unwrap_or_default();

        if self.acceleration_enabled {
            match self.step_accelerated(&current, &mut next) {
                Ok(()) => {
                    self.diagnostics.last_used_accelerator = true;
                    self.diagnostics.accelerated_steps += 1;
                    self.spare = Some(current);
                    return next;
                }
                Err(err) => self.record_fallback(err),
            }
        }

        self.diagnostics.last_used_accelerator = false;
        cpu::step_into(&current, &mut next);
        self.spare = Some(current);
        next
    }

    /// Advance `world` by `n` generations.
    pub fn step_n(&mut self, mut world: World, n: u64) -> World {
        for _ in 0..n {
            world = self.calculate_next_generation(world);
        }
        world
    }

    pub fn set_acceleration_enabled(&mut self, enabled: bool) {
        if enabled != self.acceleration_enabled {
            tracing::info!(
                "acceleration {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.acceleration_enabled = enabled;
    }

    pub fn acceleration_enabled(&self) -> bool {
        self.acceleration_enabled
    }

    /// Whether the configured accelerator backend can run. Probes it on the
    /// first call.
    pub fn is_accelerator_available(&mut self) -> bool {
        self.bridge().is_available()
    }

    /// Name of the resolved backend (`"gpu"`, `"threads"` or `"unavailable"`).
    pub fn accelerator_backend(&mut self) -> &'static str {
        self.bridge().backend_name()
    }

    pub fn last_step_used_accelerator(&self) -> bool {
        self.diagnostics.last_used_accelerator
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn diagnostics(&self) -> &AccelerationDiagnostics {
        &self.diagnostics
    }

    pub fn reset_diagnostics(&mut self) {
        self.diagnostics = AccelerationDiagnostics::default();
    }

    /// Drop accelerator buffers and host scratch. The backend itself stays
    /// initialized.
    pub fn reset_accelerator_caches(&mut self) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.reset_caches();
        }
        self.flat_active = Vec::new();
        self.flat_candidates = Vec::new();
        self.spare = None;
    }

    #[doc(hidden)]
    pub fn inject_dispatch_failure(&mut self, reason: impl Into<String>) {
        self.bridge().inject_dispatch_failure(reason);
    }

    fn bridge(&mut self) -> &mut AcceleratorBridge {
        let config = &self.config;
        self.bridge
            .get_or_insert_with(|| AcceleratorBridge::new(config))
    }

    fn step_accelerated(&mut self, current: &World, next: &mut World) -> AccelResult<()> {
        self.flat_active.clear();
        self.flat_active
            .extend(current.active.iter().map(RawCoord::from));
        self.flat_candidates.clear();
        self.flat_candidates
            .extend(current.candidates.iter().map(RawCoord::from));

        let config = &self.config;
        let bridge = self
            .bridge
            .get_or_insert_with(|| AcceleratorBridge::new(config));
        let mut timings = StageTimings::default();
        let result =
            bridge.compute_classifications(&self.flat_active, &self.flat_candidates, &mut timings);
        self.diagnostics.timings += timings;
        let classification = result?;

        if classification.states.len() != self.flat_candidates.len() {
            return Err(AccelError::dispatch(format!(
                "backend returned {} states for {} candidates",
                classification.states.len(),
                self.flat_candidates.len()
            )));
        }

        let changed = self.merge(current, &classification, next);
        tracing::debug!(
            "accelerated step: {} candidates, {} changed, {:.3} ms",
            self.flat_candidates.len(),
            changed,
            timings.total.as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Build the next world from a classification. Returns the changed count.
    fn merge(&mut self, current: &World, classification: &Classification, next: &mut World) -> usize {
        next.clear();
        next.active.reserve(current.active.len());
        next.candidates.reserve(current.active.len());

        let mut changed = 0usize;
        for state in &classification.states {
            if state.will_be_alive() {
                next.active.insert(state.coord());
            }
            if state.changed() {
                changed += 1;
            }
        }

        next.candidates.union_with(&current.active);

        let required = changed.saturating_mul(self.config.min_hints_per_change);
        match &classification.hints {
            NeighborHints::Complete(hints) if hints.len() >= required => {
                for &hint in hints {
                    next.candidates.insert(hint.into());
                }
            }
            hints => {
                match hints.overflow_error() {
                    Some(overflow) => {
                        self.diagnostics.neighbor_overflow = true;
                        tracing::debug!("{overflow}; expanding changed cells on the CPU");
                    }
                    None => tracing::debug!(
                        "too few neighbor hints for {changed} changed cells; expanding on the CPU"
                    ),
                }
                for state in classification.states.iter().filter(|s| s.changed()) {
                    for c in state.coord().neighborhood() {
                        next.candidates.insert(c);
                    }
                }
            }
        }
        changed
    }

    fn record_fallback(&mut self, err: AccelError) {
        let message = err.to_string();
        if self.last_error.as_deref() == Some(message.as_str()) {
            tracing::debug!("accelerator step failed again, using CPU: {message}");
        } else {
            tracing::warn!("accelerator step failed, using CPU: {message}");
        }
        self.diagnostics.fallback_steps += 1;
        self.last_error = Some(message);
    }
}

impl std::fmt::Debug for HybridStepper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridStepper")
            .field("acceleration_enabled", &self.acceleration_enabled)
            .field("bridge", &self.bridge)
            .field("diagnostics", &self.diagnostics)
            .field("last_error", &self.last_error)
            .finish()
    }
}
