use crate::accel::StageTimings;

/// Accelerator bookkeeping for one [`HybridStepper`](super::HybridStepper).
///
/// Timings and step counters accumulate until
/// [`reset_diagnostics`](super::HybridStepper::reset_diagnostics).
/// `neighbor_overflow` is sticky over the same window, and
/// `last_used_accelerator` describes only the most recent step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccelerationDiagnostics {
    pub timings: StageTimings,
    pub last_used_accelerator: bool,
    pub neighbor_overflow: bool,
    /// Steps whose result came from the accelerator.
    pub accelerated_steps: u64,
    /// Steps that tried the accelerator and fell back to the CPU engine.
    pub fallback_steps: u64,
}
