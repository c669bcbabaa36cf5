//! Configuration for the hybrid stepper and its accelerator bridge.

use std::sync::OnceLock;

/// Default capacity of the neighbor-hint buffer, in coordinates.
pub const DEFAULT_NEIGHBOR_CAPACITY: usize = 1 << 20;
/// Default hint-trust threshold: hints per changed cell.
pub const DEFAULT_MIN_HINTS_PER_CHANGE: usize = 9;

const ENV_ACCEL: &str = "SPARSE_LIFE_ACCEL";
const ENV_BACKEND: &str = "SPARSE_LIFE_BACKEND";

static PHYSICAL_CORES: OnceLock<usize> = OnceLock::new();

/// Which compute backend the accelerator bridge should drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcceleratorBackend {
    /// `wgpu` compute shader. Unavailable unless built with the `gpu` feature.
    Gpu,
    /// rayon thread pool on the host CPU.
    Threads,
}

impl AcceleratorBackend {
    pub fn name(self) -> &'static str {
        match self {
            Self::Gpu => "gpu",
            Self::Threads => "threads",
        }
    }
}

/// Configuration for a [`HybridStepper`](crate::hybrid::HybridStepper).
///
/// `HybridConfig::default()` keeps acceleration off and auto-selects the
/// backend once acceleration is turned on. [`HybridConfig::from_env`] layers
/// the `SPARSE_LIFE_ACCEL` and `SPARSE_LIFE_BACKEND` overrides on top.
#[derive(Clone, Debug)]
pub struct HybridConfig {
    /// Whether steps try the accelerator before the CPU engine.
    pub acceleration_enabled: bool,
    /// Backend selection. `None` means GPU when compiled in and an adapter
    /// exists, thread pool otherwise.
    pub backend: Option<AcceleratorBackend>,
    /// Threads for the thread-pool backend. `None` means auto-detect.
    pub thread_count: Option<usize>,
    /// Hard upper bound on threads regardless of auto-detection.
    pub max_threads: Option<usize>,
    /// Capacity of the neighbor-hint buffer, in coordinates.
    pub neighbor_capacity: usize,
    /// Hints are trusted only when at least this many arrive per changed cell.
    pub min_hints_per_change: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            acceleration_enabled: false,
            backend: None,
            thread_count: None,
            max_threads: None,
            neighbor_capacity: DEFAULT_NEIGHBOR_CAPACITY,
            min_hints_per_change: DEFAULT_MIN_HINTS_PER_CHANGE,
        }
    }
}

impl HybridConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(enabled) = std::env::var(ENV_ACCEL).ok().as_deref().and_then(parse_flag) {
            config.acceleration_enabled = enabled;
        }
        if let Ok(value) = std::env::var(ENV_BACKEND) {
            match parse_backend(&value) {
                Some(backend) => config.backend = backend,
                None => tracing::warn!("ignoring unrecognized {ENV_BACKEND}={value:?}"),
            }
        }
        config
    }

    pub fn acceleration_enabled(mut self, enabled: bool) -> Self {
        self.acceleration_enabled = enabled;
        self
    }

    /// Force a specific accelerator backend.
    pub fn backend(mut self, backend: AcceleratorBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set an explicit thread count for the thread-pool backend.
    pub fn thread_count(mut self, n: usize) -> Self {
        self.thread_count = Some(n.max(1));
        self
    }

    /// Set a hard upper bound on threads.
    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = Some(n.max(1));
        self
    }

    pub fn neighbor_capacity(mut self, n: usize) -> Self {
        self.neighbor_capacity = n;
        self
    }

    pub fn min_hints_per_change(mut self, n: usize) -> Self {
        self.min_hints_per_change = n;
        self
    }

    /// Thread count for the pool backend, falling back to auto-detect.
    pub(crate) fn resolved_thread_count(&self) -> usize {
        let mut threads = self.thread_count.unwrap_or_else(auto_pool_thread_count);
        if let Some(cap) = self.max_threads {
            threads = threads.min(cap);
        }
        threads.max(1)
    }
}

/// Lenient boolean: `1`/`true` and `0`/`false`, anything else is ignored.
fn parse_flag(value: &str) -> Option<bool> {
    let v = value.trim();
    if v == "1" || v.eq_ignore_ascii_case("true") {
        Some(true)
    } else if v == "0" || v.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// `Some(None)` selects auto; `None` means unrecognized.
fn parse_backend(value: &str) -> Option<Option<AcceleratorBackend>> {
    let v = value.trim();
    if v.eq_ignore_ascii_case("gpu") {
        Some(Some(AcceleratorBackend::Gpu))
    } else if v.eq_ignore_ascii_case("threads") || v.eq_ignore_ascii_case("cpu") {
        Some(Some(AcceleratorBackend::Threads))
    } else if v.is_empty() || v.eq_ignore_ascii_case("auto") {
        Some(None)
    } else {
        None
    }
}

#[inline]
fn physical_core_count() -> usize {
    *PHYSICAL_CORES.get_or_init(|| num_cpus::get_physical().max(1))
}

// Candidate classification is lookup bound; past eight cores extra threads
// mostly contend for memory bandwidth.
#[inline]
fn auto_pool_thread_count_for_physical(physical: usize) -> usize {
    let physical = physical.max(1);
    if physical <= 8 {
        physical
    } else {
        physical.div_ceil(2).max(6)
    }
}

#[inline]
fn auto_pool_thread_count() -> usize {
    auto_pool_thread_count_for_physical(physical_core_count())
}

#[cfg(test)]
mod tests {
    use super::{
        AcceleratorBackend, DEFAULT_MIN_HINTS_PER_CHANGE, HybridConfig,
        auto_pool_thread_count_for_physical, parse_backend, parse_flag,
    };

    #[test]
    fn defaults_keep_acceleration_off() {
        let config = HybridConfig::default();
        assert!(!config.acceleration_enabled);
        assert_eq!(config.backend, None);
        assert_eq!(config.min_hints_per_change, DEFAULT_MIN_HINTS_PER_CHANGE);
    }

    #[test]
    fn flags_parse_leniently() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("False"), Some(false));
        assert_eq!(parse_flag(""), None);
        assert_eq!(parse_flag("yes"), None);
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!(parse_backend("GPU"), Some(Some(AcceleratorBackend::Gpu)));
        assert_eq!(parse_backend("threads"), Some(Some(AcceleratorBackend::Threads)));
        assert_eq!(parse_backend("auto"), Some(None));
        assert_eq!(parse_backend("fpga"), None);
    }

    #[test]
    fn thread_count_respects_cap() {
        let config = HybridConfig::default().thread_count(12).max_threads(3);
        assert_eq!(config.resolved_thread_count(), 3);
        let config = HybridConfig::default().thread_count(0);
        assert_eq!(config.resolved_thread_count(), 1);
    }

    #[test]
    fn auto_pool_thread_count_targets_bandwidth_sweet_spot() {
        assert_eq!(auto_pool_thread_count_for_physical(0), 1);
        assert_eq!(auto_pool_thread_count_for_physical(4), 4);
        assert_eq!(auto_pool_thread_count_for_physical(8), 8);
        assert_eq!(auto_pool_thread_count_for_physical(9), 6);
        assert_eq!(auto_pool_thread_count_for_physical(16), 8);
        assert_eq!(auto_pool_thread_count_for_physical(24), 12);
    }
}
