//! Engine configuration from environment variables.

use std::env;
use std::sync::OnceLock;

/// Default number of inner streams a flat-map keeps subscribed at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Default number of items requested from each inner stream up front.
pub const DEFAULT_PREFETCH: usize = 32;

/// Tuning of a bounded-concurrency flat-map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatMapConfig {
    /// Inner streams subscribed at the same time. `usize::MAX` requests the
    /// outer stream without bound.
    pub max_concurrency: usize,

    /// Items requested from each inner stream ahead of downstream demand.
    /// `usize::MAX` requests inners without bound.
    pub prefetch: usize,

    /// Keep draining other inners after an error and report every error at
    /// the end instead of failing on the first one.
    pub delay_errors: bool,
}

impl Default for FlatMapConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            prefetch: DEFAULT_PREFETCH,
            delay_errors: false,
        }
    }
}

impl FlatMapConfig {
    /// One inner at a time: equivalent to sequential flattening.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            max_concurrency: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    #[must_use]
    pub fn with_delay_errors(mut self, delay_errors: bool) -> Self {
        self.delay_errors = delay_errors;
        self
    }
}

/// Process-wide engine settings.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    flat_map: FlatMapConfig,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FLOWLINE_FLATMAP_CONCURRENCY`: inner streams per flat-map (default: 32)
    /// - `FLOWLINE_FLATMAP_PREFETCH`: items prefetched per inner (default: 32)
    /// - `FLOWLINE_DELAY_ERRORS`: delay flat-map errors (default: false)
    ///
    /// Zero or unparsable numbers fall back to the defaults.
    pub fn from_env() -> Self {
        Self {
            flat_map: FlatMapConfig {
                max_concurrency: positive_var("FLOWLINE_FLATMAP_CONCURRENCY")
                    .unwrap_or(DEFAULT_MAX_CONCURRENCY),
                prefetch: positive_var("FLOWLINE_FLATMAP_PREFETCH").unwrap_or(DEFAULT_PREFETCH),
                delay_errors: env::var("FLOWLINE_DELAY_ERRORS")
                    .map(|v| v.to_lowercase() == "true" || v == "1")
                    .unwrap_or(false),
            },
        }
    }

    /// Configuration read from the environment on first use.
    pub fn global() -> &'static EngineConfig {
        static GLOBAL: OnceLock<EngineConfig> = OnceLock::new();
        GLOBAL.get_or_init(Self::from_env)
    }

    /// Settings used by `Multi::flat_map`.
    #[must_use]
    pub fn flat_map(&self) -> FlatMapConfig {
        self.flat_map
    }

    #[must_use]
    pub fn with_flat_map(mut self, flat_map: FlatMapConfig) -> Self {
        self.flat_map = flat_map;
        self
    }
}

fn positive_var(name: &str) -> Option<usize> {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}
