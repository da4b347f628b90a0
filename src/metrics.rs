//! Prometheus metrics integration for the script host.

use prometheus::{Counter, Histogram, Registry};

/// Configuration for host metrics collection.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Metric prefix for all host metrics.
    pub prefix: String,
    /// Whether to collect detailed timing histograms.
    pub detailed_timing: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prefix: "script_host".to_string(),
            detailed_timing: true,
        }
    }
}

impl MetricsConfig {
    /// Create a new metrics configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metric prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Enable or disable detailed timing.
    pub fn with_detailed_timing(mut self, enabled: bool) -> Self {
        self.detailed_timing = enabled;
        self
    }
}

/// Host metrics collector.
///
/// Attach to a [`crate::ScriptHost`] with
/// [`set_metrics`](crate::ScriptHost::set_metrics); the host records loads,
/// unloads, reload failures, and suspected leaks as they happen.
pub struct HostMetrics {
    config: MetricsConfig,
    registry: Registry,
    modules_loaded: Counter,
    modules_unloaded: Counter,
    reload_failures: Counter,
    unload_leaks: Counter,
    load_duration: Histogram,
    unload_passes: Histogram,
}

impl HostMetrics {
    /// Create a new metrics collector with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        let registry = Registry::new();

        let modules_loaded = Counter::new(
            format!("{}_loaded_total", config.prefix),
            "Total number of modules loaded",
        )
        .unwrap();

        let modules_unloaded = Counter::new(
            format!("{}_unloaded_total", config.prefix),
            "Total number of modules fully unloaded",
        )
        .unwrap();

        let reload_failures = Counter::new(
            format!("{}_reload_failures_total", config.prefix),
            "Total number of failed reloads",
        )
        .unwrap();

        let unload_leaks = Counter::new(
            format!("{}_unload_leaks_total", config.prefix),
            "Total number of unloads that exhausted the wait bound",
        )
        .unwrap();

        let load_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                format!("{}_load_duration_seconds", config.prefix),
                "Module load duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .unwrap();

        let unload_passes = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                format!("{}_unload_passes", config.prefix),
                "Completion checks spent waiting for an unload",
            )
            .buckets(vec![0.0, 1.0, 2.0, 3.0, 5.0, 10.0]),
        )
        .unwrap();

        registry.register(Box::new(modules_loaded.clone())).ok();
        registry.register(Box::new(modules_unloaded.clone())).ok();
        registry.register(Box::new(reload_failures.clone())).ok();
        registry.register(Box::new(unload_leaks.clone())).ok();
        registry.register(Box::new(load_duration.clone())).ok();
        registry.register(Box::new(unload_passes.clone())).ok();

        Self {
            config,
            registry,
            modules_loaded,
            modules_unloaded,
            reload_failures,
            unload_leaks,
            load_duration,
            unload_passes,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Get the Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a module load.
    pub fn record_load(&self, duration_secs: f64) {
        self.modules_loaded.inc();
        self.load_duration.observe(duration_secs);
    }

    /// Record a completed unload and the checks it took.
    pub fn record_unload(&self, passes: usize) {
        self.modules_unloaded.inc();
        self.unload_passes.observe(passes as f64);
    }

    /// Record a failed reload.
    pub fn record_reload_failure(&self) {
        self.reload_failures.inc();
    }

    /// Record an unload that exhausted the wait bound.
    pub fn record_unload_leak(&self) {
        self.unload_leaks.inc();
    }

    /// Get the total number of modules loaded.
    pub fn modules_loaded_total(&self) -> u64 {
        self.modules_loaded.get() as u64
    }

    /// Get the total number of modules fully unloaded.
    pub fn modules_unloaded_total(&self) -> u64 {
        self.modules_unloaded.get() as u64
    }

    /// Get the total number of failed reloads.
    pub fn reload_failures_total(&self) -> u64 {
        self.reload_failures.get() as u64
    }

    /// Get the total number of suspected unload leaks.
    pub fn unload_leaks_total(&self) -> u64 {
        self.unload_leaks.get() as u64
    }
}

impl std::fmt::Debug for HostMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMetrics")
            .field("config", &self.config)
            .field("modules_loaded", &self.modules_loaded_total())
            .field("modules_unloaded", &self.modules_unloaded_total())
            .field("reload_failures", &self.reload_failures_total())
            .finish()
    }
}
