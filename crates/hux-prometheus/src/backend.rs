use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

const SUBSYSTEM: &str = "scheduler";

/// Aggregated scheduler task metrics.
///
/// Every metric is registered on a dedicated [`Registry`] owned by this
/// instance; nothing touches the process-global default registry. Clones
/// are cheap and share the same underlying metric state, which is safe for
/// concurrent reads while a single writer records events.
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    executions: IntCounterVec,
    completed: IntCounterVec,
    locked: IntCounterVec,
    duration: HistogramVec,
    last_duration: GaugeVec,
}

impl ExporterMetrics {
    /// Build and register the metric set.
    ///
    /// `prefix` becomes the namespace component of every metric name and
    /// may be empty.
    pub fn new(prefix: &str) -> Result<Self, prometheus::Error> {
        let executions = IntCounterVec::new(
            Opts::new(
                "task_execution_total",
                "The number of times a scheduler task has been executed.",
            )
            .namespace(prefix.to_string())
            .subsystem(SUBSYSTEM),
            &["task_name"],
        )?;
        let completed = IntCounterVec::new(
            Opts::new(
                "task_completed_total",
                "The number of times a scheduler task has been completed.",
            )
            .namespace(prefix.to_string())
            .subsystem(SUBSYSTEM),
            &["task_name", "success"],
        )?;
        let locked = IntCounterVec::new(
            Opts::new(
                "task_locked_total",
                "The number of times a scheduler task failed to acquire a lock.",
            )
            .namespace(prefix.to_string())
            .subsystem(SUBSYSTEM),
            &["task_name"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("task_duration_seconds", "Task duration in seconds.")
                .namespace(prefix.to_string())
                .subsystem(SUBSYSTEM),
            &["task_name", "success"],
        )?;
        let last_duration = GaugeVec::new(
            Opts::new(
                "last_task_duration_seconds",
                "Last task duration in seconds.",
            )
            .namespace(prefix.to_string())
            .subsystem(SUBSYSTEM),
            &["task_name", "success"],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(executions.clone()))?;
        registry.register(Box::new(completed.clone()))?;
        registry.register(Box::new(locked.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(last_duration.clone()))?;

        Ok(Self {
            registry,
            executions,
            completed,
            locked,
            duration,
            last_duration,
        })
    }

    /// Count one `executing` event for `task_name`.
    pub fn record_execution(&self, task_name: &str) {
        self.executions.with_label_values(&[task_name]).inc();
    }

    /// Count one terminal event for `task_name`.
    pub fn record_completion(&self, task_name: &str, success: bool) {
        self.completed
            .with_label_values(&[task_name, success_label(success)])
            .inc();
    }

    /// Count one `locked` event for `task_name`.
    pub fn record_lock_failure(&self, task_name: &str) {
        self.locked.with_label_values(&[task_name]).inc();
    }

    /// Record one measured execution duration.
    ///
    /// Observes the duration histogram and sets the last-duration gauge to
    /// the same value.
    pub fn record_duration(&self, task_name: &str, success: bool, seconds: f64) {
        let labels = [task_name, success_label(success)];
        self.duration.with_label_values(&labels).observe(seconds);
        self.last_duration.with_label_values(&labels).set(seconds);
    }

    /// Snapshot all metric families for exposition.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// The registry all metrics are registered on.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn success_label(success: bool) -> &'static str {
    if success { "true" } else { "false" }
}
