use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::warn;

use hux_model::{Event, EventKind};
use hux_prometheus::ExporterMetrics;

/// How often `apply` checks the pending map for stale entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Turns decoded lifecycle events into metric updates and matches each
/// `executing` event to the terminal event of the same `task_id`.
///
/// Single-writer state: one listener drives `apply`; concurrent reads of the
/// resulting metrics are handled by the registry on the exposition side.
pub struct Correlator {
    metrics: ExporterMetrics,
    pending: HashMap<String, Instant>,
    max_pending_age: Duration,
    last_sweep: Instant,
}

impl Correlator {
    /// Create a correlator that records into `metrics`.
    ///
    /// Executions that never see a terminal event are dropped from the
    /// pending map once older than `max_pending_age`, so the map cannot
    /// grow without bound when the upstream scheduler loses events.
    /// A zero age disables eviction.
    pub fn new(metrics: ExporterMetrics, max_pending_age: Duration) -> Self {
        Self {
            metrics,
            pending: HashMap::new(),
            max_pending_age,
            last_sweep: Instant::now(),
        }
    }

    /// Apply one decoded event.
    ///
    /// Never fails; events with an unrecognized kind change nothing.
    pub fn apply(&mut self, event: &Event) {
        self.apply_at(event, Instant::now());
    }

    fn apply_at(&mut self, event: &Event, now: Instant) {
        match event.kind {
            EventKind::Executing => {
                self.metrics.record_execution(&event.task_name);
                // Last write wins on duplicate starts for the same id.
                self.pending.insert(event.task_id.clone(), now);
            }
            EventKind::Complete | EventKind::Error => {
                let success = event.kind == EventKind::Complete;
                self.metrics.record_completion(&event.task_name, success);
                if let Some(started) = self.pending.remove(&event.task_id) {
                    let seconds = now.saturating_duration_since(started).as_secs_f64();
                    self.metrics.record_duration(&event.task_name, success, seconds);
                }
            }
            EventKind::Locked => self.metrics.record_lock_failure(&event.task_name),
            _ => {}
        }
        self.maybe_sweep(now);
    }

    /// Number of executions still waiting for a terminal event.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    fn maybe_sweep(&mut self, now: Instant) {
        if self.max_pending_age.is_zero() {
            return;
        }
        if now.saturating_duration_since(self.last_sweep) < SWEEP_INTERVAL {
            return;
        }
        self.last_sweep = now;

        let max_age = self.max_pending_age;
        let before = self.pending.len();
        self.pending
            .retain(|_, started| now.saturating_duration_since(*started) <= max_age);

        let evicted = before - self.pending.len();
        if evicted > 0 {
            warn!(evicted, "dropped pending executions with no terminal event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hux_prometheus::{Encoder, TextEncoder};

    fn metrics() -> ExporterMetrics {
        ExporterMetrics::new("test").unwrap()
    }

    fn correlator(metrics: &ExporterMetrics) -> Correlator {
        Correlator::new(metrics.clone(), Duration::from_secs(3600))
    }

    fn event(kind: EventKind, task_name: &str, task_id: &str) -> Event {
        Event {
            kind,
            task_name: task_name.to_string(),
            task_id: task_id.to_string(),
        }
    }

    fn render(metrics: &ExporterMetrics) -> String {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&metrics.gather(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn executing_then_complete_records_duration() {
        let m = metrics();
        let mut c = correlator(&m);
        let t0 = Instant::now();

        c.apply_at(&event(EventKind::Executing, "t1", "1"), t0);
        c.apply_at(
            &event(EventKind::Complete, "t1", "1"),
            t0 + Duration::from_secs(5),
        );

        let out = render(&m);
        assert!(out.contains("test_scheduler_task_execution_total{task_name=\"t1\"} 1\n"));
        assert!(out.contains(
            "test_scheduler_task_completed_total{success=\"true\",task_name=\"t1\"} 1\n"
        ));
        assert!(out.contains(
            "test_scheduler_task_duration_seconds_count{success=\"true\",task_name=\"t1\"} 1\n"
        ));
        assert!(out.contains(
            "test_scheduler_task_duration_seconds_sum{success=\"true\",task_name=\"t1\"} 5\n"
        ));
        assert!(out.contains(
            "test_scheduler_last_task_duration_seconds{success=\"true\",task_name=\"t1\"} 5\n"
        ));
        assert_eq!(c.in_flight(), 0);
    }

    #[test]
    fn error_terminal_uses_failure_label() {
        let m = metrics();
        let mut c = correlator(&m);
        let t0 = Instant::now();

        c.apply_at(&event(EventKind::Executing, "t1", "1"), t0);
        c.apply_at(
            &event(EventKind::Error, "t1", "1"),
            t0 + Duration::from_secs(2),
        );

        let out = render(&m);
        assert!(out.contains(
            "test_scheduler_task_completed_total{success=\"false\",task_name=\"t1\"} 1\n"
        ));
        assert!(out.contains(
            "test_scheduler_task_duration_seconds_sum{success=\"false\",task_name=\"t1\"} 2\n"
        ));
        assert!(!out.contains("success=\"true\""));
    }

    #[test]
    fn orphan_terminal_counts_completion_without_duration() {
        let m = metrics();
        let mut c = correlator(&m);

        c.apply_at(&event(EventKind::Complete, "t1", "1"), Instant::now());

        let out = render(&m);
        assert!(out.contains(
            "test_scheduler_task_completed_total{success=\"true\",task_name=\"t1\"} 1\n"
        ));
        assert!(!out.contains("task_duration_seconds_count{success=\"true\",task_name=\"t1\"} 1"));
    }

    #[test]
    fn duplicate_executing_keeps_last_start_time() {
        let m = metrics();
        let mut c = correlator(&m);
        let t0 = Instant::now();

        c.apply_at(&event(EventKind::Executing, "t1", "1"), t0);
        c.apply_at(
            &event(EventKind::Executing, "t1", "1"),
            t0 + Duration::from_secs(10),
        );
        c.apply_at(
            &event(EventKind::Complete, "t1", "1"),
            t0 + Duration::from_secs(15),
        );

        let out = render(&m);
        assert!(out.contains("test_scheduler_task_execution_total{task_name=\"t1\"} 2\n"));
        // Duration is measured from the second start, not the first.
        assert!(out.contains(
            "test_scheduler_task_duration_seconds_sum{success=\"true\",task_name=\"t1\"} 5\n"
        ));
    }

    #[test]
    fn terminal_after_terminal_records_single_duration() {
        let m = metrics();
        let mut c = correlator(&m);
        let t0 = Instant::now();

        c.apply_at(&event(EventKind::Executing, "t1", "1"), t0);
        c.apply_at(
            &event(EventKind::Complete, "t1", "1"),
            t0 + Duration::from_secs(1),
        );
        c.apply_at(
            &event(EventKind::Complete, "t1", "1"),
            t0 + Duration::from_secs(2),
        );

        let out = render(&m);
        assert!(out.contains(
            "test_scheduler_task_completed_total{success=\"true\",task_name=\"t1\"} 2\n"
        ));
        assert!(out.contains(
            "test_scheduler_task_duration_seconds_count{success=\"true\",task_name=\"t1\"} 1\n"
        ));
    }

    #[test]
    fn locked_never_touches_pending() {
        let m = metrics();
        let mut c = correlator(&m);

        c.apply_at(&event(EventKind::Locked, "t2", "9"), Instant::now());

        assert!(render(&m).contains("test_scheduler_task_locked_total{task_name=\"t2\"} 1\n"));
        assert_eq!(c.in_flight(), 0);
    }

    #[test]
    fn unrelated_task_ids_do_not_correlate() {
        let m = metrics();
        let mut c = correlator(&m);
        let t0 = Instant::now();

        c.apply_at(&event(EventKind::Executing, "t1", "1"), t0);
        c.apply_at(
            &event(EventKind::Complete, "t1", "2"),
            t0 + Duration::from_secs(3),
        );

        let out = render(&m);
        assert!(!out.contains("task_duration_seconds_count"));
        assert_eq!(c.in_flight(), 1);
    }

    #[test]
    fn unknown_kinds_change_nothing() {
        let m = metrics();
        let mut c = correlator(&m);
        let now = Instant::now();

        c.apply_at(&event(EventKind::Scheduled, "t", "1"), now);
        c.apply_at(&event(EventKind::Retrying, "t", "1"), now);
        c.apply_at(&event(EventKind::Unknown, "t", "1"), now);

        assert!(!render(&m).contains("task_name=\"t\""));
        assert_eq!(c.in_flight(), 0);
    }

    #[test]
    fn stale_pending_entries_are_evicted() {
        let m = metrics();
        let mut c = Correlator::new(m.clone(), Duration::from_secs(30));
        let t0 = Instant::now();

        c.apply_at(&event(EventKind::Executing, "t1", "1"), t0);
        assert_eq!(c.in_flight(), 1);

        // Any event past the sweep interval triggers the age check.
        c.apply_at(
            &event(EventKind::Locked, "t2", ""),
            t0 + Duration::from_secs(120),
        );
        assert_eq!(c.in_flight(), 0);

        // The late terminal still counts, but no duration is recorded.
        c.apply_at(
            &event(EventKind::Complete, "t1", "1"),
            t0 + Duration::from_secs(121),
        );
        let out = render(&m);
        assert!(out.contains(
            "test_scheduler_task_completed_total{success=\"true\",task_name=\"t1\"} 1\n"
        ));
        assert!(!out.contains("task_duration_seconds_count"));
    }

    #[test]
    fn zero_max_age_disables_eviction() {
        let m = metrics();
        let mut c = Correlator::new(m.clone(), Duration::ZERO);
        let t0 = Instant::now();

        c.apply_at(&event(EventKind::Executing, "t1", "1"), t0);
        c.apply_at(
            &event(EventKind::Locked, "t2", ""),
            t0 + Duration::from_secs(86_400),
        );

        assert_eq!(c.in_flight(), 1);
    }
}
