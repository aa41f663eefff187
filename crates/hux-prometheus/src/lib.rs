//! Prometheus metrics backend for the huey event exporter.
//!
//! This crate provides [`ExporterMetrics`], the aggregated metric state fed
//! by the event correlator and read by the exposition endpoint.
//!
//! ## Metrics
//! All names are prefixed with the configured namespace and the `scheduler`
//! subsystem:
//! - `task_execution_total{task_name}` - Counter
//! - `task_completed_total{task_name, success}` - Counter
//! - `task_locked_total{task_name}` - Counter
//! - `task_duration_seconds{task_name, success}` - Histogram
//! - `last_task_duration_seconds{task_name, success}` - Gauge
//!
//! ## HTTP Server
//! This crate does NOT provide an HTTP server for the `/metrics` endpoint.
//! Use your application's existing HTTP framework (axum, warp, etc):
//!
//! ```rust,ignore
//! // Example with axum
//! async fn metrics_handler(
//!     State(metrics): State<Arc<ExporterMetrics>>
//! ) -> Response {
//!     let families = metrics.gather();
//!     let encoder = prometheus::TextEncoder::new();
//!     let mut buffer = vec![];
//!     encoder.encode(&families, &mut buffer).unwrap();
//!     Response::builder()
//!         .header("Content-Type", encoder.format_type())
//!         .body(buffer.into())
//!         .unwrap()
//! }
//! ```

mod backend;
pub use backend::ExporterMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
