//! fleetgrid-metrics — in-process metrics for FleetGrid servers.
//!
//! Components publish through the [`MetricsSink`] trait; the
//! [`MetricsRegistry`] keeps the latest gauge values and timing samples
//! and renders them in the Prometheus text exposition format.
//!
//! # Architecture
//!
//! ```text
//! MetricsSink (trait)
//!   ├── set_gauge()     ← e.g. heartbeat.active
//!   ├── add_sample()    ← e.g. heartbeat.invalidate
//!   └── measure_since() ← add_sample(start.elapsed())
//!
//! MetricsRegistry: MetricsSink
//!   ├── gauge() / timing() → point-in-time reads
//!   └── render_prometheus() → text/plain for a /metrics endpoint
//! ```

pub mod prometheus;
pub mod registry;

pub use prometheus::render_prometheus;
pub use registry::{MetricsRegistry, MetricsSink, TimingSummary};
