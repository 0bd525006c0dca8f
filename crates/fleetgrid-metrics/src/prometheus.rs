//! Prometheus text exposition format.
//!
//! Renders a [`MetricsRegistry`] for scraping by a Prometheus server or
//! compatible agent. Dotted metric names become underscore-separated and
//! gain a `fleetgrid_` prefix, so `heartbeat.active` is exported as
//! `fleetgrid_heartbeat_active`.

use crate::registry::MetricsRegistry;

/// Render every gauge and timing in the registry into Prometheus text format.
///
/// Gauges are exported as GAUGE; timings as SUMMARY with `quantile` labels
/// (values in milliseconds) plus a `_count` series.
pub fn render_prometheus(registry: &MetricsRegistry) -> String {
    let mut out = String::new();

    for (name, value) in registry.gauges() {
        let metric = exposition_name(&name);
        out.push_str(&format!("# TYPE {metric} gauge\n"));
        out.push_str(&format!("{metric} {value}\n"));
    }

    for (name, summary) in registry.timings() {
        let metric = format!("{}_ms", exposition_name(&name));
        out.push_str(&format!("# TYPE {metric} summary\n"));
        out.push_str(&format!("{metric}{{quantile=\"0.5\"}} {:.3}\n", summary.p50_ms));
        out.push_str(&format!("{metric}{{quantile=\"0.99\"}} {:.3}\n", summary.p99_ms));
        out.push_str(&format!("{metric}{{quantile=\"1\"}} {:.3}\n", summary.max_ms));
        out.push_str(&format!("{metric}_count {}\n", summary.count));
    }

    out
}

fn exposition_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("fleetgrid_{sanitized}")
}
