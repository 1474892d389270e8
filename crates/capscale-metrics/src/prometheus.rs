//! Prometheus text exposition of a run summary.

use std::fmt::Write as _;

use crate::sink::RunSummary;

/// Render `summary` in the Prometheus text format.
///
/// Timers become `capscale_call_duration_mean_ms` / `_max_ms` gauges and
/// `capscale_calls_total` counters labelled by `call`.
pub fn render_prometheus(summary: &RunSummary) -> String {
    let mut out = String::new();

    metric_header(
        &mut out,
        "capscale_calls_total",
        "Collaborator calls made during the run.",
        "counter",
    );
    for t in &summary.timers {
        let _ = writeln!(out, "capscale_calls_total{{call=\"{}\"}} {}", t.name, t.count);
    }

    metric_header(
        &mut out,
        "capscale_call_duration_mean_ms",
        "Mean call duration in milliseconds.",
        "gauge",
    );
    for t in &summary.timers {
        let _ = writeln!(
            out,
            "capscale_call_duration_mean_ms{{call=\"{}\"}} {:.2}",
            t.name, t.mean_ms
        );
    }

    metric_header(
        &mut out,
        "capscale_call_duration_max_ms",
        "Slowest call duration in milliseconds.",
        "gauge",
    );
    for t in &summary.timers {
        let _ = writeln!(
            out,
            "capscale_call_duration_max_ms{{call=\"{}\"}} {:.2}",
            t.name, t.max_ms
        );
    }

    metric_header(&mut out, "capscale_resources", "Resources examined.", "gauge");
    let _ = writeln!(out, "capscale_resources {}", summary.resources);

    metric_header(
        &mut out,
        "capscale_failed_resources",
        "Resources whose plan failed.",
        "gauge",
    );
    let _ = writeln!(out, "capscale_failed_resources {}", summary.failed_resources);

    metric_header(&mut out, "capscale_updates", "Capacity updates by outcome.", "gauge");
    for (outcome, value) in [
        ("planned", summary.planned_updates),
        ("applied", summary.applied_updates),
        ("failed", summary.failed_updates),
        ("unsettled", summary.unsettled_updates),
    ] {
        let _ = writeln!(out, "capscale_updates{{outcome=\"{outcome}\"}} {value}");
    }

    metric_header(
        &mut out,
        "capscale_provisioned_units",
        "Provisioned capacity units across all resources.",
        "gauge",
    );
    let _ = writeln!(
        out,
        "capscale_provisioned_units{{capacity=\"read\"}} {}",
        summary.total_provisioned.read_units
    );
    let _ = writeln!(
        out,
        "capscale_provisioned_units{{capacity=\"write\"}} {}",
        summary.total_provisioned.write_units
    );

    metric_header(
        &mut out,
        "capscale_monthly_estimated_cost",
        "Estimated monthly cost of provisioned capacity.",
        "gauge",
    );
    let _ = writeln!(
        out,
        "capscale_monthly_estimated_cost {:.2}",
        summary.monthly_estimated_cost
    );

    out
}

fn metric_header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}
