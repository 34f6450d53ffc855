use crate::metrics::{MetricsSnapshot, OperationLatencyMetrics};

/// Render a metrics snapshot into Prometheus text exposition format.
pub(crate) fn render_prometheus_metrics(snapshot: &MetricsSnapshot) -> String {
    use std::fmt::Write;

    fn write_metric(buf: &mut String, name: &str, help: &str, metric_type: &str, value: f64) {
        let _ = writeln!(buf, "# HELP {name} {help}");
        let _ = writeln!(buf, "# TYPE {name} {metric_type}");
        let _ = writeln!(buf, "{name} {value}");
    }

    fn counter(buf: &mut String, name: &str, help: &str, value: u64) {
        write_metric(buf, name, help, "counter", value as f64);
    }

    fn gauge(buf: &mut String, name: &str, help: &str, value: u64) {
        write_metric(buf, name, help, "gauge", value as f64);
    }

    fn emit_latency_metrics(
        buf: &mut String,
        metric_prefix: &str,
        description: &str,
        metrics: &OperationLatencyMetrics,
    ) {
        if let Some(value) = metrics.average_ms {
            write_metric(
                buf,
                &format!("{metric_prefix}_average_ms"),
                &format!("Average {description} latency in milliseconds"),
                "gauge",
                value,
            );
        }
        if let Some(value) = metrics.p50_ms {
            write_metric(
                buf,
                &format!("{metric_prefix}_p50_ms"),
                &format!("p50 {description} latency in milliseconds"),
                "gauge",
                value,
            );
        }
        if let Some(value) = metrics.p95_ms {
            write_metric(
                buf,
                &format!("{metric_prefix}_p95_ms"),
                &format!("p95 {description} latency in milliseconds"),
                "gauge",
                value,
            );
        }
        if let Some(value) = metrics.p99_ms {
            write_metric(
                buf,
                &format!("{metric_prefix}_p99_ms"),
                &format!("p99 {description} latency in milliseconds"),
                "gauge",
                value,
            );
        }
        counter(
            buf,
            &format!("{metric_prefix}_samples_total"),
            &format!("Total samples recorded for {description} latency calculations"),
            metrics.sample_count,
        );
    }

    let mut buf = String::new();

    counter(
        &mut buf,
        "land_gateway_connections_total",
        "Total WebSocket connections accepted since startup",
        snapshot.connections.total_connections,
    );
    gauge(
        &mut buf,
        "land_gateway_connections_active",
        "Number of currently active connections",
        snapshot.connections.active_connections,
    );
    counter(
        &mut buf,
        "land_gateway_disconnections_total",
        "Total connection closures observed since startup",
        snapshot.connections.disconnections,
    );
    counter(
        &mut buf,
        "land_gateway_websocket_messages_dropped_total",
        "Messages dropped because the outbound WebSocket buffer was full",
        snapshot.connections.websocket_messages_dropped,
    );

    counter(
        &mut buf,
        "land_gateway_lands_created_total",
        "Total land instances created since startup",
        snapshot.lands.lands_created,
    );
    counter(
        &mut buf,
        "land_gateway_lands_removed_total",
        "Total land instances removed (emptied + swept) since startup",
        snapshot.lands.lands_removed,
    );
    counter(
        &mut buf,
        "land_gateway_land_creation_failures_total",
        "Total land-creation attempts that failed",
        snapshot.lands.land_creation_failures,
    );

    counter(
        &mut buf,
        "land_gateway_join_successes_total",
        "Total join attempts that completed successfully",
        snapshot.joins.join_successes,
    );
    counter(
        &mut buf,
        "land_gateway_join_failures_total",
        "Total join attempts that were rejected",
        snapshot.joins.join_failures,
    );
    counter(
        &mut buf,
        "land_gateway_join_failures_room_not_found_total",
        "Join attempts rejected because the requested land instance did not exist",
        snapshot.joins.join_failures_room_not_found,
    );
    counter(
        &mut buf,
        "land_gateway_join_failures_duplicate_login_total",
        "Join attempts rejected because the player was already connected elsewhere",
        snapshot.joins.join_failures_duplicate_login,
    );

    counter(
        &mut buf,
        "land_gateway_sync_cycles_total",
        "Total sync cycles executed across all lands",
        snapshot.sync.sync_cycles,
    );
    emit_latency_metrics(
        &mut buf,
        "land_gateway_sync_cycle_latency",
        "sync cycle",
        &snapshot.sync.sync_cycle_latency,
    );
    counter(
        &mut buf,
        "land_gateway_latency_clamped_samples_total",
        "Latency samples that exceeded the histogram tracking range",
        snapshot.sync.latency_histogram_clamped_samples,
    );
    counter(
        &mut buf,
        "land_gateway_parallel_encode_workers_spawned_total",
        "Total parallel encode worker tasks spawned across all sync cycles",
        snapshot.sync.parallel_encode_workers_spawned,
    );
    gauge(
        &mut buf,
        "land_gateway_dynamic_key_dictionary_entries",
        "Entries currently held in the dynamic-key dictionary (opcode-array encoding)",
        snapshot.sync.dynamic_key_dictionary_entries,
    );

    counter(
        &mut buf,
        "land_gateway_errors_total",
        "Total errors encountered since startup",
        snapshot.errors.total_errors,
    );
    counter(
        &mut buf,
        "land_gateway_errors_internal_total",
        "Internal errors encountered since startup",
        snapshot.errors.internal_errors,
    );
    counter(
        &mut buf,
        "land_gateway_errors_websocket_total",
        "WebSocket transport errors encountered since startup",
        snapshot.errors.websocket_errors,
    );
    counter(
        &mut buf,
        "land_gateway_errors_validation_total",
        "Protocol validation errors encountered since startup",
        snapshot.errors.validation_errors,
    );

    for (land_type, ema) in &snapshot.dirty_tracking_ema {
        let _ = writeln!(
            buf,
            "land_gateway_dirty_tracking_ema{{land_type=\"{land_type}\"}} {ema}"
        );
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ServerMetrics;

    #[tokio::test]
    async fn renders_core_counters() {
        let metrics = ServerMetrics::new();
        metrics.increment_connections();
        metrics.increment_connections();
        metrics.decrement_active_connections();
        metrics.increment_lands_created();
        metrics.increment_join_successes();
        metrics
            .record_sync_cycle("lobby", std::time::Duration::from_millis(4))
            .await;

        let snapshot = metrics.snapshot().await;
        let rendered = render_prometheus_metrics(&snapshot);

        assert!(rendered.contains("land_gateway_connections_total 2"));
        assert!(rendered.contains("land_gateway_lands_created_total 1"));
        assert!(rendered.contains("land_gateway_join_successes_total 1"));
        assert!(rendered.contains("# TYPE land_gateway_connections_total counter"));
        assert!(rendered.contains("land_gateway_sync_cycle_latency_samples_total 1"));
    }

    #[tokio::test]
    async fn renders_dirty_tracking_ema_per_land_type() {
        let metrics = ServerMetrics::new();
        metrics.record_dirty_tracking_ema("arena", 0.73).await;

        let snapshot = metrics.snapshot().await;
        let rendered = render_prometheus_metrics(&snapshot);

        assert!(rendered.contains("land_gateway_dirty_tracking_ema{land_type=\"arena\"} 0.73"));
    }
}
