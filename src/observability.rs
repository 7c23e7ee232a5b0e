use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "bookd_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "bookd_query_duration_seconds";

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "bookd_bookings_created_total";

/// Counter: bookings cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "bookd_bookings_cancelled_total";

/// Counter: create/reschedule attempts that lost the slot race or found it
/// full.
pub const SLOT_CONFLICTS_TOTAL: &str = "bookd_slot_conflicts_total";

/// Counter: notification requests handed to the sink.
pub const NOTIFICATIONS_SENT_TOTAL: &str = "bookd_notifications_sent_total";

/// Counter: notification deliveries the sink reported failed.
pub const NOTIFICATIONS_FAILED_TOTAL: &str = "bookd_notifications_failed_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "bookd_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "bookd_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "bookd_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "bookd_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "bookd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "bookd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::UpdateSettings { .. } => "update_settings",
        Command::UpsertService { .. } => "upsert_service",
        Command::RemoveService { .. } => "remove_service",
        Command::InsertBooking { .. } => "insert_booking",
        Command::RescheduleBooking { .. } => "reschedule_booking",
        Command::CompleteBooking { .. } => "complete_booking",
        Command::CancelBooking { .. } => "cancel_booking",
        Command::SelectSlots { .. } => "select_slots",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectServices => "select_services",
    }
}
