use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: appointments booked. Labels: none.
pub const BOOKINGS_TOTAL: &str = "quitbook_bookings_total";

/// Counter: booking attempts rejected on interval overlap.
pub const BOOKING_CONFLICTS_TOTAL: &str = "quitbook_booking_conflicts_total";

/// Counter: booking attempts rejected outside any availability slot.
pub const BOOKING_UNAVAILABLE_TOTAL: &str = "quitbook_booking_unavailable_total";

/// Counter: appointments cancelled (by either party).
pub const CANCELLATIONS_TOTAL: &str = "quitbook_cancellations_total";

/// Counter: ratings recorded (including overwrites).
pub const RATINGS_TOTAL: &str = "quitbook_ratings_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: coaches with a loaded schedule.
pub const COACH_SCHEDULES_ACTIVE: &str = "quitbook_coach_schedules_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "quitbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "quitbook_wal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
