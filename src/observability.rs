use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total wire requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "covers_requests_total";

/// Histogram: wire request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "covers_request_duration_seconds";

/// Counter: booking attempts. Labels: outcome (`booked` or an error kind).
pub const BOOKINGS_TOTAL: &str = "covers_bookings_total";

/// Histogram: end-to-end booking latency in seconds, lock waits included.
pub const BOOKING_DURATION_SECONDS: &str = "covers_booking_duration_seconds";

/// Counter: availability queries. Labels: outcome (`match` / `no_match`).
pub const AVAILABILITY_QUERIES_TOTAL: &str = "covers_availability_queries_total";

/// Counter: cancellations committed.
pub const CANCELLATIONS_TOTAL: &str = "covers_cancellations_total";

/// Counter: bookings whose planned tables were taken before commit.
pub const INVENTORY_CONFLICTS_TOTAL: &str = "covers_inventory_conflicts_total";

/// Counter: restaurant lock waits that timed out.
pub const LOCK_TIMEOUTS_TOTAL: &str = "covers_lock_timeouts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "covers_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "covers_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "covers_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "covers_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "covers_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Request variant to a short label for metrics.
pub fn request_label(req: &Request) -> &'static str {
    match req {
        Request::CreateRestaurant { .. } => "create_restaurant",
        Request::RegisterDiner { .. } => "register_diner",
        Request::Available { .. } => "available",
        Request::Book { .. } => "book",
        Request::Cancel { .. } => "cancel",
        Request::Reservations { .. } => "reservations",
        Request::FreeCapacity { .. } => "free_capacity",
        Request::Restaurants => "restaurants",
        Request::Listen { .. } => "listen",
    }
}
