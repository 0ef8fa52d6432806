//! Metrics collection for Huddle
//!
//! Prometheus gauges and counters for room, call and lobby activity, kept in a
//! crate-owned registry and rendered on `/metrics`.

use crate::core::error::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, IntCounter, IntGauge, Registry,
};

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Room lifecycle and chat traffic
pub struct RoomMetrics {
    /// Rooms currently registered
    pub open: IntGauge,
    /// Total rooms created
    pub created: IntCounter,
    /// Total rooms removed after their grace period
    pub expired: IntCounter,
    /// Total chat messages broadcast (user and system)
    pub messages: IntCounter,
    /// Recipients per broadcast
    pub fanout: Histogram,
}

/// Call session activity
pub struct CallMetrics {
    /// Call sessions currently alive
    pub active: IntGauge,
    /// Signaling envelopes forwarded to a peer
    pub relayed: IntCounter,
    /// Joins refused because the session was full
    pub rejected_full: IntCounter,
}

/// Connection-level counters
pub struct ConnectionMetrics {
    /// Lobby connections currently registered
    pub lobby: IntGauge,
    /// Sends that failed because the peer was gone
    pub send_failures: IntCounter,
}

/// Centralized metrics collection
pub struct Metrics {
    /// Room metrics
    pub rooms: RoomMetrics,
    /// Call metrics
    pub calls: CallMetrics,
    /// Connection metrics
    pub connections: ConnectionMetrics,
}

impl Metrics {
    /// Create new metrics instance registered against `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            rooms: RoomMetrics::new(registry)?,
            calls: CallMetrics::new(registry)?,
            connections: ConnectionMetrics::new(registry)?,
        })
    }

    /// Get the global metrics instance
    pub fn global() -> &'static Metrics {
        static INSTANCE: Lazy<Metrics> = Lazy::new(|| {
            Metrics::new(&REGISTRY).expect("Failed to initialize metrics")
        });
        &INSTANCE
    }
}

impl RoomMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            open: register_int_gauge_with_registry!(
                "huddle_rooms_open",
                "Number of chat rooms currently registered",
                registry
            )?,
            created: register_int_counter_with_registry!(
                "huddle_rooms_created_total",
                "Total number of chat rooms created",
                registry
            )?,
            expired: register_int_counter_with_registry!(
                "huddle_rooms_expired_total",
                "Total number of empty chat rooms deleted",
                registry
            )?,
            messages: register_int_counter_with_registry!(
                "huddle_chat_messages_total",
                "Total number of chat messages broadcast",
                registry
            )?,
            fanout: register_histogram_with_registry!(
                "huddle_broadcast_recipients",
                "Number of recipients per room broadcast",
                vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0],
                registry
            )?,
        })
    }
}

impl CallMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            active: register_int_gauge_with_registry!(
                "huddle_calls_active",
                "Number of call sessions currently alive",
                registry
            )?,
            relayed: register_int_counter_with_registry!(
                "huddle_signals_relayed_total",
                "Total number of signaling envelopes forwarded",
                registry
            )?,
            rejected_full: register_int_counter_with_registry!(
                "huddle_call_joins_rejected_total",
                "Total number of call joins refused because the session was full",
                registry
            )?,
        })
    }
}

impl ConnectionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            lobby: register_int_gauge_with_registry!(
                "huddle_lobby_connections",
                "Number of lobby connections",
                registry
            )?,
            send_failures: register_int_counter_with_registry!(
                "huddle_send_failures_total",
                "Total number of frames that could not be delivered",
                registry
            )?,
        })
    }
}

/// Initialize the metrics registry by creating the global metrics instance
pub fn init_registry() {
    let _ = Metrics::global();
}

/// Get the Prometheus registry
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Collect and return all metrics in the Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry().gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
