//! Process-wide state that isn't per-target: metrics registry, start time.

use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "metrics")]
use prometheus::{IntGauge, Registry};

/// Optional Prometheus-style gauges, present only when `[metrics]` is
/// configured, so the registry and its gauges simply don't exist when the
/// feature is compiled out.
#[cfg(feature = "metrics")]
pub struct Metrics {
    pub registry: Registry,
    pub stalker_active_clients: IntGauge,
    pub stalker_last_received_unix: IntGauge,
    pub writer_last_message_unix: IntGauge,
}

#[cfg(feature = "metrics")]
impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let stalker_active_clients =
            IntGauge::new("esologs_stalker_active_clients", "Connected stalker websocket clients").unwrap();
        let stalker_last_received_unix = IntGauge::new(
            "esologs_stalker_last_received_unix",
            "Unix time of the last event routed through the stalker",
        )
        .unwrap();
        let writer_last_message_unix = IntGauge::new(
            "esologs_writer_last_message_unix",
            "Unix time of the last event written to the archive",
        )
        .unwrap();
        registry.register(Box::new(stalker_active_clients.clone())).unwrap();
        registry.register(Box::new(stalker_last_received_unix.clone())).unwrap();
        registry.register(Box::new(writer_last_message_unix.clone())).unwrap();
        Self {
            registry,
            stalker_active_clients,
            stalker_last_received_unix,
            writer_last_message_unix,
        }
    }
}

#[cfg(feature = "metrics")]
impl crate::archive::WriterMetrics for Metrics {
    fn record_write(&self, now_unix_secs: i64) {
        self.writer_last_message_unix.set(now_unix_secs);
    }
}

#[cfg(feature = "metrics")]
impl crate::stalker::StalkerMetrics for Metrics {
    fn set_active_clients(&self, count: i64) {
        self.stalker_active_clients.set(count);
    }

    fn record_received(&self, now_unix_secs: i64) {
        self.stalker_last_received_unix.set(now_unix_secs);
    }
}

/// Uptime tracking shared by the `/health` handler.
#[derive(Clone)]
pub struct Health {
    pub start_time: Arc<Instant>,
}

impl Health {
    pub fn new() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new()
    }
}
