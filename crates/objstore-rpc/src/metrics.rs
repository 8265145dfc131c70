//! RPC metrics for Prometheus
//!
//! Tracks per-method request counts, latencies, and active Get streams.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Per-method counters
#[derive(Debug, Default)]
pub struct MethodMetrics {
    pub requests_total: AtomicU64,
    pub requests_success: AtomicU64,
    pub requests_error: AtomicU64,
    pub latency_sum_us: AtomicU64,
}

impl MethodMetrics {
    fn record(&self, success: bool, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
    }
}

/// RPC metrics collector
#[derive(Debug, Default)]
pub struct RpcMetrics {
    pub put: MethodMetrics,
    pub get: MethodMetrics,
    pub delete: MethodMetrics,
    pub exists: MethodMetrics,
    pub list: MethodMetrics,
    pub get_metadata: MethodMetrics,
    pub update_metadata: MethodMetrics,
    pub archive: MethodMetrics,
    pub health: MethodMetrics,
    active_streams: AtomicU64,
}

impl RpcMetrics {
    /// Create a fresh collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn method(&self, name: &str) -> Option<&MethodMetrics> {
        match name {
            "Put" => Some(&self.put),
            "Get" => Some(&self.get),
            "Delete" => Some(&self.delete),
            "Exists" => Some(&self.exists),
            "List" => Some(&self.list),
            "GetMetadata" => Some(&self.get_metadata),
            "UpdateMetadata" => Some(&self.update_metadata),
            "Archive" => Some(&self.archive),
            "Health" => Some(&self.health),
            _ => None,
        }
    }

    /// Record one completed call
    pub fn record(&self, method: &str, success: bool, latency_us: u64) {
        if let Some(metrics) = self.method(method) {
            metrics.record(success, latency_us);
        }
    }

    /// A Get stream started
    pub fn stream_opened(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    /// A Get stream finished
    pub fn stream_closed(&self) {
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
    }

    /// Current number of in-flight Get streams
    #[must_use]
    pub fn active_streams(&self) -> u64 {
        self.active_streams.load(Ordering::Relaxed)
    }

    /// Export metrics in Prometheus text format
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(4 * 1024);

        let methods = [
            ("Put", &self.put),
            ("Get", &self.get),
            ("Delete", &self.delete),
            ("Exists", &self.exists),
            ("List", &self.list),
            ("GetMetadata", &self.get_metadata),
            ("UpdateMetadata", &self.update_metadata),
            ("Archive", &self.archive),
            ("Health", &self.health),
        ];

        writeln!(
            output,
            "# HELP objstore_rpc_requests_total Total RPC requests by method and status"
        )
        .unwrap();
        writeln!(output, "# TYPE objstore_rpc_requests_total counter").unwrap();
        for (method, metrics) in &methods {
            writeln!(
                output,
                "objstore_rpc_requests_total{{method=\"{}\",status=\"success\"}} {}",
                method,
                metrics.requests_success.load(Ordering::Relaxed)
            )
            .unwrap();
            writeln!(
                output,
                "objstore_rpc_requests_total{{method=\"{}\",status=\"error\"}} {}",
                method,
                metrics.requests_error.load(Ordering::Relaxed)
            )
            .unwrap();
        }

        writeln!(
            output,
            "# HELP objstore_rpc_latency_seconds_sum Sum of RPC request latencies"
        )
        .unwrap();
        writeln!(output, "# TYPE objstore_rpc_latency_seconds_sum counter").unwrap();
        for (method, metrics) in &methods {
            writeln!(
                output,
                "objstore_rpc_latency_seconds_sum{{method=\"{}\"}} {}",
                method,
                metrics.latency_sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
            )
            .unwrap();
        }

        writeln!(
            output,
            "# HELP objstore_rpc_active_streams Currently open Get streams"
        )
        .unwrap();
        writeln!(output, "# TYPE objstore_rpc_active_streams gauge").unwrap();
        writeln!(
            output,
            "objstore_rpc_active_streams {}",
            self.active_streams.load(Ordering::Relaxed)
        )
        .unwrap();

        output
    }
}

/// The process-wide metrics instance
pub fn rpc_metrics() -> Arc<RpcMetrics> {
    static METRICS: OnceLock<Arc<RpcMetrics>> = OnceLock::new();
    METRICS.get_or_init(|| Arc::new(RpcMetrics::new())).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_export() {
        let metrics = RpcMetrics::new();
        metrics.record("Put", true, 5000);
        metrics.record("Put", false, 1000);
        metrics.record("Get", true, 200);
        metrics.record("Unknown", true, 1);

        assert_eq!(metrics.put.requests_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.put.requests_success.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.put.requests_error.load(Ordering::Relaxed), 1);

        let output = metrics.export_prometheus();
        assert!(output.contains("objstore_rpc_requests_total{method=\"Put\",status=\"success\"} 1"));
        assert!(output.contains("objstore_rpc_requests_total{method=\"Get\",status=\"success\"} 1"));
        assert!(output.contains("objstore_rpc_active_streams 0"));
    }

    #[test]
    fn test_active_streams_gauge() {
        let metrics = RpcMetrics::new();
        metrics.stream_opened();
        metrics.stream_opened();
        metrics.stream_closed();
        assert_eq!(metrics.active_streams(), 1);
    }
}
