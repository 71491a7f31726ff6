//! Metrics collection for llmgate
//!
//! This module provides Prometheus metrics for observability.
//! Counters are registered once in a process-wide registry; components only
//! increment them.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics registry for llmgate
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub gateway: GatewayMetrics,
    pub supervisor: SupervisorMetrics,
    pub worker: WorkerMetrics,
}

/// Router and gateway info metrics
#[derive(Debug, Clone)]
pub struct GatewayMetrics {
    /// Total number of chat requests received
    pub chat_requests_total: IntCounter,

    /// Failed chat requests, labelled by error kind
    pub chat_requests_failed: IntCounterVec,

    /// Chunks forwarded from backends to callers
    pub chunks_forwarded_total: IntCounter,

    /// Streams currently being forwarded
    pub active_streams: IntGauge,

    /// Duration of a whole forwarded chat stream
    pub stream_duration: Histogram,

    /// GetInfo requests
    pub info_requests_total: IntCounter,
}

/// Process supervisor metrics
#[derive(Debug, Clone)]
pub struct SupervisorMetrics {
    pub instances_started: IntCounter,
    pub instances_failed: IntCounter,
    pub running_processes: IntGauge,
    pub graceful_exits: IntCounter,
    pub forced_kills: IntCounter,
}

/// Model worker metrics
#[derive(Debug, Clone)]
pub struct WorkerMetrics {
    pub chat_requests_total: IntCounter,
    pub chat_requests_failed: IntCounter,
    pub chunks_generated_total: IntCounter,
}

lazy_static! {
    /// Global metrics registry instance
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid counter definition");
    registry
        .register(Box::new(counter.clone()))
        .expect("counter registered once");
    counter
}

fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).expect("valid gauge definition");
    registry
        .register(Box::new(gauge.clone()))
        .expect("gauge registered once");
    gauge
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let chat_requests_failed = IntCounterVec::new(
            Opts::new(
                "gateway_chat_requests_failed_total",
                "Failed chat requests by error kind",
            ),
            &["kind"],
        )
        .expect("valid counter vec definition");
        registry
            .register(Box::new(chat_requests_failed.clone()))
            .expect("counter vec registered once");

        let stream_duration = Histogram::with_opts(
            HistogramOpts::new(
                "gateway_stream_duration_seconds",
                "Duration of forwarded chat streams in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )
        .expect("valid histogram definition");
        registry
            .register(Box::new(stream_duration.clone()))
            .expect("histogram registered once");

        let gateway = GatewayMetrics {
            chat_requests_total: counter(
                &registry,
                "gateway_chat_requests_total",
                "Total number of chat requests",
            ),
            chat_requests_failed,
            chunks_forwarded_total: counter(
                &registry,
                "gateway_chunks_forwarded_total",
                "Chunks forwarded from backends to callers",
            ),
            active_streams: gauge(
                &registry,
                "gateway_active_streams",
                "Chat streams currently being forwarded",
            ),
            stream_duration,
            info_requests_total: counter(
                &registry,
                "gateway_info_requests_total",
                "Total number of GetInfo requests",
            ),
        };

        let supervisor = SupervisorMetrics {
            instances_started: counter(
                &registry,
                "supervisor_instances_started_total",
                "Worker instances spawned successfully",
            ),
            instances_failed: counter(
                &registry,
                "supervisor_instances_failed_total",
                "Worker instances that failed to spawn",
            ),
            running_processes: gauge(
                &registry,
                "supervisor_running_processes",
                "Worker processes currently tracked",
            ),
            graceful_exits: counter(
                &registry,
                "supervisor_graceful_exits_total",
                "Worker processes that exited after SIGTERM",
            ),
            forced_kills: counter(
                &registry,
                "supervisor_forced_kills_total",
                "Worker processes that had to be killed",
            ),
        };

        let worker = WorkerMetrics {
            chat_requests_total: counter(
                &registry,
                "worker_chat_requests_total",
                "Chat requests served by this worker",
            ),
            chat_requests_failed: counter(
                &registry,
                "worker_chat_requests_failed_total",
                "Chat requests that ended with an error",
            ),
            chunks_generated_total: counter(
                &registry,
                "worker_chunks_generated_total",
                "Chunks streamed back to callers",
            ),
        };

        MetricsRegistry {
            registry,
            gateway,
            supervisor,
            worker,
        }
    }

    /// Gather all metrics as text
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# failed to encode metrics: {}\n", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
