//! Prometheus metrics exporter.

use std::net::SocketAddr;
use std::sync::Arc;

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::MetricsError;

/// Prometheus metrics for the dispatch loop.
pub struct Metrics {
    /// Registry for all metrics.
    registry: Registry,
    /// Messages received from the queue.
    pub messages_received: Counter,
    /// Polls that returned no message.
    pub empty_polls: Counter,
    /// Failed receive calls.
    pub poll_errors: Counter,
    /// Messages not dispatched, by reason.
    pub messages_skipped: CounterVec,
    /// Task launches by status.
    pub dispatches_total: CounterVec,
    /// Message deletions by status.
    pub acks_total: CounterVec,
    /// Time spent in a single task launch call.
    pub dispatch_duration_seconds: Histogram,
}

impl Metrics {
    /// Creates a new metrics instance with all counters registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let messages_received = Counter::new(
            "dispatch_messages_received_total",
            "Messages received from the job queue",
        )?;

        let empty_polls = Counter::new(
            "dispatch_empty_polls_total",
            "Polls that returned no message",
        )?;

        let poll_errors = Counter::new(
            "dispatch_poll_errors_total",
            "Failed queue receive calls",
        )?;

        let messages_skipped = CounterVec::new(
            Opts::new("dispatch_messages_skipped_total", "Messages not dispatched"),
            &["reason"],
        )?;

        let dispatches_total = CounterVec::new(
            Opts::new("dispatch_tasks_total", "Task launch attempts"),
            &["status"],
        )?;

        let acks_total = CounterVec::new(
            Opts::new("dispatch_acks_total", "Queue message deletions"),
            &["status"],
        )?;

        let dispatch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "dispatch_launch_duration_seconds",
                "Time taken by a single task launch call",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        registry.register(Box::new(messages_received.clone()))?;
        registry.register(Box::new(empty_polls.clone()))?;
        registry.register(Box::new(poll_errors.clone()))?;
        registry.register(Box::new(messages_skipped.clone()))?;
        registry.register(Box::new(dispatches_total.clone()))?;
        registry.register(Box::new(acks_total.clone()))?;
        registry.register(Box::new(dispatch_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            messages_received,
            empty_polls,
            poll_errors,
            messages_skipped,
            dispatches_total,
            acks_total,
            dispatch_duration_seconds,
        })
    }

    /// Records a skipped message.
    pub fn record_skip(&self, reason: &str) {
        self.messages_skipped.with_label_values(&[reason]).inc();
    }

    /// Records one task launch attempt.
    pub fn record_dispatch(&self, success: bool, seconds: f64) {
        let status = if success { "success" } else { "failure" };
        self.dispatches_total.with_label_values(&[status]).inc();
        self.dispatch_duration_seconds.observe(seconds);
    }

    /// Records one message deletion attempt.
    pub fn record_ack(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.acks_total.with_label_values(&[status]).inc();
    }

    /// Returns the metrics in Prometheus text format.
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// HTTP server for Prometheus metrics.
pub struct MetricsServer {
    /// Metrics instance.
    metrics: Arc<Metrics>,
    /// Port to listen on.
    port: u16,
}

impl MetricsServer {
    /// Creates a new metrics server.
    pub fn new(metrics: Arc<Metrics>, port: u16) -> Self {
        Self { metrics, port }
    }

    /// Serves `/metrics` until `shutdown` fires.
    pub async fn start(self, shutdown: CancellationToken) -> Result<(), MetricsError> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{body::Incoming, Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;

        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| MetricsError::Server(e.to_string()))?;

        info!(port = self.port, "Starting Prometheus metrics server");

        let metrics = self.metrics.clone();

        loop {
            let (stream, _) = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                accepted = listener.accept() => {
                    accepted.map_err(|e| MetricsError::Server(e.to_string()))?
                }
            };

            let io = TokioIo::new(stream);
            let metrics = metrics.clone();

            tokio::spawn(async move {
                let service = service_fn(|req: Request<Incoming>| {
                    let metrics = metrics.clone();
                    async move {
                        if req.uri().path() == "/metrics" {
                            let body = metrics.gather();
                            Ok::<_, hyper::Error>(Response::new(Full::new(Bytes::from(body))))
                        } else {
                            let mut response = Response::new(Full::new(Bytes::from("Not Found")));
                            *response.status_mut() = StatusCode::NOT_FOUND;
                            Ok(response)
                        }
                    }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!(error = %e, "Error serving connection");
                }
            });
        }
    }
}
