//! Prometheus metrics for the dispatcher.

pub mod prometheus;

pub use self::prometheus::{Metrics, MetricsServer};
