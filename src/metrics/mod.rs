//! Metrics and monitoring for the song battle service
//!
//! This module provides Prometheus metrics collection and text encoding for
//! the `/metrics` endpoint.

pub mod collector;

pub use collector::{
    DuelMetrics, MatchmakingMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics,
    ServiceMetrics,
};

use anyhow::Result;
use prometheus::{Encoder, TextEncoder};

/// Content type of [`encode_metrics`] output
pub fn metrics_content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

/// Render every registered metric in the Prometheus text format
pub fn encode_metrics(collector: &MetricsCollector) -> Result<String> {
    let metric_families = collector.registry().gather();
    TextEncoder::new()
        .encode_to_string(&metric_families)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))
}
