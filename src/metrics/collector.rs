//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the song battle service:
//! duels processed, rating movement, pairings proposed and timing of the
//! two core operations.

use crate::error::ErrorKind;
use crate::matchmaking::MatchMode;
use crate::types::{MatchQuality, Outcome, RatingChange};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the song battle service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Rating-related metrics
    duel_metrics: DuelMetrics,

    /// Pairing-related metrics
    matchmaking_metrics: MatchmakingMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// HTTP requests by route and status class
    pub http_requests_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Rating-related metrics
#[derive(Clone)]
pub struct DuelMetrics {
    /// Duels committed, by outcome
    pub duels_processed_total: IntCounterVec,

    /// Failed duel submissions, by error kind
    pub duel_errors_total: IntCounterVec,

    /// Absolute rating change per side of a rated duel
    pub rating_change_points: Histogram,

    /// Items currently rated
    pub rated_items: IntGauge,
}

/// Pairing-related metrics
#[derive(Clone)]
pub struct MatchmakingMetrics {
    /// Pairs proposed, by strategy and quality label
    pub matches_proposed_total: IntCounterVec,

    /// Pairing requests refused for lack of items
    pub insufficient_data_total: IntCounter,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Time spent applying an outcome, store write included
    pub process_outcome_duration: Histogram,

    /// Time spent choosing the next pair
    pub next_match_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let duel_metrics = DuelMetrics::new(&registry)?;
        let matchmaking_metrics = MatchmakingMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            duel_metrics,
            matchmaking_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn duels(&self) -> &DuelMetrics {
        &self.duel_metrics
    }

    pub fn matchmaking(&self) -> &MatchmakingMetrics {
        &self.matchmaking_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record a committed duel
    pub fn record_duel(&self, outcome: Outcome, changes: [&RatingChange; 2], duration: Duration) {
        self.duel_metrics
            .duels_processed_total
            .with_label_values(&[outcome.as_str()])
            .inc();

        if outcome != Outcome::Skip {
            for change in changes {
                self.duel_metrics
                    .rating_change_points
                    .observe(change.change.unsigned_abs() as f64);
            }
        }

        self.performance_metrics
            .process_outcome_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a rejected duel submission
    pub fn record_duel_error(&self, kind: ErrorKind) {
        let kind_str = match kind {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidOutcome => "invalid_outcome",
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::StoreFailure => "store_failure",
            ErrorKind::Configuration => "configuration",
        };

        self.duel_metrics
            .duel_errors_total
            .with_label_values(&[kind_str])
            .inc();
    }

    /// Record a proposed pairing
    pub fn record_match_proposed(&self, mode: MatchMode, quality: MatchQuality, duration: Duration) {
        self.matchmaking_metrics
            .matches_proposed_total
            .with_label_values(&[mode.as_str(), quality.as_str()])
            .inc();

        self.performance_metrics
            .next_match_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a pairing request that failed for lack of items
    pub fn record_insufficient_data(&self) {
        self.matchmaking_metrics.insufficient_data_total.inc();
    }

    /// Update the rated item gauge
    pub fn update_rated_items(&self, count: usize) {
        self.duel_metrics.rated_items.set(count as i64);
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, route: &str, status: u16) {
        let class = match status {
            200..=299 => "2xx",
            400..=499 => "4xx",
            500..=599 => "5xx",
            _ => "other",
        };

        self.service_metrics
            .http_requests_total
            .with_label_values(&[route, class])
            .inc();
    }

    /// Update uptime
    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics.uptime_seconds.set(uptime.as_secs() as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("song_battle_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("song_battle_http_requests_total", "HTTP requests served"),
            &["route", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let health_status = IntGauge::new(
            "song_battle_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("song_battle_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            http_requests_total,
            health_status,
            component_health,
        })
    }
}

impl DuelMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let duels_processed_total = IntCounterVec::new(
            Opts::new("song_battle_duels_processed_total", "Duels processed"),
            &["outcome"],
        )?;
        registry.register(Box::new(duels_processed_total.clone()))?;

        let duel_errors_total = IntCounterVec::new(
            Opts::new("song_battle_duel_errors_total", "Rejected duel submissions"),
            &["kind"],
        )?;
        registry.register(Box::new(duel_errors_total.clone()))?;

        let rating_change_points = Histogram::with_opts(
            HistogramOpts::new(
                "song_battle_rating_change_points",
                "Absolute rating change per side of a rated duel",
            )
            .buckets(vec![0.0, 2.0, 4.0, 8.0, 12.0, 16.0, 24.0, 32.0]),
        )?;
        registry.register(Box::new(rating_change_points.clone()))?;

        let rated_items = IntGauge::new("song_battle_rated_items", "Items currently rated")?;
        registry.register(Box::new(rated_items.clone()))?;

        Ok(Self {
            duels_processed_total,
            duel_errors_total,
            rating_change_points,
            rated_items,
        })
    }
}

impl MatchmakingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_proposed_total = IntCounterVec::new(
            Opts::new("song_battle_matches_proposed_total", "Pairs proposed"),
            &["mode", "quality"],
        )?;
        registry.register(Box::new(matches_proposed_total.clone()))?;

        let insufficient_data_total = IntCounter::new(
            "song_battle_insufficient_data_total",
            "Pairing requests refused for lack of items",
        )?;
        registry.register(Box::new(insufficient_data_total.clone()))?;

        Ok(Self {
            matches_proposed_total,
            insufficient_data_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let process_outcome_duration = Histogram::with_opts(
            HistogramOpts::new(
                "song_battle_process_outcome_duration_seconds",
                "Outcome processing time",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(process_outcome_duration.clone()))?;

        let next_match_duration = Histogram::with_opts(
            HistogramOpts::new(
                "song_battle_next_match_duration_seconds",
                "Pair selection time",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(next_match_duration.clone()))?;

        Ok(Self {
            process_outcome_duration,
            next_match_duration,
        })
    }
}
