//! Health checks
//!
//! Liveness only asks whether the service is running. The full check also
//! queries the store and reports whether there is enough data to battle.

use crate::service::app::AppState;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported to Prometheus
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    /// The worse of two statuses
    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.as_gauge() <= other.as_gauge() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub uptime_seconds: u64,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

impl ComponentCheck {
    fn timed(name: &str, run: impl FnOnce() -> (HealthStatus, Option<String>)) -> Self {
        let start = std::time::Instant::now();
        let (status, message) = run();
        Self {
            name: name.to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

impl HealthCheck {
    /// Perform a full health check of the service
    pub fn check(app_state: &AppState) -> Self {
        let checks = vec![
            Self::check_service_running(app_state),
            Self::check_store(app_state),
            Self::check_battle_pool(app_state),
        ];

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(check.status));

        let metrics = app_state.metrics();
        metrics.update_health_status(status.as_gauge());
        for check in &checks {
            metrics.update_component_health(&check.name, check.status == HealthStatus::Healthy);
        }

        HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            uptime_seconds: app_state.uptime().as_secs(),
        }
    }

    /// Simple liveness check - just verify service is running
    pub fn liveness_check(app_state: &AppState) -> HealthStatus {
        if app_state.is_running() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    fn check_service_running(app_state: &AppState) -> ComponentCheck {
        ComponentCheck::timed("service_running", || {
            if app_state.is_running() {
                (HealthStatus::Healthy, None)
            } else {
                (
                    HealthStatus::Unhealthy,
                    Some("Service is not running".to_string()),
                )
            }
        })
    }

    fn check_store(app_state: &AppState) -> ComponentCheck {
        ComponentCheck::timed("battle_store", || match app_state.store().match_count() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Battle store health check failed: {:#}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Store query failed: {}", e)),
                )
            }
        })
    }

    /// Fewer than two items means duels cannot be offered until an import
    fn check_battle_pool(app_state: &AppState) -> ComponentCheck {
        ComponentCheck::timed("battle_pool", || match app_state.store().item_count() {
            Ok(count) if count >= 2 => (HealthStatus::Healthy, None),
            Ok(count) => (
                HealthStatus::Degraded,
                Some(format!("Only {} rated items, import more to battle", count)),
            ),
            Err(e) => (
                HealthStatus::Unhealthy,
                Some(format!("Cannot count items: {}", e)),
            ),
        })
    }
}
